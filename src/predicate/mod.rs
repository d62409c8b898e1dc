//! Predicate model: expression compiler, DNF lowering, pushdown extraction.
//!
//! A predicate arrives either as a string expression or as a literal
//! nested-sequence structure (the DNF form: an OR of AND groups of
//! three-element comparisons). Both normalize to the same AST before use.
//! Compilation failures (`Syntax`, `UnknownOperator`) surface here, never
//! during scanning.

mod eval;
mod parse;
mod token;

use std::fmt;

pub use eval::Evaluator;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// Comparison operator of a predicate leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=` / `==`
    Eq,
    /// `!=` / `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// SQL-style wildcard match (`%` any run, `_` any single character).
    Like,
    /// Negated wildcard match.
    NotLike,
    /// Membership in a literal list.
    In,
    /// Sequence element containment.
    Contains,
}

impl CompareOp {
    /// Parse an operator token; case-insensitive for the word operators.
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "LIKE" => Ok(CompareOp::Like),
            "NOT LIKE" => Ok(CompareOp::NotLike),
            "IN" => Ok(CompareOp::In),
            "CONTAINS" => Ok(CompareOp::Contains),
            _ => Err(Error::UnknownOperator(token.to_owned())),
        }
    }

    /// Whether a sidecar index can answer this operator.
    #[must_use]
    pub fn is_indexable(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::In | CompareOp::Contains)
    }

    /// Logical negation, where one exists as a single operator.
    pub(crate) fn negated(self) -> Option<Self> {
        match self {
            CompareOp::Eq => Some(CompareOp::Ne),
            CompareOp::Ne => Some(CompareOp::Eq),
            CompareOp::Lt => Some(CompareOp::Ge),
            CompareOp::Le => Some(CompareOp::Gt),
            CompareOp::Gt => Some(CompareOp::Le),
            CompareOp::Ge => Some(CompareOp::Lt),
            CompareOp::Like => Some(CompareOp::NotLike),
            CompareOp::NotLike => Some(CompareOp::Like),
            CompareOp::In | CompareOp::Contains => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
            CompareOp::In => "IN",
            CompareOp::Contains => "CONTAINS",
        })
    }
}

/// Row filter: a comparison leaf or a homogeneous group.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Three-element comparison leaf.
    Comparison {
        /// Field reference (possibly a verbatim function-call name).
        field: String,
        /// Operator.
        op: CompareOp,
        /// Literal right-hand side (`IN` carries a list).
        value: Value,
    },
    /// Conjunction; an empty conjunction is vacuously true.
    And(Vec<Predicate>),
    /// Disjunction; an empty disjunction matches nothing.
    Or(Vec<Predicate>),
}

/// One DNF clause: `(field, operator, value)`.
pub type Clause = (String, CompareOp, Value);

impl Predicate {
    /// Leaf constructor.
    pub fn comparison(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Comparison {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Compile a string expression.
    pub fn parse(expression: &str) -> Result<Self> {
        parse::parse_expression(expression)
    }

    /// Build an AND group from `(field, operator, value)` triples; the
    /// operator is given in its token form (`"=="`, `"IN"`, ...).
    pub fn all_of<F, O, V>(clauses: impl IntoIterator<Item = (F, O, V)>) -> Result<Self>
    where
        F: Into<String>,
        O: AsRef<str>,
        V: Into<Value>,
    {
        let mut group = Vec::new();
        for (field, op, value) in clauses {
            group.push(Predicate::Comparison {
                field: field.into(),
                op: CompareOp::parse(op.as_ref())?,
                value: value.into(),
            });
        }
        if group.is_empty() {
            return Err(Error::Syntax("empty predicate group".into()));
        }
        Ok(Predicate::And(group))
    }

    /// Build the full DNF form: an OR of AND groups.
    pub fn any_of<G, F, O, V>(groups: impl IntoIterator<Item = G>) -> Result<Self>
    where
        G: IntoIterator<Item = (F, O, V)>,
        F: Into<String>,
        O: AsRef<str>,
        V: Into<Value>,
    {
        let mut branches = Vec::new();
        for group in groups {
            branches.push(Self::all_of(group)?);
        }
        if branches.is_empty() {
            return Err(Error::Syntax("empty predicate".into()));
        }
        Ok(Predicate::Or(branches))
    }

    /// Build from the dynamic literal form: a JSON array of three-element
    /// comparisons (AND group), or an array of such arrays (OR of ANDs).
    ///
    /// Mixed siblings — a triple next to a group — are a structural error.
    pub fn from_literal(literal: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Array(items) = literal else {
            return Err(Error::Syntax("predicate literal must be an array".into()));
        };
        if items.is_empty() {
            return Err(Error::Syntax("empty predicate literal".into()));
        }
        let leaves = items.iter().filter(|i| is_literal_leaf(i)).count();
        if leaves == items.len() {
            let group = items
                .iter()
                .map(literal_leaf)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Predicate::And(group));
        }
        if leaves != 0 {
            return Err(Error::Syntax(
                "mixed predicate siblings: comparisons and groups at the same level".into(),
            ));
        }
        let mut branches = Vec::new();
        for item in items {
            let serde_json::Value::Array(clauses) = item else {
                return Err(Error::Syntax("predicate group must be an array".into()));
            };
            if clauses.is_empty() {
                return Err(Error::Syntax("empty predicate group".into()));
            }
            let group = clauses
                .iter()
                .map(literal_leaf)
                .collect::<Result<Vec<_>>>()?;
            branches.push(Predicate::And(group));
        }
        Ok(Predicate::Or(branches))
    }

    /// Lower to the nested-sequence DNF form: one inner sequence per AND
    /// group, sibling sequences per OR branch.
    #[must_use]
    pub fn to_dnf(&self) -> Vec<Vec<Clause>> {
        match self {
            Predicate::Comparison { field, op, value } => {
                vec![vec![(field.clone(), *op, value.clone())]]
            }
            Predicate::Or(children) => children.iter().flat_map(Predicate::to_dnf).collect(),
            Predicate::And(children) => {
                // Cross-product distribution of AND over OR.
                let mut groups: Vec<Vec<Clause>> = vec![Vec::new()];
                for child in children {
                    let child_groups = child.to_dnf();
                    let mut next = Vec::with_capacity(groups.len() * child_groups.len());
                    for group in &groups {
                        for child_group in &child_groups {
                            let mut merged = group.clone();
                            merged.extend(child_group.iter().cloned());
                            next.push(merged);
                        }
                    }
                    groups = next;
                }
                groups
            }
        }
    }

    /// Extract the index-answerable portion of this predicate.
    ///
    /// Conservative by construction: terms are returned only when searching
    /// them can never drop a truly matching row. AND groups contribute their
    /// indexable comparison children (other children are simply not pushed);
    /// an OR is pushed only when every branch is uniformly indexable,
    /// otherwise it is excluded entirely. Comparisons against literals the
    /// index never stores (nulls, whole sequences) are not pushed either.
    #[must_use]
    pub fn pushdown(&self) -> Option<Pushdown> {
        match self {
            Predicate::Comparison { .. } | Predicate::And(_) => {
                let terms = self.conjunctive_terms();
                (!terms.is_empty()).then_some(Pushdown {
                    mode: PushdownMode::Conjunctive,
                    terms,
                })
            }
            Predicate::Or(branches) => {
                if branches.is_empty() || !branches.iter().all(Predicate::fully_indexable) {
                    return None;
                }
                let terms: Vec<IndexTerm> = branches
                    .iter()
                    .flat_map(Predicate::conjunctive_terms)
                    .collect();
                (!terms.is_empty()).then_some(Pushdown {
                    mode: PushdownMode::Disjunctive,
                    terms,
                })
            }
        }
    }

    fn conjunctive_terms(&self) -> Vec<IndexTerm> {
        match self {
            Predicate::Comparison { field, op, value } => match op {
                CompareOp::Eq | CompareOp::Contains if pushable_value(value) => {
                    vec![IndexTerm {
                        field: field.clone(),
                        values: vec![value.clone()],
                    }]
                }
                CompareOp::In => {
                    let values = match value {
                        Value::List(items) => items.clone(),
                        single => vec![single.clone()],
                    };
                    if values.iter().all(pushable_value) {
                        vec![IndexTerm {
                            field: field.clone(),
                            values,
                        }]
                    } else {
                        Vec::new()
                    }
                }
                _ => Vec::new(),
            },
            Predicate::And(children) => children
                .iter()
                .flat_map(Predicate::conjunctive_terms)
                .collect(),
            // Disjunctions under an AND are not "joined exclusively by AND";
            // they are left out and verified by the full filter instead.
            Predicate::Or(_) => Vec::new(),
        }
    }

    fn fully_indexable(&self) -> bool {
        match self {
            Predicate::Comparison { op, value, .. } => {
                op.is_indexable() && pushable_operand(*op, value)
            }
            Predicate::And(children) | Predicate::Or(children) => {
                !children.is_empty() && children.iter().all(Predicate::fully_indexable)
            }
        }
    }
}

/// Whether the builder ever hashes a literal of this shape: nulls are never
/// indexed and sequences are flattened to their elements, so neither can be
/// searched as a term without dropping true matches.
fn pushable_value(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::List(_))
}

fn pushable_operand(op: CompareOp, value: &Value) -> bool {
    match op {
        CompareOp::In => match value {
            Value::List(items) => items.iter().all(pushable_value),
            single => pushable_value(single),
        },
        _ => pushable_value(value),
    }
}

fn is_literal_leaf(item: &serde_json::Value) -> bool {
    matches!(item, serde_json::Value::Array(parts)
        if parts.len() == 3 && parts[0].is_string() && parts[1].is_string())
}

fn literal_leaf(item: &serde_json::Value) -> Result<Predicate> {
    let serde_json::Value::Array(parts) = item else {
        return Err(Error::Syntax(format!("comparison must be an array: {item}")));
    };
    if parts.len() != 3 {
        return Err(Error::Syntax(format!(
            "comparison must have 3 elements, got {}",
            parts.len()
        )));
    }
    let (Some(field), Some(op)) = (parts[0].as_str(), parts[1].as_str()) else {
        return Err(Error::Syntax(format!(
            "comparison field and operator must be strings: {item}"
        )));
    };
    Ok(Predicate::Comparison {
        field: field.to_owned(),
        op: CompareOp::parse(op)?,
        value: Value::from_json(&parts[2]),
    })
}

/// One indexable restriction: candidate rows for `field` are the union of
/// the search results for `values`.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexTerm {
    /// Field the sidecar index must cover.
    pub field: String,
    /// Search terms, unioned.
    pub values: Vec<Value>,
}

/// How extracted terms combine at the index layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushdownMode {
    /// Terms intersect; a term whose field has no index widens to all rows.
    Conjunctive,
    /// Terms union; usable only when every term's field has an index.
    Disjunctive,
}

/// Index-answerable portion of a predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Pushdown {
    /// Combination discipline for `terms`.
    pub mode: PushdownMode,
    /// Extracted `(field, values)` restrictions.
    pub terms: Vec<IndexTerm>,
}
