//! Recursive-descent expression parser.
//!
//! Precedence, loosest first: `OR < AND < NOT < comparison`. Parenthesized
//! sub-expressions recurse into the top rule. `NOT` is lowered during
//! parsing — comparisons negate their operator, groups distribute through
//! De Morgan — so the AST stays within `Comparison | And | Or`.

use super::{
    token::{tokenize, Token},
    CompareOp, Predicate,
};
use crate::{
    error::{Error, Result},
    value::Value,
};

pub(crate) fn parse_expression(input: &str) -> Result<Predicate> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::Syntax("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.or_expr()?;
    match parser.peek() {
        None => Ok(predicate),
        Some(tok) => Err(Error::Syntax(format!("trailing input at {tok:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref tok) if tok == expected => Ok(()),
            other => Err(Error::Syntax(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn or_expr(&mut self) -> Result<Predicate> {
        let mut parts = vec![self.and_expr()?];
        while self.eat(&Token::Or) {
            parts.push(self.and_expr()?);
        }
        Ok(flatten(parts, false))
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let mut parts = vec![self.not_expr()?];
        while self.eat(&Token::And) {
            parts.push(self.not_expr()?);
        }
        Ok(flatten(parts, true))
    }

    fn not_expr(&mut self) -> Result<Predicate> {
        if self.eat(&Token::Not) {
            let inner = self.not_expr()?;
            return negate(inner);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate> {
        if self.eat(&Token::LParen) {
            let inner = self.or_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate> {
        let field = match self.next() {
            Some(Token::Field(name)) => name,
            other => {
                return Err(Error::Syntax(format!(
                    "expected field reference, found {other:?}"
                )))
            }
        };
        // `NOT LIKE` / `NOT IN` arrive as a NOT between field and operator.
        let negated = self.eat(&Token::Not);
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(Error::Syntax(format!(
                    "expected operator after '{field}', found {other:?}"
                )))
            }
        };
        let comparison = match op {
            CompareOp::In => {
                self.expect(&Token::LParen)?;
                let mut values = vec![self.literal()?];
                while self.eat(&Token::Comma) {
                    values.push(self.literal()?);
                }
                self.expect(&Token::RParen)?;
                Predicate::Comparison {
                    field,
                    op: CompareOp::In,
                    value: Value::List(values),
                }
            }
            op => Predicate::Comparison {
                field,
                op,
                value: self.literal()?,
            },
        };
        if negated {
            negate(comparison)
        } else {
            Ok(comparison)
        }
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Float(x)) => Ok(Value::Float(x)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Date(d)) => Ok(Value::Date(d)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            other => Err(Error::Syntax(format!("expected literal, found {other:?}"))),
        }
    }
}

fn flatten(mut parts: Vec<Predicate>, conjunction: bool) -> Predicate {
    if parts.len() == 1 {
        return parts.pop().expect("non-empty parts");
    }
    if conjunction {
        Predicate::And(parts)
    } else {
        Predicate::Or(parts)
    }
}

/// Logical negation without a `Not` node.
pub(crate) fn negate(predicate: Predicate) -> Result<Predicate> {
    match predicate {
        Predicate::Comparison { field, op, value } => match op.negated() {
            Some(op) => Ok(Predicate::Comparison { field, op, value }),
            None => match (op, value) {
                // NOT IN (a, b) becomes field != a AND field != b.
                (CompareOp::In, Value::List(values)) => Ok(Predicate::And(
                    values
                        .into_iter()
                        .map(|v| Predicate::Comparison {
                            field: field.clone(),
                            op: CompareOp::Ne,
                            value: v,
                        })
                        .collect(),
                )),
                (CompareOp::In, value) => Ok(Predicate::Comparison {
                    field,
                    op: CompareOp::Ne,
                    value,
                }),
                (op, _) => Err(Error::UnknownOperator(format!("NOT {op}"))),
            },
        },
        Predicate::And(children) => Ok(Predicate::Or(
            children
                .into_iter()
                .map(negate)
                .collect::<Result<Vec<_>>>()?,
        )),
        Predicate::Or(children) => Ok(Predicate::And(
            children
                .into_iter()
                .map(negate)
                .collect::<Result<Vec<_>>>()?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_binds_and_tighter_than_or() {
        let p = parse_expression("a = 1 OR b = 2 AND c = 3").unwrap();
        match p {
            Predicate::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Predicate::Comparison { .. }));
                assert!(matches!(&parts[1], Predicate::And(inner) if inner.len() == 2));
            }
            other => panic!("expected OR at root, got {other:?}"),
        }
    }

    #[test]
    fn parentheses_recurse_into_top_rule() {
        let p = parse_expression("(a = 1 OR b = 2) AND c = 3").unwrap();
        match p {
            Predicate::And(parts) => {
                assert!(matches!(&parts[0], Predicate::Or(inner) if inner.len() == 2));
            }
            other => panic!("expected AND at root, got {other:?}"),
        }
    }

    #[test]
    fn not_distributes_over_groups() {
        let p = parse_expression("NOT (a = 1 AND b < 2)").unwrap();
        assert_eq!(
            p,
            Predicate::Or(vec![
                Predicate::Comparison {
                    field: "a".into(),
                    op: CompareOp::Ne,
                    value: Value::Int(1),
                },
                Predicate::Comparison {
                    field: "b".into(),
                    op: CompareOp::Ge,
                    value: Value::Int(2),
                },
            ])
        );
    }

    #[test]
    fn not_in_expands_to_conjunction() {
        let p = parse_expression("x NOT IN (1, 2)").unwrap();
        assert!(matches!(&p, Predicate::And(parts) if parts.len() == 2));
    }

    #[test]
    fn not_like_negates_the_operator() {
        let p = parse_expression("name NOT LIKE '%po%'").unwrap();
        assert!(matches!(
            p,
            Predicate::Comparison {
                op: CompareOp::NotLike,
                ..
            }
        ));
    }

    #[test]
    fn in_list_parses_into_list_value() {
        let p = parse_expression("x IN (1, 'two', 2023-01-05)").unwrap();
        match p {
            Predicate::Comparison {
                op: CompareOp::In,
                value: Value::List(values),
                ..
            } => assert_eq!(values.len(), 3),
            other => panic!("expected IN comparison, got {other:?}"),
        }
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(matches!(
            parse_expression("a = 1 b = 2"),
            Err(Error::Syntax(_))
        ));
        assert!(matches!(parse_expression(""), Err(Error::Syntax(_))));
    }
}
