//! Recursive predicate evaluator.
//!
//! Comparison operators dispatch on [`CompareOp`]; `LIKE` patterns compile
//! to anchored regular expressions memoized in a bounded cache owned by the
//! evaluator instance. Per-row recompilation dominates cost otherwise, and
//! keeping the cache off process-global state makes it reset-able and
//! testable.

use std::collections::{HashMap, VecDeque};

use regex::Regex;

use super::{CompareOp, Predicate};
use crate::{
    logging::granary_log,
    record::Record,
    value::Value,
};

const DEFAULT_LIKE_CACHE_CAPACITY: usize = 64;

/// Evaluates predicates against records.
#[derive(Debug)]
pub struct Evaluator {
    like: LikeCache,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Evaluator with the default `LIKE` cache capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_like_capacity(DEFAULT_LIKE_CACHE_CAPACITY)
    }

    /// Evaluator with an explicit `LIKE` cache capacity (minimum 1).
    #[must_use]
    pub fn with_like_capacity(capacity: usize) -> Self {
        Self {
            like: LikeCache::new(capacity.max(1)),
        }
    }

    /// Drop all memoized `LIKE` patterns.
    pub fn reset(&mut self) {
        self.like.clear();
    }

    /// Whether `record` satisfies `predicate`.
    pub fn matches(&mut self, predicate: &Predicate, record: &Record) -> bool {
        match predicate {
            Predicate::Comparison { field, op, value } => {
                self.compare(record.value_or_null(field), *op, value)
            }
            Predicate::And(children) => children.iter().all(|c| self.matches(c, record)),
            Predicate::Or(children) => children.iter().any(|c| self.matches(c, record)),
        }
    }

    fn compare(&mut self, lhs: Value, op: CompareOp, rhs: &Value) -> bool {
        match op {
            CompareOp::Eq => lhs.eq_value(rhs),
            CompareOp::Ne => !lhs.eq_value(rhs),
            CompareOp::Lt => matches!(lhs.cmp_value(rhs), Some(std::cmp::Ordering::Less)),
            CompareOp::Le => matches!(
                lhs.cmp_value(rhs),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            CompareOp::Gt => matches!(lhs.cmp_value(rhs), Some(std::cmp::Ordering::Greater)),
            CompareOp::Ge => matches!(
                lhs.cmp_value(rhs),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            CompareOp::Like => self.like_matches(&lhs, rhs),
            CompareOp::NotLike => !lhs.is_null() && !self.like_matches(&lhs, rhs),
            CompareOp::In => match rhs {
                Value::List(candidates) => candidates.iter().any(|c| lhs.eq_value(c)),
                single => lhs.eq_value(single),
            },
            CompareOp::Contains => lhs.contains_value(rhs),
        }
    }

    fn like_matches(&mut self, lhs: &Value, pattern: &Value) -> bool {
        if lhs.is_null() {
            return false;
        }
        self.like.matches(&pattern.index_key(), &lhs.index_key())
    }
}

/// Bounded FIFO memo of compiled wildcard patterns.
#[derive(Debug)]
struct LikeCache {
    capacity: usize,
    compiled: HashMap<String, Regex>,
    order: VecDeque<String>,
}

impl LikeCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            compiled: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn clear(&mut self) {
        self.compiled.clear();
        self.order.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.len()
    }

    fn matches(&mut self, pattern: &str, text: &str) -> bool {
        if let Some(regex) = self.compiled.get(pattern) {
            return regex.is_match(text);
        }
        let Ok(regex) = Regex::new(&wildcard_to_regex(pattern)) else {
            // Unreachable for escaped wildcard translation; never a row error.
            granary_log!(
                log::Level::Warn,
                "like_compile_failed",
                "pattern={pattern:?}"
            );
            return false;
        };
        let matched = regex.is_match(text);
        if self.compiled.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.compiled.remove(&evicted);
            }
        }
        self.order.push_back(pattern.to_owned());
        self.compiled.insert(pattern.to_owned(), regex);
        matched
    }
}

/// Translate a SQL wildcard pattern into an anchored regular expression:
/// `%` matches any run, `_` any single character, everything else literally.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        Record::from_pairs(pairs.iter().map(|(k, v)| (*k, v.clone())))
    }

    #[test]
    fn like_wildcards_match_runs_and_single_characters() {
        let mut ev = Evaluator::new();
        let p = Predicate::comparison("day", CompareOp::Like, "%-12-%");
        assert!(ev.matches(&p, &rec(&[("day", Value::from("2023-12-25"))])));
        assert!(!ev.matches(&p, &rec(&[("day", Value::from("2023-11-12"))])));

        let single = Predicate::comparison("code", CompareOp::Like, "a_c");
        assert!(ev.matches(&single, &rec(&[("code", Value::from("abc"))])));
        assert!(!ev.matches(&single, &rec(&[("code", Value::from("abbc"))])));
    }

    #[test]
    fn like_pattern_metacharacters_are_literal() {
        let mut ev = Evaluator::new();
        let p = Predicate::comparison("s", CompareOp::Like, "%a.b%");
        assert!(ev.matches(&p, &rec(&[("s", Value::from("xa.by"))])));
        assert!(!ev.matches(&p, &rec(&[("s", Value::from("xaXby"))])));
    }

    #[test]
    fn like_cache_is_bounded_and_resettable() {
        let mut ev = Evaluator::with_like_capacity(2);
        for i in 0..5 {
            let p = Predicate::comparison("s", CompareOp::Like, format!("%{i}%"));
            ev.matches(&p, &rec(&[("s", Value::from("123"))]));
        }
        assert_eq!(ev.like.len(), 2);
        ev.reset();
        assert_eq!(ev.like.len(), 0);
    }

    #[test]
    fn null_fields_fail_ordered_comparisons() {
        let mut ev = Evaluator::new();
        let record = rec(&[("present", Value::Int(1))]);
        assert!(!ev.matches(
            &Predicate::comparison("missing", CompareOp::Gt, 0),
            &record
        ));
        assert!(!ev.matches(
            &Predicate::comparison("missing", CompareOp::Like, "%"),
            &record
        ));
        assert!(ev.matches(
            &Predicate::comparison("missing", CompareOp::Eq, Value::Null),
            &record
        ));
    }

    #[test]
    fn empty_groups_follow_logical_identities() {
        let mut ev = Evaluator::new();
        let record = rec(&[]);
        assert!(ev.matches(&Predicate::And(Vec::new()), &record));
        assert!(!ev.matches(&Predicate::Or(Vec::new()), &record));
    }

    #[test]
    fn in_membership_uses_value_equality() {
        let mut ev = Evaluator::new();
        let p = Predicate::comparison(
            "age",
            CompareOp::In,
            Value::List(vec![Value::Int(10), Value::Int(11)]),
        );
        assert!(ev.matches(&p, &rec(&[("age", Value::Float(11.0))])));
        assert!(!ev.matches(&p, &rec(&[("age", Value::Int(12))])));
    }
}
