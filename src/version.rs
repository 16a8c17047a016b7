//! Version comparison and constraint evaluation.
//!
//! Versions are dotted numeric strings (`1.20.1`). Comparison is
//! segment-wise: missing segments count as zero and non-digit characters
//! inside a segment are stripped before parsing, so `1.20.1-pre` and
//! `1.20` compare as `[1, 20, 1]` and `[1, 20, 0]`.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Compare two dotted version strings segment by segment.
pub fn compare(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = a.split('.').map(parse_segment).collect();
    let right: Vec<u64> = b.split('.').map(parse_segment).collect();

    let len = left.len().max(right.len());
    for i in 0..len {
        let x = left.get(i).copied().unwrap_or(0);
        let y = right.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// A segment that becomes empty after stripping non-digits parses as zero.
fn parse_segment(segment: &str) -> u64 {
    let digits: String = segment.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// A version constraint gating whether a bundle may load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// No constraint; always satisfied.
    Any,
    /// Numerically equal to the version.
    Exact(String),
    /// Greater than or equal to the version.
    AtLeast(String),
    /// Less than or equal to the version.
    AtMost(String),
    /// Strictly greater than the version.
    GreaterThan(String),
    /// Strictly less than the version.
    LessThan(String),
    /// Not equal (string match) to any version in the list.
    NotIn(Vec<String>),
}

impl Constraint {
    /// Parse a constraint expression.
    ///
    /// Grammar: `>=v`, `<=v`, `>v`, `<v`, `=v`, `!=["v1","v2"]`; a bare
    /// version means exact equality; an empty string means no constraint.
    pub fn parse(condition: &str) -> Result<Self> {
        let condition = condition.trim();
        if condition.is_empty() {
            return Ok(Self::Any);
        }

        if let Some(rest) = condition.strip_prefix("!=") {
            let versions: Vec<String> = serde_json::from_str(rest)
                .map_err(|e| Error::InvalidConstraint(format!("{condition}: {e}")))?;
            return Ok(Self::NotIn(versions));
        }

        if let Some(v) = condition.strip_prefix(">=") {
            Ok(Self::AtLeast(v.trim().to_string()))
        } else if let Some(v) = condition.strip_prefix("<=") {
            Ok(Self::AtMost(v.trim().to_string()))
        } else if let Some(v) = condition.strip_prefix('>') {
            Ok(Self::GreaterThan(v.trim().to_string()))
        } else if let Some(v) = condition.strip_prefix('<') {
            Ok(Self::LessThan(v.trim().to_string()))
        } else if let Some(v) = condition.strip_prefix('=') {
            Ok(Self::Exact(v.trim().to_string()))
        } else {
            Ok(Self::Exact(condition.to_string()))
        }
    }

    /// Evaluate the constraint against a concrete version.
    pub fn satisfied_by(&self, version: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => compare(version, v) == Ordering::Equal,
            Self::AtLeast(v) => compare(version, v) != Ordering::Less,
            Self::AtMost(v) => compare(version, v) != Ordering::Greater,
            Self::GreaterThan(v) => compare(version, v) == Ordering::Greater,
            Self::LessThan(v) => compare(version, v) == Ordering::Less,
            Self::NotIn(list) => !list.iter().any(|v| v == version),
        }
    }
}

/// Parse-then-evaluate convenience for manifest constraint strings.
///
/// A malformed condition fails closed: the offending expression is logged
/// and the result is `false`, so the dependent bundle is skipped.
pub fn satisfies(current: &str, condition: &str) -> bool {
    match Constraint::parse(condition) {
        Ok(constraint) => constraint.satisfied_by(current),
        Err(err) => {
            tracing::warn!(condition, version = current, %err, "malformed version constraint");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_basic() {
        assert_eq!(compare("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("2.0", "1.9.9"), Ordering::Greater);
    }

    #[test]
    fn test_compare_missing_segments_are_zero() {
        assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare("1", "1.0.1"), Ordering::Less);
        assert_eq!(compare("1.0.0.1", "1"), Ordering::Greater);
    }

    #[test]
    fn test_compare_strips_non_digits() {
        assert_eq!(compare("1.2b", "1.2"), Ordering::Equal);
        assert_eq!(compare("1.20.1-pre", "1.20.1"), Ordering::Equal);
        // A segment with no digits parses as zero.
        assert_eq!(compare("1.x", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(
            Constraint::parse(">=1.20.1").unwrap(),
            Constraint::AtLeast("1.20.1".into())
        );
        assert_eq!(
            Constraint::parse("<=1.20.1").unwrap(),
            Constraint::AtMost("1.20.1".into())
        );
        assert_eq!(
            Constraint::parse(">1.0").unwrap(),
            Constraint::GreaterThan("1.0".into())
        );
        assert_eq!(
            Constraint::parse("<1.0").unwrap(),
            Constraint::LessThan("1.0".into())
        );
        assert_eq!(
            Constraint::parse("=1.0").unwrap(),
            Constraint::Exact("1.0".into())
        );
        // Bare version means exact equality.
        assert_eq!(
            Constraint::parse("1.0").unwrap(),
            Constraint::Exact("1.0".into())
        );
        assert_eq!(Constraint::parse("").unwrap(), Constraint::Any);
    }

    #[test]
    fn test_parse_not_in() {
        let c = Constraint::parse(r#"!=["1.0.0", "2.0.0"]"#).unwrap();
        assert_eq!(c, Constraint::NotIn(vec!["1.0.0".into(), "2.0.0".into()]));
    }

    #[test]
    fn test_parse_malformed_not_in() {
        assert!(Constraint::parse("!=[1.0.0").is_err());
        assert!(Constraint::parse("!=oops").is_err());
    }

    #[test]
    fn test_satisfies_matches_compare() {
        let pairs = [
            ("1.0.0", "1.0.0"),
            ("1.2.3", "1.10.0"),
            ("2.0", "1.9.9"),
            ("1.20.1", "1.20"),
        ];
        for (a, b) in pairs {
            let cmp = compare(a, b);
            assert_eq!(satisfies(a, &format!(">={b}")), cmp != Ordering::Less);
            assert_eq!(satisfies(a, &format!("<={b}")), cmp != Ordering::Greater);
            assert_eq!(satisfies(a, &format!(">{b}")), cmp == Ordering::Greater);
            assert_eq!(satisfies(a, &format!("<{b}")), cmp == Ordering::Less);
            assert_eq!(satisfies(a, &format!("={b}")), cmp == Ordering::Equal);
        }
    }

    #[test]
    fn test_satisfies_not_in() {
        let condition = r#"!=["1.0.0","2.0.0"]"#;
        assert!(!satisfies("1.0.0", condition));
        assert!(!satisfies("2.0.0", condition));
        assert!(satisfies("1.5.0", condition));
        assert!(satisfies("3.0.0", condition));
    }

    #[test]
    fn test_satisfies_empty_condition() {
        assert!(satisfies("1.0.0", ""));
        assert!(satisfies("anything", "  "));
    }

    #[test]
    fn test_satisfies_fails_closed() {
        assert!(!satisfies("1.0.0", "!=[broken"));
    }
}
