//! Minimal evaluation of `requires-python` constraints.
//!
//! Only numeric release segments are compared (`3.12.1`, `3.8`); anything
//! after the release (pre/post/dev tags, local versions) is ignored. A
//! constraint that cannot be parsed is never satisfied.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Arbitrary,
    Compatible,
    Eq,
    NotEq,
    LessEq,
    GreaterEq,
    Less,
    Greater,
}

const OPERATORS: &[(&str, Op)] = &[
    ("===", Op::Arbitrary),
    ("~=", Op::Compatible),
    ("==", Op::Eq),
    ("!=", Op::NotEq),
    ("<=", Op::LessEq),
    (">=", Op::GreaterEq),
    ("<", Op::Less),
    (">", Op::Greater),
];

/// Release segments of a version string, e.g. `3.12.0rc1` -> `[3, 12, 0]`.
pub fn release(version: &str) -> Option<Vec<u64>> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let version = version.split(['+', '-']).next().unwrap_or(version);
    let mut segments = Vec::new();
    for part in version.split('.') {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        segments.push(digits.parse().ok()?);
        if digits.len() != part.len() {
            break;
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

fn compare(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

fn prefix_matches(version: &[u64], prefix: &[u64]) -> bool {
    prefix
        .iter()
        .enumerate()
        .all(|(i, p)| version.get(i).copied().unwrap_or(0) == *p)
}

fn clause_holds(version_raw: &str, version: &[u64], clause: &str) -> Option<bool> {
    let clause = clause.trim();
    let (op, operand) = OPERATORS
        .iter()
        .find_map(|(text, op)| clause.strip_prefix(text).map(|rest| (*op, rest.trim())))?;

    if op == Op::Arbitrary {
        return Some(version_raw.trim() == operand);
    }

    if let Some(prefix) = operand.strip_suffix(".*") {
        let prefix = release(prefix)?;
        return match op {
            Op::Eq => Some(prefix_matches(version, &prefix)),
            Op::NotEq => Some(!prefix_matches(version, &prefix)),
            _ => None,
        };
    }

    let target = release(operand)?;
    let ord = compare(version, &target);
    Some(match op {
        Op::Eq => ord == Ordering::Equal,
        Op::NotEq => ord != Ordering::Equal,
        Op::LessEq => ord != Ordering::Greater,
        Op::GreaterEq => ord != Ordering::Less,
        Op::Less => ord == Ordering::Less,
        Op::Greater => ord == Ordering::Greater,
        Op::Compatible => {
            if target.len() < 2 {
                return None;
            }
            ord != Ordering::Less && prefix_matches(version, &target[..target.len() - 1])
        }
        Op::Arbitrary => version_raw.trim() == operand,
    })
}

/// Does `version` satisfy every comma-separated clause of `constraint`?
pub fn satisfies(version: &str, constraint: &str) -> bool {
    let Some(parsed) = release(version) else {
        return false;
    };
    let mut any_clause = false;
    for clause in constraint.split(',') {
        if clause.trim().is_empty() {
            continue;
        }
        any_clause = true;
        match clause_holds(version, &parsed, clause) {
            Some(true) => {}
            Some(false) | None => return false,
        }
    }
    any_clause
}
