//! Version comparison compatible with the classic `version_compare` ordering.
//!
//! Versions are split into parts at `.`, `-`, `_`, `+` and at every switch
//! between digits and letters. Numeric parts compare numerically; textual
//! parts rank `dev < alpha = a < beta = b < RC = rc < (number) < pl = p`, and
//! any other text ranks below all of them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix marking a branch-style version (e.g. `dev-master`).
pub const BRANCH_PREFIX: &str = "dev-";

/// Comparison operator of a version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// The operator with its equality component removed (`<=` -> `<`, `==` -> ``).
    pub fn without_equality(self) -> &'static str {
        match self {
            Operator::Eq => "",
            Operator::Ne => "!",
            Operator::Lt | Operator::Le => "<",
            Operator::Gt | Operator::Ge => ">",
        }
    }

    /// Whether the operator carries an equality component.
    pub fn is_inclusive(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Le | Operator::Ge
        )
    }

    pub fn evaluate(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" | "=" | "eq" => Ok(Operator::Eq),
            "!=" | "<>" | "ne" => Ok(Operator::Ne),
            "<" | "lt" => Ok(Operator::Lt),
            "<=" | "le" => Ok(Operator::Le),
            ">" | "gt" => Ok(Operator::Gt),
            ">=" | "ge" => Ok(Operator::Ge),
            _ => anyhow::bail!("Unknown version operator '{}'.", s),
        }
    }
}

pub fn is_branch(version: &str) -> bool {
    version.starts_with(BRANCH_PREFIX)
}

/// Compare `a <op> b`.
///
/// Two branches only ever satisfy `==` with identical strings. A branch against
/// a regular version never matches unless `compare_branches` is set.
pub fn version_compare(a: &str, b: &str, operator: Operator, compare_branches: bool) -> bool {
    let a_is_branch = is_branch(a);
    let b_is_branch = is_branch(b);
    if a_is_branch && b_is_branch {
        return operator == Operator::Eq && a == b;
    }

    if !compare_branches && (a_is_branch || b_is_branch) {
        return false;
    }

    operator.evaluate(compare_versions(a, b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Number(u64),
    Text(String),
}

impl Part {
    fn rank(&self) -> i8 {
        match self {
            Part::Number(_) => 4,
            Part::Text(text) => special_rank(text),
        }
    }
}

fn special_rank(text: &str) -> i8 {
    const FORMS: [(&str, i8); 10] = [
        ("dev", 0),
        ("alpha", 1),
        ("a", 1),
        ("beta", 2),
        ("b", 2),
        ("RC", 3),
        ("rc", 3),
        ("#", 4),
        ("pl", 5),
        ("p", 5),
    ];

    FORMS
        .iter()
        .find(|(form, _)| text.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(-1)
}

fn split_parts(version: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let flush = |current: &mut String, is_digit: bool, parts: &mut Vec<Part>| {
        if current.is_empty() {
            return;
        }
        let part = if is_digit {
            match current.parse::<u64>() {
                Ok(n) => Part::Number(n),
                Err(_) => Part::Text(current.clone()),
            }
        } else {
            Part::Text(current.clone())
        };
        parts.push(part);
        current.clear();
    };

    for ch in version.trim().chars() {
        if matches!(ch, '.' | '-' | '_' | '+') {
            flush(&mut current, current_is_digit, &mut parts);
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit, &mut parts);
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    flush(&mut current, current_is_digit, &mut parts);

    parts
}

fn compare_parts(a: &Part, b: &Part) -> Ordering {
    match (a, b) {
        (Part::Number(x), Part::Number(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Total ordering of two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = split_parts(a);
    let right = split_parts(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = compare_parts(l, r);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    // A longer version wins when its next part is numeric, loses when it is a
    // pre-release marker ("1.0" > "1.0-beta").
    match left.len().cmp(&right.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => match &left[right.len()] {
            Part::Number(_) => Ordering::Greater,
            extra => extra.rank().cmp(&4),
        },
        Ordering::Less => match &right[left.len()] {
            Part::Number(_) => Ordering::Less,
            extra => 4.cmp(&extra.rank()),
        },
    }
}
