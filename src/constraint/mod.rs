//! Version constraints.
//!
//! A [`Constraint`] is either a single `operator version` pair, a conjunctive
//! or disjunctive group of constraints, or the wildcard that matches anything.
//! Matching asks whether two constraints can be satisfied together: a
//! requirement such as `>=1.0` matches a provided `==1.2`.
//!
//! Constraint strings follow a small grammar:
//!
//! - `*` or an empty string is the wildcard
//! - `||` (or a single `|`) separates alternatives
//! - `,` or whitespace separates constraints that must all hold
//! - a leaf is an optional operator followed by a version (`>=1.0`, `ge 1.0`, `1.0`)

mod version;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};

pub use version::{BRANCH_PREFIX, Operator, compare_versions, is_branch, version_compare};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `operator version`, e.g. `>= 1.0`.
    Version { operator: Operator, version: String },
    /// Group of constraints; `conjunctive` groups need every member to match,
    /// disjunctive groups need at least one.
    Multi {
        constraints: Vec<Constraint>,
        conjunctive: bool,
    },
    /// Matches everything.
    Any,
}

type MatchKey = (Operator, String, Operator, String, bool);

thread_local! {
    static MATCH_CACHE: RefCell<HashMap<MatchKey, bool>> = RefCell::new(HashMap::new());
}

impl Constraint {
    pub fn version(operator: Operator, version: impl Into<String>) -> Self {
        Constraint::Version {
            operator,
            version: version.into(),
        }
    }

    /// `== version`
    pub fn exact(version: impl Into<String>) -> Self {
        Self::version(Operator::Eq, version)
    }

    pub fn all(constraints: Vec<Constraint>) -> Self {
        Constraint::Multi {
            constraints,
            conjunctive: true,
        }
    }

    pub fn any_of(constraints: Vec<Constraint>) -> Self {
        Constraint::Multi {
            constraints,
            conjunctive: false,
        }
    }

    /// Whether this constraint can be satisfied together with `provider`.
    ///
    /// Branch versions (`dev-*`) are only compared for exact equality.
    pub fn matches(&self, provider: &Constraint) -> bool {
        self.matches_with(provider, false)
    }

    /// Like [`Constraint::matches`], but lets branch versions take part in
    /// ordinary version comparisons against numeric versions.
    pub fn matches_comparing_branches(&self, provider: &Constraint) -> bool {
        self.matches_with(provider, true)
    }

    fn matches_with(&self, provider: &Constraint, compare_branches: bool) -> bool {
        match (self, provider) {
            (Constraint::Any, _) | (_, Constraint::Any) => true,
            (
                Constraint::Multi {
                    constraints,
                    conjunctive,
                },
                _,
            ) => {
                if *conjunctive {
                    constraints
                        .iter()
                        .all(|c| c.matches_with(provider, compare_branches))
                } else {
                    constraints
                        .iter()
                        .any(|c| c.matches_with(provider, compare_branches))
                }
            }
            (Constraint::Version { .. }, Constraint::Multi { .. }) => {
                provider.matches_with(self, compare_branches)
            }
            (
                Constraint::Version { operator, version },
                Constraint::Version {
                    operator: provided_operator,
                    version: provided_version,
                },
            ) => {
                let key = (
                    *operator,
                    version.clone(),
                    *provided_operator,
                    provided_version.clone(),
                    compare_branches,
                );
                if let Some(hit) = MATCH_CACHE.with(|cache| cache.borrow().get(&key).copied()) {
                    return hit;
                }

                let result = match_specific(
                    *operator,
                    version,
                    *provided_operator,
                    provided_version,
                    compare_branches,
                );
                MATCH_CACHE.with(|cache| cache.borrow_mut().insert(key, result));
                result
            }
        }
    }

    /// Parse a constraint string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() || input == "*" {
            return Ok(Constraint::Any);
        }

        let mut alternatives = Vec::new();
        for alternative in input.split("||").flat_map(|part| part.split('|')) {
            alternatives.push(parse_conjunction(alternative)?);
        }

        Ok(collapse(alternatives, false))
    }
}

fn match_specific(
    operator: Operator,
    version: &str,
    provided_operator: Operator,
    provided_version: &str,
    compare_branches: bool,
) -> bool {
    let is_branch_required = is_branch(version);
    let is_branch_provided = is_branch(provided_version);
    if is_branch_required && is_branch_provided {
        return operator == Operator::Eq
            && provided_operator == Operator::Eq
            && version == provided_version;
    }
    if (is_branch_required || is_branch_provided) && !compare_branches {
        return false;
    }

    if operator == Operator::Ne || provided_operator == Operator::Ne {
        return (operator != Operator::Eq && provided_operator != Operator::Eq)
            || version_compare(provided_version, version, Operator::Ne, compare_branches);
    }

    // e.g. `<= 2.0` against `< 1.0`: both are open towards the same side
    if operator != Operator::Eq && operator.without_equality() == provided_operator.without_equality()
    {
        return true;
    }

    if !version_compare(provided_version, version, operator, compare_branches) {
        return false;
    }

    // `>= 1.0` against `< 1.0`: the boundary itself is outside the provided range
    !(provided_version == version && !provided_operator.is_inclusive() && operator.is_inclusive())
}

fn parse_conjunction(input: &str) -> Result<Constraint> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let mut constraints = Vec::new();
    let mut pending_operator: Option<Operator> = None;
    for token in tokens {
        if let Ok(operator) = token.parse::<Operator>() {
            if pending_operator.is_some() {
                bail!("Invalid constraint '{}': operator without version.", input.trim());
            }
            pending_operator = Some(operator);
            continue;
        }

        let leaf = match pending_operator.take() {
            Some(operator) => Constraint::version(operator, token),
            None => parse_leaf(token)?,
        };
        constraints.push(leaf);
    }

    if pending_operator.is_some() {
        bail!("Invalid constraint '{}': operator without version.", input.trim());
    }
    if constraints.is_empty() {
        bail!("Invalid constraint: empty alternative.");
    }

    Ok(collapse(constraints, true))
}

fn parse_leaf(token: &str) -> Result<Constraint> {
    if token == "*" {
        return Ok(Constraint::Any);
    }

    let split = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
        .unwrap_or(token.len());
    let (operator, version) = token.split_at(split);
    if !version.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        bail!("Invalid constraint '{}': missing version.", token);
    }

    let operator = if operator.is_empty() {
        Operator::Eq
    } else {
        operator.parse()?
    };

    Ok(Constraint::version(operator, version))
}

fn collapse(mut constraints: Vec<Constraint>, conjunctive: bool) -> Constraint {
    if constraints.len() == 1 {
        return constraints.remove(0);
    }
    Constraint::Multi {
        constraints,
        conjunctive,
    }
}

impl FromStr for Constraint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Version { operator, version } => write!(f, "{} {}", operator, version),
            Constraint::Multi {
                constraints,
                conjunctive,
            } => {
                let separator = if *conjunctive { ", " } else { " | " };
                let parts: Vec<String> = constraints.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(separator))
            }
            Constraint::Any => f.write_str("[]"),
        }
    }
}
