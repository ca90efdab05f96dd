use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::PackageError;
use crate::package::Package;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Uninstall,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install => f.write_str("install"),
            Action::Uninstall => f.write_str("uninstall"),
        }
    }
}

/// One planned action on one package.
///
/// Jobs compare by package name only: a plan can hold at most one job per
/// package, whatever the action.
#[derive(Debug, Clone)]
pub struct Job {
    action: Action,
    package: Package,
}

impl Job {
    pub fn new(action: Action, package: Package) -> Self {
        Self { action, package }
    }

    pub fn install(package: Package) -> Self {
        Self::new(Action::Install, package)
    }

    pub fn uninstall(package: Package) -> Self {
        Self::new(Action::Uninstall, package)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Job {}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.action, self.name())
    }
}

/// Ordered, duplicate-free list of jobs. Iteration order is execution order.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    solutions: Vec<Job>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_solution(&mut self, job: Job) -> Result<()> {
        if self.has_solution(&job) {
            return Err(PackageError::DuplicateSolution {
                package: job.name().to_string(),
                action: job.action(),
            }
            .into());
        }
        self.solutions.push(job);
        Ok(())
    }

    pub fn has_solution(&self, job: &Job) -> bool {
        self.contains(job.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.solutions.iter().any(|j| j.name() == name)
    }

    pub fn solutions(&self) -> &[Job] {
        &self.solutions
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

impl IntoIterator for Problem {
    type Item = Job;
    type IntoIter = std::vec::IntoIter<Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.solutions.into_iter()
    }
}

impl<'p> IntoIterator for &'p Problem {
    type Item = &'p Job;
    type IntoIter = std::slice::Iter<'p, Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.solutions.iter()
    }
}
