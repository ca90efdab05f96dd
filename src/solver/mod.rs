//! Dependency resolution.
//!
//! A [`Solver`] looks at the registered packages and the subset currently
//! installed. It can either validate that a single install or uninstall is
//! possible right now (`check_*`), or compute the ordered list of jobs needed
//! to make it possible (`plan_*`).
//!
//! Planning works on a private [`WorkingSet`] cloned from the installed
//! packages, so a plan never touches the registry it was computed from.

mod job;

use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;

use crate::error::PackageError;
use crate::package::Package;

pub use job::{Action, Job, Problem};

/// Simulated set of installed packages, updated as jobs get planned.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    installed: BTreeMap<String, Package>,
}

impl WorkingSet {
    pub fn new(installed: &BTreeMap<String, Package>) -> Self {
        Self {
            installed: installed.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.installed.contains_key(name)
    }

    fn insert(&mut self, package: Package) {
        self.installed.insert(package.name().to_string(), package);
    }

    fn remove(&mut self, name: &str) {
        self.installed.remove(name);
    }

    /// Installed packages other than `name` that require `name`.
    fn dependents_of(&self, name: &str) -> Vec<Package> {
        self.installed
            .values()
            .filter(|p| p.name() != name && p.requires_package(name))
            .cloned()
            .collect()
    }
}

pub struct Solver<'a> {
    packages: &'a BTreeMap<String, Package>,
    installed: &'a BTreeMap<String, Package>,
}

impl<'a> Solver<'a> {
    /// `packages` holds every registered package, `installed` the subset with
    /// status installed.
    pub fn new(
        packages: &'a BTreeMap<String, Package>,
        installed: &'a BTreeMap<String, Package>,
    ) -> Self {
        Self {
            packages,
            installed,
        }
    }

    /// Fails with [`PackageError::DependencyConflict`] unless every
    /// requirement of `package` is installed.
    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn check_install(&self, package: &Package) -> Result<()> {
        for dependency in package.requires() {
            if self.installed.contains_key(dependency) {
                continue;
            }
            let reason = if self.packages.contains_key(dependency) {
                "which is not installed"
            } else {
                "which was not found"
            };
            return Err(PackageError::DependencyConflict(format!(
                "Package '{}' depends on '{}', {}.",
                package.name(),
                dependency,
                reason
            ))
            .into());
        }
        Ok(())
    }

    /// Fails with [`PackageError::DependencyConflict`] if an installed
    /// package still requires `package`.
    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn check_uninstall(&self, package: &Package) -> Result<()> {
        let dependent = self
            .installed
            .values()
            .find(|p| p.name() != package.name() && p.requires_package(package.name()));

        match dependent {
            Some(dependent) => Err(PackageError::DependencyConflict(format!(
                "Package '{}' depends on '{}'.",
                dependent.name(),
                package.name()
            ))
            .into()),
            None => Ok(()),
        }
    }

    /// Jobs installing `package`: missing dependencies first, deepest first,
    /// then `package` itself.
    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn plan_install(&self, package: &Package) -> Result<Problem> {
        let mut working = WorkingSet::new(self.installed);
        let mut problem = Problem::new();
        let mut path = vec![package.name().to_string()];

        self.resolve_install(package, &mut working, &mut problem, &mut path)?;
        push_unique(&mut problem, Job::install(package.clone()))?;

        debug!("Install plan for {}: {} job(s)", package.name(), problem.len());
        Ok(problem)
    }

    /// Jobs uninstalling `package`: installed dependents first, outermost
    /// first, then `package` itself.
    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn plan_uninstall(&self, package: &Package) -> Result<Problem> {
        let mut working = WorkingSet::new(self.installed);
        let mut problem = Problem::new();
        let mut path = vec![package.name().to_string()];

        self.resolve_uninstall(package, &mut working, &mut problem, &mut path)?;
        push_unique(&mut problem, Job::uninstall(package.clone()))?;

        debug!("Uninstall plan for {}: {} job(s)", package.name(), problem.len());
        Ok(problem)
    }

    fn resolve_install(
        &self,
        package: &Package,
        working: &mut WorkingSet,
        problem: &mut Problem,
        path: &mut Vec<String>,
    ) -> Result<()> {
        for name in package.requires() {
            if working.contains(name) {
                continue;
            }

            let Some(dependency) = self.packages.get(name) else {
                return Err(PackageError::DependencyConflict(format!(
                    "Package '{}' depends on '{}', which was not found.",
                    package.name(),
                    name
                ))
                .into());
            };

            enter(path, name)?;
            self.resolve_install(dependency, working, problem, path)?;
            path.pop();

            push_unique(problem, Job::install(dependency.clone()))?;
            working.insert(dependency.clone());
        }
        Ok(())
    }

    fn resolve_uninstall(
        &self,
        package: &Package,
        working: &mut WorkingSet,
        problem: &mut Problem,
        path: &mut Vec<String>,
    ) -> Result<()> {
        for dependent in working.dependents_of(package.name()) {
            if problem.contains(dependent.name()) {
                continue;
            }

            enter(path, dependent.name())?;
            self.resolve_uninstall(&dependent, working, problem, path)?;
            path.pop();

            working.remove(dependent.name());
            push_unique(problem, Job::uninstall(dependent))?;
        }
        Ok(())
    }
}

fn enter(path: &mut Vec<String>, name: &str) -> Result<()> {
    if path.iter().any(|visited| visited == name) {
        let mut cycle = path.clone();
        cycle.push(name.to_string());
        return Err(PackageError::CyclicDependency(cycle).into());
    }
    path.push(name.to_string());
    Ok(())
}

fn push_unique(problem: &mut Problem, job: Job) -> Result<()> {
    if problem.has_solution(&job) {
        return Ok(());
    }
    problem.add_solution(job)
}
