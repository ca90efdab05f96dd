//! Package lifecycle orchestration.
//!
//! [`PackageManager`] is the only component with durable side effects. It
//! reads the lock file (the catalog of available packages) and the registry,
//! asks the [`Solver`] whether a transition is possible, runs the package's
//! installers as one transaction, and only then commits the new status.
//!
//! Per package the state machine is `Uninstalled <-> Installed`, on top of
//! being registered or not.

mod session;

use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::error::{PackageError, TransactionFailure};
use crate::installer::{self, InstallerRegistry};
use crate::package::tree::merge_tree;
use crate::package::{Catalog, EXTRA_KEY, GlobalMetadata, Manifest, Package};
use crate::registry::{Registry, RegistryEntry, Status};
use crate::runtime::Runtime;
use crate::runtime::path::{expand_library_path, format_library_path};
use crate::solver::{Action, Problem, Solver};

pub use session::Session;

/// Failed step named in a [`TransactionFailure`] when the registry could not be saved.
const REGISTRY_STEP: &str = "registry";

/// What the manager did to a package, as reported by the bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAction {
    Register,
    Unregister,
    Install,
    Uninstall,
}

impl fmt::Display for ManagerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManagerAction::Register => "register",
            ManagerAction::Unregister => "unregister",
            ManagerAction::Install => "install",
            ManagerAction::Uninstall => "uninstall",
        })
    }
}

impl From<Action> for ManagerAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Install => ManagerAction::Install,
            Action::Uninstall => ManagerAction::Uninstall,
        }
    }
}

pub type Report = Vec<(String, ManagerAction)>;

/// Lifecycle notifications, delivered after the transition is saved.
pub trait PackageListener<R: Runtime> {
    fn on_install(&self, _manager: &PackageManager<'_, R>, _package: &Package) {}
    fn on_uninstall(&self, _manager: &PackageManager<'_, R>, _package: &Package) {}
    fn on_register(&self, _manager: &PackageManager<'_, R>, _package: &Package) {}
    fn on_unregister(&self, _manager: &PackageManager<'_, R>, _package: &Package) {}
}

pub struct PackageManager<'a, R: Runtime> {
    runtime: &'a R,
    config: Config,
    installers: InstallerRegistry<'a>,
    metadata: GlobalMetadata,
    registry: Registry<'a, R>,
    session: Session,
    listeners: Vec<Box<dyn PackageListener<R> + 'a>>,
}

impl<'a, R: Runtime> PackageManager<'a, R> {
    #[tracing::instrument(skip_all, fields(root = ?config.root))]
    pub fn open(
        runtime: &'a R,
        config: Config,
        installers: InstallerRegistry<'a>,
        metadata: GlobalMetadata,
    ) -> Result<Self> {
        let registry = Registry::load(runtime, &config.packages_dir)?;
        Ok(Self {
            runtime,
            config,
            installers,
            metadata,
            registry,
            session: Session::new(),
            listeners: Vec::new(),
        })
    }

    pub fn add_listener(&mut self, listener: Box<dyn PackageListener<R> + 'a>) {
        self.listeners.push(listener);
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn libs_dir(&self) -> &Path {
        &self.config.libs_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config.config_dir
    }

    pub fn resources_dir(&self) -> &Path {
        &self.config.resources_dir
    }

    pub fn registry(&self) -> &Registry<'a, R> {
        &self.registry
    }

    fn catalog(&self) -> Result<&Catalog> {
        self.session
            .catalog(|| Catalog::load(self.runtime, &self.config.lock_file))
    }

    /// Build the descriptor of `name`.
    ///
    /// Data comes from the lock file, or from the registry snapshot (and its
    /// registered path) once the package left the lock file. A manifest inside the package directory
    /// takes precedence; without one the package is virtual and the global
    /// metadata for its version is merged beneath its data.
    #[tracing::instrument(skip(self))]
    pub fn create_instance(&self, name: &str) -> Result<Package> {
        let libs_dir = &self.config.libs_dir;
        let (mut data, path) = match (self.catalog()?.get(name), self.registry.get(name)) {
            (Some(entry), _) => (entry.clone(), libs_dir.join(name)),
            (None, Some(entry)) => (
                snapshot_data(name, entry)?,
                expand_library_path(&entry.path, libs_dir),
            ),
            (None, None) => return Err(not_found(name)),
        };

        for file in &self.config.manifest_files {
            let manifest_path = path.join(file);
            if self.runtime.exists(&manifest_path) {
                debug!("Loading manifest {:?}", manifest_path);
                let manifest = Manifest::load(self.runtime, &manifest_path)?;
                return Ok(Package::live(self.runtime, manifest, path));
            }
        }

        if let Some(patch) = self.version(name)?.and_then(|v| self.metadata.lookup(name, &v)) {
            debug!("Applying global metadata to {}", name);
            merge_tree(&mut data, &json!({"extra": {EXTRA_KEY: patch}}));
        }
        Ok(Package::new_virtual(
            self.runtime,
            Manifest::from_value(data)?,
            path,
        ))
    }

    pub fn status(&self, name: &str) -> Result<Status> {
        self.registry.status(name)
    }

    /// Version from the lock file, else the registered one.
    pub fn version(&self, name: &str) -> Result<Option<String>> {
        if self.catalog()?.contains(name) {
            return Ok(self.catalog()?.version(name).map(String::from));
        }
        match self.registry.get(name) {
            Some(entry) => Ok(entry.version.clone()),
            None => Err(not_found(name)),
        }
    }

    /// Descriptors of every registered package.
    pub fn packages(&self) -> Result<&BTreeMap<String, Package>> {
        self.session.packages(|| {
            self.registry
                .names()
                .map(|name| -> Result<(String, Package)> {
                    Ok((name.to_string(), self.create_instance(name)?))
                })
                .collect()
        })
    }

    pub fn packages_by_status(&self, status: Status) -> Result<BTreeMap<String, Package>> {
        let mut selected = BTreeMap::new();
        for (name, package) in self.packages()? {
            if self.status(name)? == status {
                selected.insert(name.clone(), package.clone());
            }
        }
        Ok(selected)
    }

    /// Plan installing `package` without changing anything.
    pub fn test_install(&self, package: &Package) -> Result<Problem> {
        let installed = self.packages_by_status(Status::Installed)?;
        Solver::new(self.packages()?, &installed).plan_install(package)
    }

    /// Plan uninstalling `package` without changing anything.
    pub fn test_uninstall(&self, package: &Package) -> Result<Problem> {
        let installed = self.packages_by_status(Status::Installed)?;
        Solver::new(self.packages()?, &installed).plan_uninstall(package)
    }

    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn register(&mut self, package: &Package) -> Result<()> {
        let entry = RegistryEntry {
            status: Status::Uninstalled,
            path: format_library_path(package.path(), &self.config.libs_dir),
            version: self.version(package.name())?,
            metadata: package.snapshot(),
        };
        self.commit(|registry| {
            registry.insert(package.name(), entry);
            Ok(())
        })?;

        info!("Registered {}", package.name());
        for listener in &self.listeners {
            listener.on_register(self, package);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn unregister(&mut self, package: &Package) -> Result<()> {
        if !self.registry.contains(package.name()) {
            return Err(not_found(package.name()));
        }
        self.commit(|registry| {
            registry.remove(package.name());
            Ok(())
        })?;

        info!("Unregistered {}", package.name());
        for listener in &self.listeners {
            listener.on_unregister(self, package);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn install(&mut self, package: &Package) -> Result<()> {
        if self.status(package.name())? == Status::Installed {
            bail!(PackageError::invalid_state(format!(
                "Package '{}' is already installed",
                package.name()
            )));
        }

        let installed = self.packages_by_status(Status::Installed)?;
        Solver::new(self.packages()?, &installed).check_install(package)?;

        self.run_installers(package, Action::Install)?;
        self.commit_transition(package, Action::Install, Status::Installed)?;

        info!("Installed {}", package.name());
        for listener in &self.listeners {
            listener.on_install(self, package);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    pub fn uninstall(&mut self, package: &Package) -> Result<()> {
        if self.status(package.name())? == Status::Uninstalled {
            bail!(PackageError::invalid_state(format!(
                "Package '{}' is already uninstalled",
                package.name()
            )));
        }

        let installed = self.packages_by_status(Status::Installed)?;
        Solver::new(self.packages()?, &installed).check_uninstall(package)?;

        self.run_installers(package, Action::Uninstall)?;
        self.commit_transition(package, Action::Uninstall, Status::Uninstalled)?;

        info!("Uninstalled {}", package.name());
        for listener in &self.listeners {
            listener.on_uninstall(self, package);
        }
        Ok(())
    }

    /// Apply every job of `problem` in order.
    pub fn apply(&mut self, problem: &Problem) -> Result<Report> {
        let mut report = Report::new();
        for job in problem {
            match job.action() {
                Action::Install => self.install(job.package())?,
                Action::Uninstall => self.uninstall(job.package())?,
            }
            report.push((job.name().to_string(), job.action().into()));
        }
        Ok(report)
    }

    /// Register every lock-file package the registry does not know yet.
    #[tracing::instrument(skip(self))]
    pub fn register_available(&mut self) -> Result<Report> {
        let names: Vec<String> = self
            .catalog()?
            .names()
            .filter(|name| !self.registry.contains(name))
            .map(String::from)
            .collect();

        let mut report = Report::new();
        for name in names {
            let package = self.create_instance(&name)?;
            self.register(&package)?;
            report.push((name, ManagerAction::Register));
        }
        Ok(report)
    }

    /// Install uninstalled packages, with their dependencies, until none are left.
    #[tracing::instrument(skip(self))]
    pub fn install_available(&mut self) -> Result<Report> {
        let mut report = Report::new();
        loop {
            let Some(package) = self
                .packages_by_status(Status::Uninstalled)?
                .into_values()
                .next()
            else {
                break;
            };

            let problem = self.test_install(&package)?;
            report.extend(self.apply(&problem)?);
        }
        Ok(report)
    }

    /// Uninstall and unregister every package that left the lock file.
    #[tracing::instrument(skip(self))]
    pub fn uninstall_absent(&mut self) -> Result<Report> {
        let available: BTreeSet<&str> = self.catalog()?.names().collect();
        let absent: Vec<String> = self
            .registry
            .names()
            .filter(|name| !available.contains(name))
            .map(String::from)
            .collect();

        let mut report = Report::new();
        for name in absent {
            let package = self.create_instance(&name)?;
            if self.status(&name)? == Status::Installed {
                self.uninstall(&package)?;
                report.push((name.clone(), ManagerAction::Uninstall));
            }
            self.unregister(&package)?;
            report.push((name, ManagerAction::Unregister));
        }
        Ok(report)
    }

    /// Bring the registry in line with the lock file.
    pub fn sync(&mut self) -> Result<Report> {
        let mut report = self.register_available()?;
        report.extend(self.install_available()?);
        report.extend(self.uninstall_absent()?);
        Ok(report)
    }

    fn run_installers(&self, package: &Package, action: Action) -> Result<()> {
        let installers = self.installers.resolve_all(package)?;
        if let Err(failure) = installer::apply(&installers, action, package) {
            return Err(PackageError::InvalidState {
                message: failure.cause.to_string(),
                source: Some(failure),
            }
            .into());
        }
        Ok(())
    }

    /// Apply `change` to a copy of the registry and save it. The registry in
    /// memory only takes the change once it is on disk.
    fn commit(&mut self, change: impl FnOnce(&mut Registry<'a, R>) -> Result<()>) -> Result<()> {
        let mut staged = self.registry.clone();
        change(&mut staged)?;
        staged.save()?;
        self.registry = staged;
        self.session.invalidate();
        Ok(())
    }

    /// Record the status reached by `action`. When the registry cannot be
    /// saved, the installers that just ran are undone so the package keeps
    /// its previous state.
    fn commit_transition(&mut self, package: &Package, action: Action, status: Status) -> Result<()> {
        let Err(cause) = self.commit(|registry| registry.set_status(package.name(), status)) else {
            return Ok(());
        };

        warn!(
            "Could not record {} of {}, rolling back: {:#}",
            action,
            package.name(),
            cause
        );
        let installers = self.installers.resolve_all(package)?;
        let compensation_errors = installer::revert(&installers, action, package);
        Err(PackageError::InvalidState {
            message: format!("{:#}", cause),
            source: Some(TransactionFailure {
                installer: REGISTRY_STEP.to_string(),
                cause,
                compensation_errors,
            }),
        }
        .into())
    }
}

fn snapshot_data(name: &str, entry: &RegistryEntry) -> Result<Value> {
    let mut data = serde_json::to_value(&entry.metadata)?;
    if let Value::Object(map) = &mut data {
        map.insert("name".into(), Value::String(name.to_string()));
        if let Some(version) = &entry.version {
            map.insert("version".into(), Value::String(version.clone()));
        }
    }
    Ok(data)
}

fn not_found(name: &str) -> anyhow::Error {
    PackageError::NotFound(format!("Package '{}' does not exist.", name)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::{MockInstaller, STRUCTURE_INSTALLER};
    use crate::runtime::RealRuntime;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new(packages: Value) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().canonicalize().unwrap();
            let fixture = Self {
                _dir: dir,
                config: Config::with_root(root),
            };
            fixture.write_lock(packages);
            fixture
        }

        fn write_lock(&self, packages: Value) {
            let content = json!({ "packages": packages }).to_string();
            RealRuntime
                .write(&self.config.lock_file, content.as_bytes())
                .unwrap();
        }

        fn manager<'a>(
            &self,
            runtime: &'a RealRuntime,
            installers: InstallerRegistry<'a>,
        ) -> PackageManager<'a, RealRuntime> {
            PackageManager::open(
                runtime,
                self.config.clone(),
                installers,
                GlobalMetadata::empty(),
            )
            .unwrap()
        }
    }

    fn passing_installer() -> Box<MockInstaller> {
        let mut installer = MockInstaller::new();
        installer.expect_install().returning(|_| Ok(()));
        installer.expect_uninstall().returning(|_| Ok(()));
        Box::new(installer)
    }

    fn passing_installers<'a>() -> InstallerRegistry<'a> {
        let mut installers = InstallerRegistry::new();
        installers.register(STRUCTURE_INSTALLER, passing_installer());
        installers
    }

    fn downcast(err: &anyhow::Error) -> &PackageError {
        err.downcast_ref::<PackageError>()
            .expect("expected a PackageError")
    }

    fn names(report: &Report) -> Vec<(&str, ManagerAction)> {
        report.iter().map(|(n, a)| (n.as_str(), *a)).collect()
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl<R: Runtime> PackageListener<R> for Recorder {
        fn on_install(&self, manager: &PackageManager<'_, R>, package: &Package) {
            assert_eq!(manager.status(package.name()).unwrap(), Status::Installed);
            self.0.borrow_mut().push(format!("install {}", package.name()));
        }

        fn on_uninstall(&self, manager: &PackageManager<'_, R>, package: &Package) {
            assert_eq!(manager.status(package.name()).unwrap(), Status::Uninstalled);
            self.0.borrow_mut().push(format!("uninstall {}", package.name()));
        }

        fn on_register(&self, _manager: &PackageManager<'_, R>, package: &Package) {
            self.0.borrow_mut().push(format!("register {}", package.name()));
        }

        fn on_unregister(&self, manager: &PackageManager<'_, R>, package: &Package) {
            assert!(manager.status(package.name()).is_err());
            self.0.borrow_mut().push(format!("unregister {}", package.name()));
        }
    }

    #[test]
    fn test_register_available() {
        let fixture = Fixture::new(json!([
            {"name": "acme/blog", "version": "1.2.0", "require": {"acme/core": "^1.0"}},
            {"name": "acme/core", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());

        let report = manager.register_available().unwrap();
        assert_eq!(
            names(&report),
            [
                ("acme/blog", ManagerAction::Register),
                ("acme/core", ManagerAction::Register)
            ]
        );
        assert_eq!(manager.status("acme/blog").unwrap(), Status::Uninstalled);

        let entry = manager.registry().get("acme/blog").unwrap();
        assert_eq!(entry.path, "%libsDir%/acme/blog");
        assert_eq!(entry.version.as_deref(), Some("1.2.0"));
        assert!(entry.metadata.require.contains_key("acme/core"));

        assert!(manager.register_available().unwrap().is_empty());
    }

    #[test]
    fn test_install_available_installs_dependencies_first() {
        let fixture = Fixture::new(json!([
            {"name": "acme/a", "version": "1.0.0", "require": {"acme/b": "*"}},
            {"name": "acme/b", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());
        manager.register_available().unwrap();

        let report = manager.install_available().unwrap();
        assert_eq!(
            names(&report),
            [
                ("acme/b", ManagerAction::Install),
                ("acme/a", ManagerAction::Install)
            ]
        );
        assert_eq!(manager.status("acme/a").unwrap(), Status::Installed);
        assert_eq!(manager.status("acme/b").unwrap(), Status::Installed);
    }

    #[test_log::test]
    fn test_failed_installer_is_compensated() {
        let fixture = Fixture::new(json!([
            {"name": "acme/blog", "version": "1.0.0", "extra": {"modman": {"installers": ["x", "y"]}}}
        ]));
        let runtime = RealRuntime;

        let mut x = MockInstaller::new();
        x.expect_install().times(1).returning(|_| Ok(()));
        x.expect_uninstall().times(1).returning(|_| Ok(()));
        let mut y = MockInstaller::new();
        y.expect_install()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("search index unavailable")));
        y.expect_uninstall().never();

        let mut installers = passing_installers();
        installers.register("x", Box::new(x));
        installers.register("y", Box::new(y));

        let mut manager = fixture.manager(&runtime, installers);
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/blog").unwrap();

        let err = manager.install(&package).unwrap_err();
        let error = downcast(&err);
        assert!(matches!(error, PackageError::InvalidState { .. }));
        assert_eq!(error.to_string(), "search index unavailable");

        let failure = error.transaction().unwrap();
        assert_eq!(failure.installer, "y");
        assert!(failure.is_clean());

        assert_eq!(manager.status("acme/blog").unwrap(), Status::Uninstalled);
    }

    #[test_log::test]
    fn test_failed_registry_save_rolls_back_install() {
        let fixture = Fixture::new(json!([{"name": "acme/blog", "version": "1.0.0"}]));
        let runtime = RealRuntime;
        let mut structure = MockInstaller::new();
        structure.expect_install().times(2).returning(|_| Ok(()));
        structure.expect_uninstall().times(1).returning(|_| Ok(()));
        let mut installers = InstallerRegistry::new();
        installers.register(STRUCTURE_INSTALLER, Box::new(structure));
        let mut manager = fixture.manager(&runtime, installers);
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/blog").unwrap();

        // A directory in place of the temporary file makes the next save fail.
        let blocker = manager.registry().path().with_extension("json.tmp");
        std::fs::create_dir_all(&blocker).unwrap();

        let err = manager.install(&package).unwrap_err();
        let failure = downcast(&err).transaction().unwrap();
        assert_eq!(failure.installer, "registry");
        assert!(failure.is_clean());
        assert!(err.to_string().contains("Failed to save registry"));

        assert_eq!(manager.status("acme/blog").unwrap(), Status::Uninstalled);
        let on_disk = Registry::load(&runtime, &fixture.config.packages_dir).unwrap();
        assert_eq!(on_disk.status("acme/blog").unwrap(), Status::Uninstalled);

        std::fs::remove_dir(&blocker).unwrap();
        manager.install(&package).unwrap();
        assert_eq!(manager.status("acme/blog").unwrap(), Status::Installed);
    }

    #[test]
    fn test_failed_registry_save_keeps_registration_unchanged() {
        let fixture = Fixture::new(json!([{"name": "acme/blog", "version": "1.0.0"}]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());

        let blocker = fixture
            .config
            .packages_dir
            .join(crate::registry::REGISTRY_FILE)
            .with_extension("json.tmp");
        std::fs::create_dir_all(&blocker).unwrap();

        assert!(manager.register_available().is_err());
        assert!(manager.registry().is_empty());
        assert!(!manager.registry().path().exists());
    }

    #[test]
    fn test_double_install_and_uninstall() {
        let fixture = Fixture::new(json!([{"name": "acme/blog", "version": "1.0.0"}]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/blog").unwrap();

        let err = manager.uninstall(&package).unwrap_err();
        assert_eq!(err.to_string(), "Package 'acme/blog' is already uninstalled");

        manager.install(&package).unwrap();
        let before = manager.registry().entries().clone();

        let err = manager.install(&package).unwrap_err();
        assert!(matches!(downcast(&err), PackageError::InvalidState { .. }));
        assert_eq!(err.to_string(), "Package 'acme/blog' is already installed");
        assert_eq!(manager.registry().entries(), &before);
    }

    #[test]
    fn test_install_with_missing_dependency_conflicts() {
        let fixture = Fixture::new(json!([
            {"name": "acme/a", "version": "1.0.0", "require": {"acme/b": "*"}},
            {"name": "acme/b", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, InstallerRegistry::new());
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/a").unwrap();

        let err = manager.install(&package).unwrap_err();
        assert!(matches!(downcast(&err), PackageError::DependencyConflict(_)));
        assert_eq!(manager.status("acme/a").unwrap(), Status::Uninstalled);
    }

    #[test]
    fn test_uninstall_blocked_by_dependent() {
        let fixture = Fixture::new(json!([
            {"name": "acme/a", "version": "1.0.0", "require": {"acme/b": "*"}},
            {"name": "acme/b", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());
        manager.register_available().unwrap();
        manager.install_available().unwrap();

        let b = manager.create_instance("acme/b").unwrap();
        let err = manager.uninstall(&b).unwrap_err();
        assert!(matches!(downcast(&err), PackageError::DependencyConflict(_)));

        let problem = manager.test_uninstall(&b).unwrap();
        let plan: Vec<_> = problem.solutions().iter().map(|j| j.name()).collect();
        assert_eq!(plan, ["acme/a", "acme/b"]);

        let report = manager.apply(&problem).unwrap();
        assert_eq!(
            names(&report),
            [
                ("acme/a", ManagerAction::Uninstall),
                ("acme/b", ManagerAction::Uninstall)
            ]
        );
    }

    #[test]
    fn test_preview_does_not_mutate_registry() {
        let fixture = Fixture::new(json!([
            {"name": "acme/a", "version": "1.0.0", "require": {"acme/b": "*"}},
            {"name": "acme/b", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;
        let mut manager = fixture.manager(&runtime, passing_installers());
        manager.register_available().unwrap();

        let saved = runtime.read_to_string(manager.registry().path()).unwrap();
        let a = manager.create_instance("acme/a").unwrap();
        let problem = manager.test_install(&a).unwrap();
        assert_eq!(problem.len(), 2);

        assert_eq!(manager.status("acme/b").unwrap(), Status::Uninstalled);
        assert_eq!(
            runtime.read_to_string(manager.registry().path()).unwrap(),
            saved
        );
        assert!(manager.packages_by_status(Status::Installed).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_leaves_no_entry() {
        let fixture = Fixture::new(json!([{"name": "acme/blog", "version": "1.0.0"}]));
        let runtime = RealRuntime;
        let recorder = Recorder::default();
        let mut manager = fixture.manager(&runtime, passing_installers());
        manager.add_listener(Box::new(recorder.clone()));

        assert!(manager.registry().is_empty());
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/blog").unwrap();
        manager.install(&package).unwrap();
        manager.uninstall(&package).unwrap();
        manager.unregister(&package).unwrap();

        assert!(manager.registry().is_empty());
        assert!(manager.packages().unwrap().is_empty());
        assert_eq!(
            *recorder.0.borrow(),
            [
                "register acme/blog",
                "install acme/blog",
                "uninstall acme/blog",
                "unregister acme/blog"
            ]
        );
    }

    #[test]
    fn test_uninstall_absent_uses_registry_snapshot() {
        let fixture = Fixture::new(json!([
            {"name": "acme/blog", "version": "2.0.0", "extra": {"modman": {"installers": ["x"]}}},
            {"name": "acme/core", "version": "1.0.0"}
        ]));
        let runtime = RealRuntime;

        let mut x = MockInstaller::new();
        x.expect_install().times(1).returning(|_| Ok(()));
        let mut installers = passing_installers();
        installers.register("x", Box::new(x));
        fixture.manager(&runtime, installers).sync().unwrap();

        fixture.write_lock(json!([{"name": "acme/core", "version": "1.0.0"}]));

        let mut x = MockInstaller::new();
        x.expect_uninstall().times(1).returning(|package| {
            assert!(package.is_virtual());
            assert_eq!(package.version(), Some("2.0.0"));
            Ok(())
        });
        let mut installers = passing_installers();
        installers.register("x", Box::new(x));
        let mut manager = fixture.manager(&runtime, installers);

        assert_eq!(manager.version("acme/blog").unwrap().as_deref(), Some("2.0.0"));
        let report = manager.uninstall_absent().unwrap();
        assert_eq!(
            names(&report),
            [
                ("acme/blog", ManagerAction::Uninstall),
                ("acme/blog", ManagerAction::Unregister)
            ]
        );
        assert!(!manager.registry().contains("acme/blog"));
        assert_eq!(manager.status("acme/core").unwrap(), Status::Installed);
    }

    #[test]
    fn test_create_instance_prefers_manifest() {
        let fixture = Fixture::new(json!([{"name": "acme/blog", "version": "1.0.0"}]));
        let runtime = RealRuntime;
        let dir = fixture.config.libs_dir.join("acme/blog");
        runtime.create_dir_all(&dir).unwrap();
        runtime
            .write(
                &dir.join("module.json"),
                br#"{"name": "acme/blog", "description": "Blog module", "require": {"php": ">=8.1"}}"#,
            )
            .unwrap();

        let manager = fixture.manager(&runtime, InstallerRegistry::new());
        let package = manager.create_instance("acme/blog").unwrap();
        assert!(!package.is_virtual());
        assert_eq!(package.description(), Some("Blog module"));
        assert!(package.requires().is_empty());
        assert_eq!(package.path(), dir.as_path());
    }

    #[test]
    fn test_create_instance_merges_global_metadata() {
        let fixture = Fixture::new(json!([
            {"name": "acme/blog", "version": "1.1.0", "extra": {"modman": {"installers": ["x"]}}}
        ]));
        let runtime = RealRuntime;
        let metadata = GlobalMetadata::from_sources(&[(
            "meta.json".to_string(),
            json!({"acme/blog": [
                {"versions": ">=2.0", "metadata": {"installers": ["legacy"]}},
                {"versions": ["1.0.0", "1.1.0"], "metadata": {
                    "installers": ["y"],
                    "configuration": {"blog": {"perPage": 10}}
                }}
            ]})
            .to_string(),
        )])
        .unwrap();

        let manager =
            PackageManager::open(&runtime, fixture.config.clone(), InstallerRegistry::new(), metadata)
                .unwrap();
        let package = manager.create_instance("acme/blog").unwrap();

        assert!(package.is_virtual());
        assert_eq!(package.installers(), ["structure", "x"]);
        assert_eq!(package.configuration(), &json!({"blog": {"perPage": 10}}));
    }

    #[test]
    fn test_unknown_package() {
        let fixture = Fixture::new(json!([]));
        let runtime = RealRuntime;
        let manager = fixture.manager(&runtime, InstallerRegistry::new());

        let err = manager.create_instance("acme/ghost").unwrap_err();
        assert!(matches!(downcast(&err), PackageError::NotFound(_)));
        assert_eq!(err.to_string(), "Package 'acme/ghost' does not exist.");
        assert!(manager.status("acme/ghost").is_err());
        assert!(manager.version("acme/ghost").is_err());
    }

    #[test]
    fn test_unregistered_installer_fails_before_side_effects() {
        let fixture = Fixture::new(json!([
            {"name": "acme/blog", "version": "1.0.0", "extra": {"modman": {"installers": ["ghost"]}}}
        ]));
        let runtime = RealRuntime;
        let mut structure = MockInstaller::new();
        structure.expect_install().never();
        let mut installers = InstallerRegistry::new();
        installers.register(STRUCTURE_INSTALLER, Box::new(structure));

        let mut manager = fixture.manager(&runtime, installers);
        manager.register_available().unwrap();
        let package = manager.create_instance("acme/blog").unwrap();

        let err = manager.install(&package).unwrap_err();
        assert!(matches!(downcast(&err), PackageError::NotFound(_)));
        assert_eq!(manager.status("acme/blog").unwrap(), Status::Uninstalled);
    }

    #[test]
    fn test_missing_lock_file() {
        let fixture = Fixture::new(json!([]));
        let runtime = RealRuntime;
        std::fs::remove_file(&fixture.config.lock_file).unwrap();
        let mut manager = fixture.manager(&runtime, InstallerRegistry::new());

        let err = manager.sync().unwrap_err();
        assert!(matches!(downcast(&err), PackageError::NotFound(_)));
        assert_eq!(manager.libs_dir(), fixture.config.root.join("vendor"));
    }
}
