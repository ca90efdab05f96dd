//! Installer capabilities.
//!
//! An [`Installer`] performs the side effects of installing or uninstalling a
//! package. Packages name the installers they need by identifier; the
//! [`InstallerRegistry`] maps identifiers to instances and is filled once at
//! startup.

mod structure;
mod transaction;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::error::PackageError;
use crate::package::Package;
use crate::runtime::Runtime;

pub use structure::StructureInstaller;
pub use transaction::{apply, revert};

/// Identifier of the installer every package runs first.
pub const STRUCTURE_INSTALLER: &str = "structure";

/// Side effects of a package lifecycle transition.
///
/// Failure is reported by returning an error; an installer that fails must
/// leave behind nothing it created during that call.
#[cfg_attr(test, mockall::automock)]
pub trait Installer {
    fn install(&self, package: &Package) -> Result<()>;
    fn uninstall(&self, package: &Package) -> Result<()>;
}

/// Registry mapping installer identifiers to installer instances.
#[derive(Default)]
pub struct InstallerRegistry<'a> {
    installers: HashMap<String, Box<dyn Installer + 'a>>,
}

impl<'a> InstallerRegistry<'a> {
    pub fn new() -> Self {
        Self {
            installers: HashMap::new(),
        }
    }

    /// Registry holding the default [`StructureInstaller`].
    pub fn with_structure<R: Runtime + 'a>(
        runtime: &'a R,
        resources_dir: PathBuf,
        config_dir: PathBuf,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            STRUCTURE_INSTALLER,
            Box::new(StructureInstaller::new(runtime, resources_dir, config_dir)),
        );
        registry
    }

    /// Register an installer under `id`, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, installer: Box<dyn Installer + 'a>) {
        self.installers.insert(id.into(), installer);
    }

    pub fn get(&self, id: &str) -> Option<&(dyn Installer + 'a)> {
        self.installers.get(id).map(|installer| installer.as_ref())
    }

    pub fn has(&self, id: &str) -> bool {
        self.installers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.installers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }

    /// Look up every installer `package` needs, in order.
    ///
    /// Fails with [`PackageError::NotFound`] on the first unknown identifier,
    /// before anything has been run.
    pub fn resolve_all<'r>(
        &'r self,
        package: &Package,
    ) -> Result<Vec<(&'r str, &'r (dyn Installer + 'a))>> {
        package
            .installers()
            .into_iter()
            .map(|id| {
                self.installers
                    .get_key_value(id)
                    .map(|(key, installer)| (key.as_str(), installer.as_ref()))
                    .ok_or_else(|| {
                        PackageError::NotFound(format!(
                            "Installer '{}' required by package '{}' is not registered.",
                            id,
                            package.name()
                        ))
                        .into()
                    })
            })
            .collect()
    }
}
