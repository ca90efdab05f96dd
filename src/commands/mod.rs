//! CLI commands. Each command works on an opened [`PackageManager`] and
//! writes its report to `out`.

use anyhow::Result;
use log::debug;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::installer::InstallerRegistry;
use crate::manager::{PackageManager, Report};
use crate::package::GlobalMetadata;
use crate::runtime::Runtime;
use crate::source::{default_client, load_metadata};

mod install;
mod list;
mod sync;

pub use install::{install, uninstall};
pub use list::list;
pub use sync::sync;

/// Print one `action : name` line per reported action.
fn print_report(report: &Report, out: &mut impl Write) -> Result<()> {
    for (name, action) in report {
        writeln!(out, "{} : {}", action, name)?;
    }
    Ok(())
}

/// Everything needed to open the package manager of a project.
pub struct Project {
    pub config: Config,
    pub metadata: GlobalMetadata,
}

impl Project {
    /// Resolve the configuration and fetch the global metadata sources.
    #[tracing::instrument(skip(runtime))]
    pub async fn load<R: Runtime>(
        runtime: &R,
        root: Option<PathBuf>,
        metadata_sources: Vec<String>,
    ) -> Result<Self> {
        let config = Config::load(runtime, root, metadata_sources)?;
        let metadata = if config.metadata_sources.is_empty() {
            GlobalMetadata::empty()
        } else {
            load_metadata(runtime, &default_client()?, &config.metadata_sources).await?
        };
        Ok(Self { config, metadata })
    }

    /// Open the package manager with the default installers registered.
    pub fn open<'a, R: Runtime + 'a>(self, runtime: &'a R) -> Result<PackageManager<'a, R>> {
        debug!("Opening project {:?}", self.config.root);
        let installers = InstallerRegistry::with_structure(
            runtime,
            self.config.resources_dir.clone(),
            self.config.config_dir.clone(),
        );
        PackageManager::open(runtime, self.config, installers, self.metadata)
    }
}
