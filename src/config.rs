use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, normalize_path};
use crate::source::is_remote;

/// Optional project settings file, relative to the project root.
pub const SETTINGS_FILE: &str = "modman.json";

/// Overrides read from [`SETTINGS_FILE`]. Relative paths resolve against the
/// project root.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Settings {
    libs_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    resources_dir: Option<PathBuf>,
    packages_dir: Option<PathBuf>,
    lock_file: Option<PathBuf>,
    manifest_files: Option<Vec<String>>,
    #[serde(default)]
    metadata_sources: Vec<String>,
}

/// Project layout and package manager settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    /// Where packages live, one directory per `vendor/name`.
    pub libs_dir: PathBuf,
    /// Holds the application configuration the structure installer edits.
    pub config_dir: PathBuf,
    /// Public resources of installed packages get published here.
    pub resources_dir: PathBuf,
    /// Holds the package registry.
    pub packages_dir: PathBuf,
    /// Lock file listing the available packages.
    pub lock_file: PathBuf,
    /// Manifest file names probed inside a package directory, in order.
    pub manifest_files: Vec<String>,
    /// Global metadata sources (paths or http(s) URLs), earlier ones win.
    pub metadata_sources: Vec<String>,
}

impl Config {
    /// Default layout under `root`.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            libs_dir: root.join("vendor"),
            config_dir: root.join("app/config"),
            resources_dir: root.join("www/resources"),
            packages_dir: root.join(".modman"),
            lock_file: root.join("modules.lock"),
            manifest_files: vec!["module.json".to_string()],
            metadata_sources: Vec::new(),
            root,
        }
    }

    /// Resolve the configuration for `root` (default: the current directory),
    /// applying the settings file if present. `extra_sources` are appended to
    /// the metadata sources of the settings file.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(
        runtime: &R,
        root: Option<PathBuf>,
        extra_sources: Vec<String>,
    ) -> Result<Self> {
        let cwd = runtime.current_dir()?;
        let root = match root {
            Some(root) => resolve(runtime, &cwd, &root),
            None => cwd.clone(),
        };
        debug!("Project root: {:?}", root);

        let mut config = Self::with_root(root.clone());

        let settings_path = root.join(SETTINGS_FILE);
        let settings = if runtime.exists(&settings_path) {
            let content = runtime.read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse settings {:?}", settings_path))?
        } else {
            Settings::default()
        };

        let apply = |target: &mut PathBuf, value: Option<PathBuf>| {
            if let Some(value) = value {
                *target = resolve(runtime, &root, &value);
            }
        };
        apply(&mut config.libs_dir, settings.libs_dir);
        apply(&mut config.config_dir, settings.config_dir);
        apply(&mut config.resources_dir, settings.resources_dir);
        apply(&mut config.packages_dir, settings.packages_dir);
        apply(&mut config.lock_file, settings.lock_file);
        if let Some(files) = settings.manifest_files {
            config.manifest_files = files;
        }

        config.metadata_sources = settings
            .metadata_sources
            .into_iter()
            .chain(extra_sources)
            .map(|source| resolve_source(runtime, &root, &source))
            .collect();

        Ok(config)
    }
}

/// Expand a leading `~` and make `path` absolute against `base`.
fn resolve<R: Runtime>(runtime: &R, base: &Path, path: &Path) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), runtime.home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };

    if expanded.is_absolute() {
        normalize_path(&expanded)
    } else {
        normalize_path(&base.join(expanded))
    }
}

fn resolve_source<R: Runtime>(runtime: &R, root: &Path, source: &str) -> String {
    if is_remote(source) {
        return source.to_string();
    }
    resolve(runtime, root, Path::new(source))
        .to_string_lossy()
        .into_owned()
}
