use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::package::Package;
use crate::package::tree::{merge_recursive, recursive_diff};
use crate::runtime::{Runtime, relative_symlink_path};

use super::Installer;

/// Application configuration file, relative to the config directory.
pub const CONFIG_FILE: &str = "config.json";

enum Undo {
    RemoveResources(PathBuf),
    RestoreConfig(Value),
}

/// Default installer: publishes a package's public resources and merges its
/// configuration into the application configuration.
///
/// Resources are linked into `<resources_dir>/<package name>` with a relative
/// symlink, or copied where symlinks are unavailable.
pub struct StructureInstaller<'a, R: Runtime> {
    runtime: &'a R,
    resources_dir: PathBuf,
    config_dir: PathBuf,
}

impl<'a, R: Runtime> StructureInstaller<'a, R> {
    pub fn new(runtime: &'a R, resources_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            runtime,
            resources_dir,
            config_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Where the public resources of `package` get published.
    pub fn resources_link(&self, package: &Package) -> PathBuf {
        self.resources_dir.join(package.name())
    }

    pub fn load_config(&self) -> Result<Value> {
        let path = self.config_path();
        if !self.runtime.exists(&path) {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        let content = self.runtime.read_to_string(&path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {:?}", path))
    }

    pub fn save_config(&self, config: &Value) -> Result<()> {
        if !self.runtime.exists(&self.config_dir) {
            self.runtime.create_dir_all(&self.config_dir)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        self.runtime
            .write(&self.config_path(), content.as_bytes())
            .with_context(|| format!("Failed to save configuration to {:?}", self.config_path()))
    }

    fn install_steps(&self, package: &Package, undo: &mut Vec<Undo>) -> Result<()> {
        if let Some(public) = package.public_path() {
            let link = self.resources_link(package);
            if !self.runtime.is_dir(&link) && self.runtime.is_dir(&public) {
                let target = self.runtime.canonicalize(&public)?;
                self.publish(&target, &link)?;
                undo.push(Undo::RemoveResources(link));
            }
        }

        let configuration = package.configuration();
        if !is_empty(configuration) {
            let original = self.load_config()?;
            let mut merged = original.clone();
            merge_recursive(&mut merged, configuration);
            self.save_config(&merged)?;
            undo.push(Undo::RestoreConfig(original));
        }

        Ok(())
    }

    fn publish(&self, target: &Path, link: &Path) -> Result<()> {
        let parent = link
            .parent()
            .with_context(|| format!("Invalid resources path {:?}", link))?;
        if !self.runtime.exists(parent) {
            self.runtime.create_dir_all(parent)?;
        }

        // Relative to the real parent, so the link survives symlinked roots
        let resolved_link = match link.file_name() {
            Some(file_name) => self.runtime.canonicalize(parent)?.join(file_name),
            None => link.to_path_buf(),
        };
        let relative =
            relative_symlink_path(&resolved_link, target).unwrap_or_else(|| target.to_path_buf());
        match self.runtime.symlink(&relative, link) {
            Ok(()) => {
                debug!("Linked {:?} -> {:?}", link, relative);
                Ok(())
            }
            Err(e) => {
                debug!("Symlink {:?} failed ({}), copying instead", link, e);
                self.copy_dir(target, link)
                    .with_context(|| format!("Failed to publish resources to {:?}", link))
            }
        }
    }

    fn copy_dir(&self, from: &Path, to: &Path) -> Result<()> {
        self.runtime.create_dir_all(to)?;
        for entry in self.runtime.read_dir(from)? {
            let Some(file_name) = entry.file_name() else {
                continue;
            };
            let destination = to.join(file_name);
            if self.runtime.is_dir(&entry) {
                self.copy_dir(&entry, &destination)?;
            } else {
                self.runtime.copy(&entry, &destination)?;
            }
        }
        Ok(())
    }

    fn remove_resources(&self, link: &Path) -> Result<()> {
        if self.runtime.is_symlink(link) {
            self.runtime.remove_symlink(link)
        } else if self.runtime.is_dir(link) {
            self.runtime.remove_dir_all(link)
        } else {
            Ok(())
        }
    }

    fn undo(&self, step: Undo) -> Result<()> {
        match step {
            Undo::RemoveResources(link) => self.remove_resources(&link),
            Undo::RestoreConfig(original) => self.save_config(&original),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl<R: Runtime> Installer for StructureInstaller<'_, R> {
    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    fn install(&self, package: &Package) -> Result<()> {
        let mut undo = Vec::new();
        if let Err(e) = self.install_steps(package, &mut undo) {
            for step in undo.into_iter().rev() {
                if let Err(undo_err) = self.undo(step) {
                    warn!("Failed to undo partial install of {}: {}", package.name(), undo_err);
                }
            }
            return Err(e);
        }

        info!("Installed structure of {}", package.name());
        Ok(())
    }

    #[tracing::instrument(skip(self, package), fields(name = package.name()))]
    fn uninstall(&self, package: &Package) -> Result<()> {
        let configuration = package.configuration();
        if !is_empty(configuration) {
            let mut config = recursive_diff(&self.load_config()?, configuration);

            if let (Some(extensions), Some(map)) = (
                configuration.get("extensions").and_then(Value::as_object),
                config.as_object_mut(),
            ) {
                for key in extensions.keys() {
                    map.remove(key);
                }
            }

            self.save_config(&config)?;
        }

        self.remove_resources(&self.resources_link(package))?;

        info!("Uninstalled structure of {}", package.name());
        Ok(())
    }
}
