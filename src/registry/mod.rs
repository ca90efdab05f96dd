//! Durable package registry.
//!
//! The registry is the only persistent state of the package manager: a JSON
//! document `<packages_dir>/packages.json` mapping each registered package to
//! its status, library path, version and a frozen metadata snapshot.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PackageError;
use crate::package::Manifest;
use crate::runtime::Runtime;

pub const REGISTRY_FILE: &str = "packages.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Installed,
    Uninstalled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Installed => "installed",
            Status::Uninstalled => "uninstalled",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Status::Installed => "Installed",
            Status::Uninstalled => "Uninstalled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Status::Installed),
            "uninstalled" => Ok(Status::Uninstalled),
            _ => Err(PackageError::NotFound(format!("Status '{}' does not exist.", s))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub status: Status,
    /// Package path with the library root replaced by `%libsDir%`.
    pub path: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Manifest,
}

pub struct Registry<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    entries: BTreeMap<String, RegistryEntry>,
}

impl<R: Runtime> Clone for Registry<'_, R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime,
            path: self.path.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<'a, R: Runtime> Registry<'a, R> {
    /// Load the registry kept in `packages_dir`. A missing file is an empty
    /// registry; it is created on the first save.
    #[tracing::instrument(skip(runtime))]
    pub fn load(runtime: &'a R, packages_dir: &Path) -> Result<Self> {
        let path = packages_dir.join(REGISTRY_FILE);
        let entries = if runtime.exists(&path) {
            let content = runtime.read_to_string(&path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse registry {:?}", path))?
        } else {
            debug!("Registry {:?} does not exist yet", path);
            BTreeMap::new()
        };

        Ok(Self {
            runtime,
            path,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, RegistryEntry> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Status of `name`; [`PackageError::NotFound`] if it is not registered.
    pub fn status(&self, name: &str) -> Result<Status> {
        self.entries
            .get(name)
            .map(|entry| entry.status)
            .ok_or_else(|| not_registered(name))
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: RegistryEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn set_status(&mut self, name: &str, status: Status) -> Result<()> {
        let entry = self.entries.get_mut(name).ok_or_else(|| not_registered(name))?;
        entry.status = status;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<RegistryEntry> {
        self.entries.remove(name)
    }

    /// Write the registry to disk, replacing the previous file atomically.
    #[tracing::instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        self.runtime
            .write(&tmp_path, content.as_bytes())
            .with_context(|| format!("Failed to save registry to {:?}", tmp_path))?;
        self.runtime
            .rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace registry {:?}", self.path))
    }
}

fn not_registered(name: &str) -> anyhow::Error {
    PackageError::NotFound(format!("Package '{}' does not exist.", name)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    fn entry(status: Status) -> RegistryEntry {
        RegistryEntry {
            status,
            path: "%libsDir%/acme/blog".into(),
            version: Some("1.0.0".into()),
            metadata: Manifest::default(),
        }
    }

    #[test]
    fn test_load_missing_registry_is_empty() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/app/.modman/packages.json")))
            .returning(|_| false);

        let registry = Registry::load(&runtime, Path::new("/app/.modman")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_status_lookup() {
        let runtime = MockRuntime::new();
        let mut registry = Registry {
            runtime: &runtime,
            path: PathBuf::from("/app/.modman/packages.json"),
            entries: BTreeMap::new(),
        };
        registry.insert("acme/blog", entry(Status::Uninstalled));

        assert_eq!(registry.status("acme/blog").unwrap(), Status::Uninstalled);
        registry.set_status("acme/blog", Status::Installed).unwrap();
        assert_eq!(registry.status("acme/blog").unwrap(), Status::Installed);

        let err = registry.status("acme/ghost").unwrap_err();
        assert_eq!(err.to_string(), "Package 'acme/ghost' does not exist.");
        assert!(registry.set_status("acme/ghost", Status::Installed).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let packages_dir = dir.path().join(".modman");

        let mut registry = Registry::load(&runtime, &packages_dir).unwrap();
        registry.insert("acme/blog", entry(Status::Installed));
        registry.insert("acme/core", entry(Status::Uninstalled));
        registry.save().unwrap();

        assert!(!runtime.exists(&packages_dir.join("packages.json.tmp")));
        let reloaded = Registry::load(&runtime, &packages_dir).unwrap();
        assert_eq!(reloaded.names().collect::<Vec<_>>(), ["acme/blog", "acme/core"]);
        assert_eq!(reloaded.get("acme/blog"), Some(&entry(Status::Installed)));
    }

    #[test]
    fn test_persisted_format() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let mut registry = Registry::load(&runtime, dir.path()).unwrap();
        registry.insert("acme/blog", entry(Status::Installed));
        registry.save().unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&runtime.read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(saved["acme/blog"]["status"], "installed");
        assert_eq!(saved["acme/blog"]["path"], "%libsDir%/acme/blog");
        assert_eq!(saved["acme/blog"]["version"], "1.0.0");
    }

    #[test]
    fn test_remove() {
        let runtime = MockRuntime::new();
        let mut registry = Registry {
            runtime: &runtime,
            path: PathBuf::from("/app/.modman/packages.json"),
            entries: BTreeMap::new(),
        };
        registry.insert("acme/blog", entry(Status::Installed));
        assert!(registry.remove("acme/blog").is_some());
        assert!(registry.remove("acme/blog").is_none());
        assert!(!registry.contains("acme/blog"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("installed".parse::<Status>().unwrap(), Status::Installed);
        assert!("broken".parse::<Status>().is_err());
        assert_eq!(Status::Uninstalled.label(), "Uninstalled");
    }
}
