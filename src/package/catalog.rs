use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::PackageError;
use crate::runtime::Runtime;

#[derive(Deserialize)]
struct LockFile {
    #[serde(default)]
    packages: Vec<Value>,
}

/// Packages available to the application, as listed by the lock file
/// (`{"packages": [{"name": ..., "version": ...}, ...]}`).
///
/// Entries are kept as raw JSON: they become descriptors only after being
/// merged with global metadata.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Value>,
}

impl Catalog {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            return Err(PackageError::NotFound(format!(
                "Lock file {:?} does not exist.",
                path
            ))
            .into());
        }
        let content = runtime.read_to_string(path)?;
        Self::parse(&content).with_context(|| format!("Failed to parse lock file {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let lock: LockFile = serde_json::from_str(content)?;

        let mut entries = BTreeMap::new();
        for entry in lock.packages {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .context("Lock file entry without a name")?
                .to_string();
            entries.insert(name, entry);
        }

        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .and_then(|entry| entry.get("version"))
            .and_then(Value::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    const LOCK: &str = r#"{
        "packages": [
            {"name": "acme/shop", "version": "2.0.0", "require": {"acme/core": "*"}},
            {"name": "acme/core", "version": "1.0.0"}
        ]
    }"#;

    #[test]
    fn test_parse_lock_file() {
        let catalog = Catalog::parse(LOCK).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["acme/core", "acme/shop"]);
        assert_eq!(catalog.version("acme/shop"), Some("2.0.0"));
        assert_eq!(catalog.version("acme/missing"), None);
        assert!(catalog.contains("acme/core"));
    }

    #[test]
    fn test_parse_rejects_nameless_entry() {
        let err = Catalog::parse(r#"{"packages": [{"version": "1.0"}]}"#).unwrap_err();
        assert!(err.to_string().contains("without a name"));
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(Catalog::parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_lock_file() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/app/modules.lock");
        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| false);

        let err = Catalog::load(&runtime, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_lock_file() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/app/modules.lock");
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(path.clone()))
            .returning(|_| Ok(LOCK.to_string()));

        let catalog = Catalog::load(&runtime, &path).unwrap();
        assert_eq!(catalog.get("acme/core").unwrap()["version"], "1.0.0");
    }
}
