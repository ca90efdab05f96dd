use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::installer::STRUCTURE_INSTALLER;
use crate::runtime::Runtime;

use super::manifest::{Extra, Manifest, ModuleExtra};

/// Public resources directory probed when a manifest does not name one.
pub const DEFAULT_PUBLIC_PATH: &str = "/Resources/public";

/// Where a descriptor's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read from the manifest file inside the package directory.
    Live,
    /// Rebuilt from lock-file data or the registry snapshot, because the
    /// package directory holds no manifest.
    Virtual,
}

/// Read-only view of a package, built on demand by the package manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    manifest: Manifest,
    path: PathBuf,
    relative_public_path: Option<String>,
    origin: Origin,
}

impl Package {
    pub fn live<R: Runtime>(runtime: &R, manifest: Manifest, path: PathBuf) -> Self {
        Self::new(runtime, manifest, path, Origin::Live)
    }

    pub fn new_virtual<R: Runtime>(runtime: &R, manifest: Manifest, path: PathBuf) -> Self {
        Self::new(runtime, manifest, path, Origin::Virtual)
    }

    fn new<R: Runtime>(runtime: &R, manifest: Manifest, path: PathBuf, origin: Origin) -> Self {
        let relative_public_path = manifest
            .extra
            .module
            .relative_public_path
            .clone()
            .or_else(|| {
                runtime
                    .is_dir(&join_relative(&path, DEFAULT_PUBLIC_PATH))
                    .then(|| DEFAULT_PUBLIC_PATH.to_string())
            });

        Self {
            manifest,
            path,
            relative_public_path,
            origin,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }

    pub fn keywords(&self) -> &[String] {
        self.manifest.keywords.as_deref().unwrap_or_default()
    }

    pub fn requires(&self) -> Vec<&str> {
        self.manifest.dependencies().collect()
    }

    pub fn requires_package(&self, name: &str) -> bool {
        self.manifest.dependencies().any(|dep| dep == name)
    }

    /// Configuration patch merged into the application config on install.
    pub fn configuration(&self) -> &Value {
        &self.manifest.extra.module.configuration
    }

    /// Installer identifiers in application order; the structure installer
    /// always comes first.
    pub fn installers(&self) -> Vec<&str> {
        std::iter::once(STRUCTURE_INSTALLER)
            .chain(
                self.manifest
                    .extra
                    .module
                    .installers
                    .iter()
                    .map(String::as_str)
                    .filter(|id| *id != STRUCTURE_INSTALLER),
            )
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative_public_path(&self) -> Option<&str> {
        self.relative_public_path.as_deref()
    }

    /// Absolute directory of the package's public resources, if it has any.
    pub fn public_path(&self) -> Option<PathBuf> {
        self.relative_public_path
            .as_deref()
            .map(|relative| join_relative(&self.path, relative))
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_virtual(&self) -> bool {
        self.origin == Origin::Virtual
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Metadata frozen into the registry at registration time, enough to
    /// rebuild a virtual descriptor once the package directory is gone.
    pub fn snapshot(&self) -> Manifest {
        Manifest {
            name: String::new(),
            version: None,
            description: self.manifest.description.clone(),
            keywords: self.manifest.keywords.clone(),
            license: self.manifest.license.clone(),
            authors: self.manifest.authors.clone(),
            require: self.manifest.require.clone(),
            extra: Extra {
                module: ModuleExtra {
                    configuration: self.configuration().clone(),
                    installers: self
                        .installers()
                        .into_iter()
                        .filter(|id| *id != STRUCTURE_INSTALLER)
                        .map(String::from)
                        .collect(),
                    relative_public_path: self.relative_public_path.clone(),
                },
                other: Default::default(),
            },
        }
    }

    /// Minimal descriptor for unit tests.
    #[cfg(test)]
    pub(crate) fn stub(name: &str, requires: &[&str]) -> Self {
        Self {
            manifest: Manifest {
                name: name.to_string(),
                version: Some("1.0.0".to_string()),
                require: requires
                    .iter()
                    .map(|dep| (dep.to_string(), "*".to_string()))
                    .collect(),
                ..Default::default()
            },
            path: PathBuf::from("/app/vendor").join(name),
            relative_public_path: None,
            origin: Origin::Virtual,
        }
    }
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    base.join(relative.trim_start_matches(['/', '\\']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(value).unwrap()
    }

    #[test]
    fn test_installers_start_with_structure() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);

        let package = Package::live(
            &runtime,
            manifest(json!({
                "name": "acme/blog",
                "extra": {"modman": {"installers": ["assets", "structure", "search"]}}
            })),
            PathBuf::from("/app/vendor/acme/blog"),
        );

        assert_eq!(package.installers(), ["structure", "assets", "search"]);
        assert_eq!(package.origin(), Origin::Live);
    }

    #[test]
    fn test_default_public_path_when_directory_exists() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_dir()
            .with(eq(PathBuf::from("/app/vendor/acme/blog/Resources/public")))
            .returning(|_| true);

        let package = Package::new_virtual(
            &runtime,
            manifest(json!({"name": "acme/blog"})),
            PathBuf::from("/app/vendor/acme/blog"),
        );

        assert_eq!(package.relative_public_path(), Some("/Resources/public"));
        assert_eq!(
            package.public_path(),
            Some(PathBuf::from("/app/vendor/acme/blog/Resources/public"))
        );
        assert!(package.is_virtual());
    }

    #[test]
    fn test_no_public_path() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);

        let package = Package::new_virtual(
            &runtime,
            manifest(json!({"name": "acme/blog"})),
            PathBuf::from("/app/vendor/acme/blog"),
        );
        assert_eq!(package.public_path(), None);
    }

    #[test]
    fn test_explicit_public_path_skips_probe() {
        // No expectation on is_dir: probing would panic the mock.
        let runtime = MockRuntime::new();
        let package = Package::live(
            &runtime,
            manifest(json!({
                "name": "acme/blog",
                "extra": {"modman": {"relativePublicPath": "/www"}}
            })),
            PathBuf::from("/app/vendor/acme/blog"),
        );
        assert_eq!(
            package.public_path(),
            Some(PathBuf::from("/app/vendor/acme/blog/www"))
        );
    }

    #[test]
    fn test_snapshot_freezes_metadata() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| true);

        let package = Package::live(
            &runtime,
            manifest(json!({
                "name": "acme/blog",
                "version": "1.0.0",
                "description": "Blog",
                "require": {"acme/core": "*", "php": ">=5.3"},
                "extra": {"modman": {
                    "configuration": {"extensions": {"blog": "Blog"}},
                    "installers": ["assets"]
                }}
            })),
            PathBuf::from("/app/vendor/acme/blog"),
        );

        let snapshot = serde_json::to_value(package.snapshot()).unwrap();
        assert_eq!(
            snapshot,
            json!({
                "description": "Blog",
                "keywords": null,
                "license": null,
                "authors": null,
                "require": {"acme/core": "*", "php": ">=5.3"},
                "extra": {"modman": {
                    "configuration": {"extensions": {"blog": "Blog"}},
                    "installers": ["assets"],
                    "relativePublicPath": "/Resources/public"
                }}
            })
        );
    }

    #[test]
    fn test_requires() {
        let package = Package::stub("acme/blog", &["acme/core", "acme/users"]);
        assert_eq!(package.requires(), ["acme/core", "acme/users"]);
        assert!(package.requires_package("acme/core"));
        assert!(!package.requires_package("acme/shop"));
    }
}
