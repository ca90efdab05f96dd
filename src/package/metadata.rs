//! Global metadata overrides.
//!
//! Metadata sources are JSON documents mapping a package name to a list of
//! overrides, each selecting package versions:
//!
//! ```json
//! {
//!   "acme/blog": [
//!     {"versions": ">=1.0, <2.0", "metadata": {"installers": ["assets"]}},
//!     {"versions": ["0.9.0", "0.9.1"], "metadata": {"configuration": {}}}
//!   ]
//! }
//! ```
//!
//! The `metadata` block has the shape of a manifest's `extra.modman` block and
//! is used for packages that ship without a manifest.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::constraint::Constraint;

use super::tree::merge_tree;

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionSelector {
    Constraint(String),
    List(Vec<String>),
}

impl VersionSelector {
    fn into_constraint(self) -> Result<Constraint> {
        match self {
            VersionSelector::Constraint(input) => Constraint::parse(&input),
            VersionSelector::List(versions) => Ok(Constraint::any_of(
                versions.into_iter().map(Constraint::exact).collect(),
            )),
        }
    }
}

#[derive(Deserialize)]
struct RawOverride {
    versions: VersionSelector,
    #[serde(default)]
    metadata: Value,
}

#[derive(Debug, Clone)]
pub struct MetadataOverride {
    pub versions: Constraint,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalMetadata {
    packages: BTreeMap<String, Vec<MetadataOverride>>,
}

impl GlobalMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(source, content)` pairs. Earlier sources win where they
    /// overlap.
    #[tracing::instrument(skip(sources))]
    pub fn from_sources(sources: &[(String, String)]) -> Result<Self> {
        let mut merged = Value::Object(serde_json::Map::new());
        for (source, content) in sources {
            if content.trim().is_empty() {
                bail!("Source '{}' is empty.", source);
            }
            let document: Value = serde_json::from_str(content)
                .with_context(|| format!("Failed to parse metadata source '{}'", source))?;
            if !document.is_object() {
                bail!("Metadata source '{}' must be a JSON object.", source);
            }
            merge_tree(&mut merged, &document);
        }

        Self::from_value(merged)
    }

    fn from_value(value: Value) -> Result<Self> {
        let raw: BTreeMap<String, Vec<RawOverride>> =
            serde_json::from_value(value).context("Invalid metadata source document")?;

        let mut packages = BTreeMap::new();
        for (name, overrides) in raw {
            let mut parsed = Vec::with_capacity(overrides.len());
            for raw in overrides {
                let versions = raw
                    .versions
                    .into_constraint()
                    .with_context(|| format!("Invalid version selector for '{}'", name))?;
                parsed.push(MetadataOverride {
                    versions,
                    metadata: raw.metadata,
                });
            }
            packages.insert(name, parsed);
        }

        Ok(Self { packages })
    }

    /// Metadata patch for `name` at `version`: the first override whose
    /// selector accepts the version.
    pub fn lookup(&self, name: &str, version: &str) -> Option<&Value> {
        let provided = Constraint::exact(version);
        self.packages
            .get(name)?
            .iter()
            .find(|o| o.versions.matches(&provided))
            .map(|o| &o.metadata)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
