use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::runtime::Runtime;

/// Key of the vendor extension block inside `extra`.
pub const EXTRA_KEY: &str = "modman";

/// Module manifest (`module.json`), also the shape of lock-file entries and of
/// the metadata snapshot frozen into the registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_keywords")]
    pub keywords: Option<Vec<String>>,
    /// A single SPDX id or a list of them.
    #[serde(default)]
    pub license: Option<Value>,
    #[serde(default)]
    pub authors: Option<Value>,
    #[serde(default)]
    pub require: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Extra {
    #[serde(default, rename = "modman")]
    pub module: ModuleExtra,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleExtra {
    #[serde(default = "empty_object", skip_serializing_if = "is_empty_tree")]
    pub configuration: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_public_path: Option<String>,
}

impl Default for ModuleExtra {
    fn default() -> Self {
        Self {
            configuration: empty_object(),
            installers: Vec::new(),
            relative_public_path: None,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn is_empty_tree(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn deserialize_keywords<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Keywords {
        List(Vec<String>),
        Csv(String),
    }

    Ok(
        Option::<Keywords>::deserialize(deserializer)?.map(|k| match k {
            Keywords::List(list) => list,
            Keywords::Csv(csv) => csv.split(',').map(|s| s.trim().to_string()).collect(),
        }),
    )
}

impl Manifest {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {:?}", path))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Invalid package metadata")
    }

    /// Package names this manifest depends on.
    ///
    /// Only `vendor/name` style keys are packages; platform requirements such
    /// as `php` or `ext-json` are ignored.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.require
            .keys()
            .filter(|name| name.contains('/'))
            .map(String::as_str)
    }
}
