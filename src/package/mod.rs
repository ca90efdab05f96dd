//! Package model
//!
//! Descriptors, the manifest format they are read from, the lock-file catalog
//! of available packages, global metadata overrides for packages without a
//! manifest, and the JSON tree helpers used to merge all of these.

mod catalog;
mod descriptor;
mod manifest;
mod metadata;
pub mod tree;

pub use catalog::Catalog;
pub use descriptor::{DEFAULT_PUBLIC_PATH, Origin, Package};
pub use manifest::{EXTRA_KEY, Extra, Manifest, ModuleExtra};
pub use metadata::{GlobalMetadata, MetadataOverride};
