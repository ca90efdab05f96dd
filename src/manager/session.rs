use anyhow::Result;
use std::cell::OnceCell;
use std::collections::BTreeMap;

use crate::package::{Catalog, Package};

/// Views memoized for one package manager, dropped together by
/// [`Session::invalidate`] after every committed registry change.
#[derive(Debug, Default)]
pub struct Session {
    catalog: OnceCell<Catalog>,
    packages: OnceCell<BTreeMap<String, Package>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self, load: impl FnOnce() -> Result<Catalog>) -> Result<&Catalog> {
        get_or_load(&self.catalog, load)
    }

    /// Descriptors of every registered package, by name.
    pub fn packages(
        &self,
        load: impl FnOnce() -> Result<BTreeMap<String, Package>>,
    ) -> Result<&BTreeMap<String, Package>> {
        get_or_load(&self.packages, load)
    }

    pub fn invalidate(&mut self) {
        self.catalog.take();
        self.packages.take();
    }
}

fn get_or_load<T>(cell: &OnceCell<T>, load: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = load()?;
    Ok(cell.get_or_init(|| value))
}
