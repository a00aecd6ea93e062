//! Installed product lookup

use log::info;

/// Platform package database
pub trait ProductRegistry: Send + Sync {
    /// Version of the product installed under `upgrade_code`, if any
    fn installed_version(&self, upgrade_code: &str) -> Option<String>;
}

/// Snapshot of the installed product, keyed by upgrade code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledProduct {
    pub upgrade_code: String,
    pub version: Option<String>,
}

impl InstalledProduct {
    /// Resolve the product through `registry`
    pub fn resolve(registry: &dyn ProductRegistry, upgrade_code: &str) -> Self {
        let version = registry.installed_version(upgrade_code);
        match &version {
            Some(v) => info!("Installed version for {}: {}", upgrade_code, v),
            None => info!("No product installed for {}", upgrade_code),
        }
        Self {
            upgrade_code: upgrade_code.to_string(),
            version,
        }
    }

    /// Reuse `cached` unless the upgrade code changed
    pub fn refresh(cached: Option<Self>, registry: &dyn ProductRegistry, upgrade_code: &str) -> Self {
        match cached {
            Some(product) if product.upgrade_code.eq_ignore_ascii_case(upgrade_code) => product,
            _ => Self::resolve(registry, upgrade_code),
        }
    }
}
