//! Shared configuration library for Quire.
//!
//! This crate centralizes config loading (file, inline JSON, `.env` and
//! environment overrides), the per-collection catalog-service settings, and
//! the guard rails that turn suspicious settings into warnings or errors.
//! Both `quirectl` and embedding services go through [`ConfigLoader`] so
//! there is a single source of truth for defaults.

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigSource, error::ConfigLoadError};
pub use models::{
    CatalogInstanceConfig, CatalogsConfig, Config, EngineConfig, MonitorConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
