//! # Tiercache Config
//!
//! Configuration management for Tiercache.
//! Supports layered configuration from files and environment variables,
//! loaded once at process startup, and the per-namespace TTL policy table.

mod app_config;
mod loader;
mod policy;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use policy::*;
pub use validation::*;
