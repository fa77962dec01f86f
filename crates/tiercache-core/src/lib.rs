//! # Tiercache Core
//!
//! Core types, traits, and error definitions for Tiercache.
//! This crate provides the key model shared by both cache tiers:
//! namespaces, validated cache keys, and restricted-glob invalidation
//! patterns, plus the unified error type used across the workspace.

pub mod error;
pub mod key;
pub mod namespace;
pub mod pattern;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use key::*;
pub use namespace::*;
pub use pattern::*;
pub use result::*;
