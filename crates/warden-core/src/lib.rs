//! `Warden` Core Library
//!
//! Shared functionality for `Warden` components:
//! - Scope normalization and intersection
//! - Resource owner identities
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and timestamps
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod scope;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use identity::Identity;
pub use scope::ScopeSet;
