//! # ldaptest-core
//!
//! Core types for verifying credentials against an LDAP directory service.
//!
//! This crate provides the error taxonomy, the validated directory configuration and the
//! process-wide configuration store shared by the checker and its callers.
//!
//! ## Modules
//!
//! - [`error`] - Error types and error codes
//! - [`config`] - Directory endpoint configuration and JSON decoding
//! - [`dn`] - Distinguished name parsing and bind DN templates
//! - [`store`] - Snapshot store for the loaded configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dn;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use config::{DirectoryConfig, DEFAULT_LDAPS_PORT, DEFAULT_LDAP_PORT, DEFAULT_TIMEOUT_MS};
pub use dn::{BindDnTemplate, DistinguishedName, DistinguishedNameError, TEMPLATE_MARKER};
pub use error::{Error, Result};
pub use store::ConfigStore;
