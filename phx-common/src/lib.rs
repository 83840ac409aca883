//! # phenix common library
//!
//! Shared code for the phenix cluster file tools:
//! - Error types
//! - Bootstrap configuration loading
//! - Host name helpers used to recognise the headnode

pub mod config;
pub mod error;
pub mod host;

pub use config::TomlConfig;
pub use error::{Error, Result};
