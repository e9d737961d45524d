//! Core module - shared infrastructure for Conclave
//!
//! This module contains foundational types, configuration, logging setup and
//! error handling used throughout the crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::{ConclaveError, Result};
pub use types::*;
