//! Courier Common - Shared types and utilities
//!
//! This crate provides the configuration, error taxonomy and value types
//! shared by every Courier component.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
