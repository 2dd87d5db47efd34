//! Configuration model for tollgate.
//!
//! This module defines the Config struct that represents `<store>/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;


pub use model::Config;
