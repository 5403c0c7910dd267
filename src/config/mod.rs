//! Configuration management
//!
//! Node settings resolved from defaults, an optional TOML file and
//! environment variables.

pub mod settings;

pub use settings::{Config, DEFAULT_NODE_ADDR};
