//! Configuration management
//!
//! Listener address, startup peers, key and data locations and the mining
//! switch, read from an optional TOML file and the environment.

pub mod settings;

pub use settings::Config;
