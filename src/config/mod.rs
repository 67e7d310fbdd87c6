//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → BootloaderConfig (validated, immutable)
//!     → handed by value/reference to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes and the runner are built from it once
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BootloaderConfig, HttpConfig, ListenerConfig, NetworkConfig, NetworkMode,
    ObservabilityConfig, RunnerConfig, StorageConfig, StreamConfig,
};
