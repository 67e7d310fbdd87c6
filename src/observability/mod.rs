//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (connection_id, run_id, script)
//!
//! logging.rs:
//!     → stdout (fmt layer)
//!     → optional rotating log file (fmt layer, no ANSI)
//! ```

pub mod logging;

pub use logging::{init, LoggingError, RotatingFile};
