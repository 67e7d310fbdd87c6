//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber (accept loop) sees the broadcast → stop accepting
//!
//! Signals (signals.rs):
//!     Ctrl+C → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Shutdown stops the accept loop only; an active run ends with the process
//! - One broadcast channel, any number of subscribers

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_on_ctrl_c;
