//! Live output subsystem.
//!
//! # Data Flow
//! ```text
//! script worker thread
//!     → channel.rs (OutputSink::print → bounded FIFO)
//!     → channel.rs (OutputReceiver, polled by the event loop)
//!     → sse.rs (trim, "\n" → "<br>", "data: …\n\n")
//!     → StreamWriter → client
//!
//! End of run:
//!     OutputSink dropped → OutputEvent::End (always last, exactly once)
//!     → drain loop sends the closing 200 and closes the connection
//! ```
//!
//! # Design Decisions
//! - The channel is the only state shared between the worker and the event loop
//! - The sentinel is a dedicated enum variant, never a magic string
//! - A vanished client ends the drain loop quietly; the run continues unobserved

pub mod channel;
pub mod sse;

pub use channel::{channel, OutputEvent, OutputReceiver, OutputSink};
pub use sse::{drain, frame, open_event_stream, DrainOutcome};
