//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     connectivity.rs (join WiFi / open hotspot, bounded by a timeout)
//!
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → connection.rs (connection ID, open-connection count)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded concurrent connections prevent resource exhaustion on the device
//! - Link-layer bring-up sits behind a trait; the host build needs no radio

pub mod connection;
pub mod connectivity;
pub mod listener;

pub use connection::{ActiveConnection, ConnectionId};
pub use connectivity::{bring_up, Connectivity, ConnectivityError, HostConnectivity};
pub use listener::{Listener, ListenerError};
