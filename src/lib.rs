//! Minimal HTTP control plane for a script-running device.
//!
//! Endpoints list, upload and remove files, run a stored script while
//! streaming its output to the client as Server-Sent Events, and stop it.

pub mod bootloader;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod runner;
pub mod storage;
pub mod stream;

pub use bootloader::Bootloader;
pub use config::BootloaderConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
