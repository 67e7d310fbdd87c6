//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request line ("GET /run?file=a.py HTTP/1.1")
//!     → dispatch key "{METHOD} {PATH}"
//!     → router.rs (ordered route scan)
//!     → matcher.rs (anchored wildcard pattern)
//!     → Return: matched handler or None (caller answers 404)
//!
//! Route Compilation (at startup):
//!     "GET /run?file=*.py"
//!     → escape regex metacharacters
//!     → escaped `*` becomes `.*`
//!     → anchor with ^…$
//!     → Freeze inside an immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes registered before serving, immutable at runtime
//! - Method is part of the pattern and matched case-sensitively
//! - Deterministic: first registered match wins

pub mod matcher;
pub mod router;

pub use matcher::RoutePattern;
pub use router::{RouteError, Router};
