//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the handler for a method + path
//! - Return the handler or an explicit no-match
//!
//! # Design Decisions
//! - Registration takes `&mut self`; once the router is shared with the accept
//!   loop it is immutable (thread-safe without locks)
//! - O(n) ordered scan (route tables on the device are tiny)
//! - Tie-break: the earliest registered matching route wins, so a literal route
//!   registered ahead of an overlapping wildcard always takes precedence

use thiserror::Error;

use crate::routing::matcher::RoutePattern;

/// Error type for route registration.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug)]
struct Route<H> {
    pattern: RoutePattern,
    handler: H,
}

/// Ordered table of endpoint routes.
#[derive(Debug)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for a `"{METHOD} {PATH}"` pattern.
    pub fn register(&mut self, pattern: &str, handler: H) -> Result<(), RouteError> {
        let compiled = RoutePattern::compile(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        tracing::debug!(pattern = %pattern, position = self.routes.len(), "Route registered");
        self.routes.push(Route {
            pattern: compiled,
            handler,
        });
        Ok(())
    }

    /// Find the first registered handler whose pattern matches `"{method} {path}"`.
    pub fn dispatch(&self, method: &str, path: &str) -> Option<&H> {
        let key = format!("{} {}", method, path);
        self.dispatch_key(&key)
    }

    /// Match an already joined dispatch key.
    pub fn dispatch_key(&self, key: &str) -> Option<&H> {
        self.routes
            .iter()
            .find(|route| route.pattern.matches(key))
            .map(|route| &route.handler)
    }

    /// Registered patterns, in dispatch order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.pattern.template())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(patterns: &[(&str, u32)]) -> Router<u32> {
        let mut router = Router::new();
        for (pattern, id) in patterns {
            router.register(pattern, *id).unwrap();
        }
        router
    }

    #[test]
    fn dispatch_returns_matching_handler() {
        let router = router(&[("GET /", 1), ("GET /files", 2), ("POST /upload", 3)]);

        assert_eq!(router.dispatch("GET", "/"), Some(&1));
        assert_eq!(router.dispatch("GET", "/files"), Some(&2));
        assert_eq!(router.dispatch("POST", "/upload"), Some(&3));
        assert_eq!(router.dispatch("GET", "/upload"), None);
        assert_eq!(router.dispatch("GET", "/missing"), None);
    }

    #[test]
    fn first_registered_wins_on_overlap() {
        let literal_first = router(&[("GET /run?file=main.py", 1), ("GET /run?file=*.py", 2)]);
        assert_eq!(literal_first.dispatch("GET", "/run?file=main.py"), Some(&1));
        assert_eq!(literal_first.dispatch("GET", "/run?file=other.py"), Some(&2));

        let wildcard_first = router(&[("GET /run?file=*.py", 2), ("GET /run?file=main.py", 1)]);
        assert_eq!(wildcard_first.dispatch("GET", "/run?file=main.py"), Some(&2));
    }

    #[test]
    fn empty_router_matches_nothing() {
        let router: Router<u32> = Router::default();
        assert!(router.is_empty());
        assert_eq!(router.dispatch("GET", "/"), None);
    }

    #[test]
    fn patterns_listed_in_registration_order() {
        let router = router(&[("GET /b", 1), ("GET /a", 2)]);
        assert_eq!(router.patterns().collect::<Vec<_>>(), vec!["GET /b", "GET /a"]);
        assert_eq!(router.len(), 2);
    }
}
