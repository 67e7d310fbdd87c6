//! Connection identity for log correlation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, shown as `conn-<n>` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection being served. Counted in `open` until dropped.
#[derive(Debug)]
pub struct ActiveConnection {
    id: ConnectionId,
    open: Arc<AtomicUsize>,
}

impl ActiveConnection {
    pub fn open(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            id: ConnectionId::next(),
            open: Arc::clone(open),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
