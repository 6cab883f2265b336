//! WebSocket surface: upgrade handlers, the per-connection loop, and the
//! connection limit.

pub mod connection;
pub mod handler;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};

/// Counts live WebSocket connections against a fixed ceiling.
#[derive(Debug)]
pub struct ConnectionLimiter {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    /// Allow at most `max` concurrent connections.
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max,
        })
    }

    /// Reserve a slot, or `None` when the ceiling is reached.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        let reserved = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return None;
        }
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        Some(ConnectionPermit {
            limiter: Arc::clone(self),
        })
    }

    /// Connections currently holding a permit.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// One reserved connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let _ = self.limiter.active.fetch_sub(1, Ordering::AcqRel);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_respect_ceiling() {
        let limiter = ConnectionLimiter::new(2);
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.active(), 2);

        drop(a);
        assert_eq!(limiter.active(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn zero_ceiling_refuses_everything() {
        let limiter = ConnectionLimiter::new(0);
        assert!(limiter.try_acquire().is_none());
    }
}
