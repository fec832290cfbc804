//! Connection lifecycle tracking.
//!
//! Every connection the pool opens carries a [`ConnectionMetadata`] record
//! for its whole life. Borrowers can read it through
//! [`PooledConnection::metadata`](crate::PooledConnection::metadata).

use std::time::{Duration, Instant};

/// Connection state tracked by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is idle and available for use.
    Idle,
    /// Connection is checked out by a borrower.
    InUse,
    /// Connection reported a fault and will be destroyed on release.
    Broken,
}

impl ConnectionState {
    /// Check if the connection is available for checkout.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the connection should be removed from the pool.
    #[must_use]
    pub fn should_remove(&self) -> bool {
        matches!(self, Self::Broken)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection within its pool.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
    /// Current state of the connection.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
            state: ConnectionState::Idle,
        }
    }

    /// Time since the connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
        self.state = ConnectionState::InUse;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
        self.state = ConnectionState::Idle;
    }

    /// Mark the connection as faulted.
    pub fn mark_broken(&mut self) {
        self.state = ConnectionState::Broken;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Idle.is_available());
        assert!(!ConnectionState::InUse.is_available());
        assert!(ConnectionState::Broken.should_remove());
        assert!(!ConnectionState::InUse.should_remove());
    }

    #[test]
    fn test_connection_metadata_new() {
        let meta = ConnectionMetadata::new(1);
        assert_eq!(meta.id, 1);
        assert_eq!(meta.checkout_count, 0);
        assert_eq!(meta.state, ConnectionState::Idle);
    }

    #[test]
    fn test_connection_metadata_cycle() {
        let mut meta = ConnectionMetadata::new(1);
        meta.mark_checkout();
        assert_eq!(meta.checkout_count, 1);
        assert_eq!(meta.state, ConnectionState::InUse);

        meta.mark_checkin();
        assert_eq!(meta.state, ConnectionState::Idle);

        meta.mark_checkout();
        meta.mark_broken();
        assert_eq!(meta.checkout_count, 2);
        assert!(meta.state.should_remove());
    }
}
