//! Flash-message mailbox.
//!
//! A per-user single-slot store that carries one human-readable status
//! string from a POST handler to the next GET render. Writers overwrite
//! unconditionally (last-write-wins); the reader consumes-and-deletes.
//! Slots expire after a short TTL and are swept by the periodic cleanup
//! task.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

/// One queued status message.
#[derive(Debug, Clone)]
struct FlashSlot {
    message: String,
    expires_at: i64,
}

/// Per-user flash message slots.
#[derive(Clone)]
pub struct Mailbox {
    slots: Arc<DashMap<String, FlashSlot>>,
    ttl_secs: i64,
}

impl Mailbox {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl_secs,
        }
    }

    /// Store a message for a user, replacing any existing one.
    pub fn set(&self, user_id: &str, message: impl Into<String>) {
        self.slots.insert(
            user_id.to_string(),
            FlashSlot {
                message: message.into(),
                expires_at: Utc::now().timestamp() + self.ttl_secs,
            },
        );
    }

    /// Take the user's message, removing it from the slot.
    ///
    /// An expired message that the sweeper hasn't collected yet is
    /// treated as absent.
    pub fn take(&self, user_id: &str) -> Option<String> {
        let (_, slot) = self.slots.remove(user_id)?;
        if slot.expires_at < Utc::now().timestamp() {
            return None;
        }
        Some(slot.message)
    }

    /// Remove expired slots. Called by the periodic cleanup task.
    pub fn cleanup_expired(&self) {
        let now = Utc::now().timestamp();
        let expired: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.expires_at < now)
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired.len();
        for user_id in expired {
            self.slots.remove(&user_id);
        }

        if count > 0 {
            tracing::debug!(count, "Cleaned up expired flash messages");
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_take_consumes() {
        let mailbox = Mailbox::new(5);

        mailbox.set("user-1", "Display name changed.");
        assert_eq!(
            mailbox.take("user-1").as_deref(),
            Some("Display name changed.")
        );

        // Consumed: a second read sees nothing.
        assert!(mailbox.take("user-1").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mailbox = Mailbox::new(5);

        mailbox.set("user-1", "first");
        mailbox.set("user-1", "second");

        assert_eq!(mailbox.take("user-1").as_deref(), Some("second"));
    }

    #[test]
    fn test_slots_are_per_user() {
        let mailbox = Mailbox::new(5);

        mailbox.set("user-1", "for one");
        mailbox.set("user-2", "for two");

        assert_eq!(mailbox.take("user-2").as_deref(), Some("for two"));
        assert_eq!(mailbox.take("user-1").as_deref(), Some("for one"));
    }

    #[test]
    fn test_expired_message_is_absent() {
        let mailbox = Mailbox::new(-1); // Already expired on write.

        mailbox.set("user-1", "too late");
        assert!(mailbox.take("user-1").is_none());
    }

    #[test]
    fn test_cleanup_sweeps_expired_slots() {
        let mailbox = Mailbox::new(-1);
        mailbox.set("user-1", "stale");
        mailbox.set("user-2", "stale");
        assert_eq!(mailbox.len(), 2);

        mailbox.cleanup_expired();
        assert_eq!(mailbox.len(), 0);
    }
}
