//! Server state management.
//!
//! One shared `AppState` is handed to every route handler: the credential
//! and note stores, the flash mailbox, the per-user client factory and the
//! batch executor. All stores are concurrent (DashMap) for lock-free
//! access; the state itself is cheap to clone.

use std::path::PathBuf;

use crate::broadcast;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::mirror::{HttpBatchExecutor, ServiceFactory};
use crate::notes::NoteStore;
use crate::protocol::TimelineItem;

/// Default broadcast ceiling, sized to the external call quota.
pub const DEFAULT_BROADCAST_QUOTA: usize = 10;

/// Default flash message TTL in seconds.
pub const DEFAULT_FLASH_TTL_SECS: i64 = 5;

/// Default cleanup interval in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    /// Base URL of the external mirror service.
    pub mirror_base_url: String,
    /// This bridge's own public base URL (subscription callbacks, media
    /// URL resolution).
    pub public_base_url: String,
    /// Hard ceiling on broadcast recipients.
    pub broadcast_quota: usize,
    pub flash_ttl_secs: i64,
    pub cleanup_interval_secs: u64,
    /// Directory for store persistence. None = in-memory only.
    pub data_dir: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            mirror_base_url: "http://localhost:9000".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            broadcast_quota: DEFAULT_BROADCAST_QUOTA,
            flash_ttl_secs: DEFAULT_FLASH_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            data_dir: None,
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Per-user credentials (token blob, display name, approval).
    pub credentials: CredentialStore,

    /// Ingested notes.
    pub notes: NoteStore,

    /// Per-user flash message slots.
    pub mailbox: Mailbox,

    /// Builds per-user authenticated mirror clients.
    pub services: ServiceFactory,

    /// Batched-call primitive for broadcasts.
    pub batch: HttpBatchExecutor,

    /// Server configuration.
    pub config: BridgeConfig,

    http: reqwest::Client,
}

impl AppState {
    /// Create a new state from configuration.
    pub fn new(config: BridgeConfig) -> Self {
        let http = reqwest::Client::new();
        let data_dir = config.data_dir.as_ref().map(PathBuf::from);

        Self {
            credentials: CredentialStore::new(data_dir.clone()),
            notes: NoteStore::new(data_dir),
            mailbox: Mailbox::new(config.flash_ttl_secs),
            services: ServiceFactory::new(http.clone(), config.mirror_base_url.clone()),
            batch: HttpBatchExecutor::new(http.clone(), config.mirror_base_url.clone()),
            http,
            config,
        }
    }

    /// Load persisted stores. Called once at startup.
    pub fn load_from_disk(&self) {
        let users = self.credentials.load_from_disk();
        let notes = self.notes.load_from_disk();
        if users > 0 || notes > 0 {
            tracing::info!(users, notes, "State restored from disk");
        }
    }

    /// Shared HTTP client for unauthenticated fetches (media downloads).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Broadcast one card to every registered user through the configured
    /// batch executor.
    pub async fn broadcast(&self, item: TimelineItem) -> Result<String> {
        broadcast::broadcast_to_all(
            &self.credentials,
            &self.services,
            &self.batch,
            self.config.broadcast_quota,
            item,
        )
        .await
    }

    /// Remove expired ephemeral data. Called by the periodic cleanup task.
    pub fn cleanup_expired(&self) {
        self.mailbox.cleanup_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            broadcast_quota: 3,
            flash_ttl_secs: -1,
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_state_starts_empty() {
        let state = AppState::new(test_config());
        assert_eq!(state.credentials.user_count(), 0);
        assert_eq!(state.notes.note_count(), 0);
        assert_eq!(state.mailbox.len(), 0);
    }

    #[test]
    fn test_cleanup_sweeps_mailbox() {
        let state = AppState::new(test_config());
        state.mailbox.set("user-1", "stale");
        assert_eq!(state.mailbox.len(), 1);

        state.cleanup_expired();
        assert_eq!(state.mailbox.len(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_respects_configured_quota() {
        let state = AppState::new(test_config());
        for i in 0..4 {
            state
                .credentials
                .put_token(&format!("user-{}", i), format!("blob-{}", i));
        }

        // 4 users against a quota of 3: refused before any network call.
        let summary = state
            .broadcast(TimelineItem::text("Hello Everyone!"))
            .await
            .unwrap();
        assert_eq!(
            summary,
            "Total user count is 4. Aborting broadcast to save your quota"
        );
    }
}
