//! Per-user credential store.
//!
//! A sparse key-value store: each user carries up to three independently
//! addressable fields (OAuth token blob, display name, approval flag).
//! A field that was never written is `None`, which is distinct from an
//! empty value — callers treat absence as "not yet set" (unapproved by
//! default, no display name yet). Missing users never raise errors.
//!
//! Uses DashMap for concurrent access. Persists to a JSON file on disk
//! when `data_dir` is configured.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// The sparse field set stored for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Opaque OAuth authorization material. Required for building an
    /// authenticated client; never interpreted by the bridge itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_blob: Option<String>,

    /// Contributor display name, denormalized into notes at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Gates public visibility of the user's ingested notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
}

/// On-disk persistence format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCredentials {
    users: HashMap<String, CredentialRecord>,
}

/// Store for per-user credentials.
#[derive(Clone)]
pub struct CredentialStore {
    /// User id → credential record.
    by_user: Arc<DashMap<String, CredentialRecord>>,

    /// Directory for persistence. None = in-memory only.
    data_dir: Option<PathBuf>,
}

impl CredentialStore {
    /// Create a new credential store.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            by_user: Arc::new(DashMap::new()),
            data_dir,
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn data_file_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("credentials.json"))
    }

    /// Load credentials from disk.
    ///
    /// Called once at startup. If the file doesn't exist or is corrupt,
    /// logs a warning and starts with an empty store.
    pub fn load_from_disk(&self) -> usize {
        let path = match self.data_file_path() {
            Some(p) => p,
            None => return 0,
        };

        if !path.exists() {
            tracing::info!(path = %path.display(), "No existing credentials file, starting fresh");
            return 0;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PersistedCredentials>(&contents) {
                Ok(data) => {
                    let count = data.users.len();
                    for (user_id, record) in data.users {
                        self.by_user.insert(user_id, record);
                    }
                    tracing::info!(users = count, path = %path.display(), "Credentials loaded from disk");
                    count
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Failed to parse credentials file, starting fresh");
                    0
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read credentials file, starting fresh");
                0
            }
        }
    }

    /// Persist current state to disk.
    ///
    /// Atomic write (temp file, then rename) to prevent corruption.
    fn persist_to_disk(&self) {
        let path = match self.data_file_path() {
            Some(p) => p,
            None => return,
        };

        let users: HashMap<String, CredentialRecord> = self
            .by_user
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let json = match serde_json::to_string_pretty(&PersistedCredentials { users }) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize credentials");
                return;
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %e, path = %parent.display(), "Failed to create data directory");
                return;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        match std::fs::write(&tmp_path, &json) {
            Ok(()) => {
                if let Err(e) = std::fs::rename(&tmp_path, &path) {
                    tracing::error!(error = %e, "Failed to rename temp file to credentials.json");
                    let _ = std::fs::remove_file(&tmp_path);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write credentials temp file");
            }
        }
    }

    // ── Field Access ──────────────────────────────────────────────────────────

    /// Get a user's stored token blob.
    pub fn get_token(&self, user_id: &str) -> Option<String> {
        self.by_user.get(user_id).and_then(|r| r.token_blob.clone())
    }

    /// Store a user's token blob.
    pub fn put_token(&self, user_id: &str, token_blob: impl Into<String>) {
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .token_blob = Some(token_blob.into());
        self.persist_to_disk();
    }

    /// Get a user's display name.
    pub fn get_display_name(&self, user_id: &str) -> Option<String> {
        self.by_user
            .get(user_id)
            .and_then(|r| r.display_name.clone())
    }

    /// Store a user's display name.
    pub fn put_display_name(&self, user_id: &str, display_name: impl Into<String>) {
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .display_name = Some(display_name.into());
        self.persist_to_disk();
    }

    /// Get a user's approval flag. `None` means never set.
    pub fn get_approved(&self, user_id: &str) -> Option<bool> {
        self.by_user.get(user_id).and_then(|r| r.approved)
    }

    /// Store a user's approval flag.
    pub fn put_approved(&self, user_id: &str, approved: bool) {
        self.by_user.entry(user_id.to_string()).or_default().approved = Some(approved);
        self.persist_to_disk();
    }

    // ── Enumeration ───────────────────────────────────────────────────────────

    /// Ids of all registered users.
    pub fn user_ids(&self) -> Vec<String> {
        self.by_user.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}
