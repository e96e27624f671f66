//! Note entity store.
//!
//! Notes are ingested from timeline reply notifications. A note is written
//! exactly once and never updated: `creator_name` and `public` are
//! snapshots of the author's credential fields at creation time, so a
//! later approval change must not alter existing notes.
//!
//! Same store shape as the credential store: DashMap, optional JSON file
//! persistence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contributed note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub text: String,
    /// Author's user id.
    pub user_id: String,
    /// Author display name at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    /// Snapshot of the author's approval flag at creation time.
    pub public: bool,
    pub date: DateTime<Utc>,
}

/// On-disk persistence format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedNotes {
    notes: HashMap<String, Note>,
}

/// Store for notes.
#[derive(Clone)]
pub struct NoteStore {
    /// Note id → note.
    by_id: Arc<DashMap<String, Note>>,

    /// Directory for persistence. None = in-memory only.
    data_dir: Option<PathBuf>,
}

impl NoteStore {
    /// Create a new note store.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            by_id: Arc::new(DashMap::new()),
            data_dir,
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn data_file_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("notes.json"))
    }

    /// Load notes from disk. Called once at startup.
    pub fn load_from_disk(&self) -> usize {
        let path = match self.data_file_path() {
            Some(p) => p,
            None => return 0,
        };

        if !path.exists() {
            tracing::info!(path = %path.display(), "No existing notes file, starting fresh");
            return 0;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PersistedNotes>(&contents) {
                Ok(data) => {
                    let count = data.notes.len();
                    for (id, note) in data.notes {
                        self.by_id.insert(id, note);
                    }
                    tracing::info!(notes = count, path = %path.display(), "Notes loaded from disk");
                    count
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Failed to parse notes file, starting fresh");
                    0
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read notes file, starting fresh");
                0
            }
        }
    }

    fn persist_to_disk(&self) {
        let path = match self.data_file_path() {
            Some(p) => p,
            None => return,
        };

        let notes: HashMap<String, Note> = self
            .by_id
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let json = match serde_json::to_string_pretty(&PersistedNotes { notes }) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notes");
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
                    tracing::error!(error = %e, "Failed to rename temp file to notes.json");
                    let _ = std::fs::remove_file(&tmp_path);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write notes temp file");
            }
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Insert a new note. Returns the stored note.
    pub fn insert(
        &self,
        text: impl Into<String>,
        user_id: impl Into<String>,
        creator_name: Option<String>,
        public: bool,
    ) -> Note {
        let note = Note {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            user_id: user_id.into(),
            creator_name,
            public,
            date: Utc::now(),
        };
        self.by_id.insert(note.id.clone(), note.clone());
        self.persist_to_disk();
        note
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    /// All public notes, newest first.
    pub fn public_notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .by_id
            .iter()
            .filter(|r| r.public)
            .map(|r| r.value().clone())
            .collect();
        notes.sort_by(|a, b| b.date.cmp(&a.date));
        notes
    }

    /// All notes by one author, newest first, regardless of visibility.
    pub fn notes_for_user(&self, user_id: &str) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .by_id
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        notes.sort_by(|a, b| b.date.cmp(&a.date));
        notes
    }

    /// Total number of stored notes.
    pub fn note_count(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_list_public() {
        let store = NoteStore::new(None);

        store.insert("public note", "user-1", Some("Alice".to_string()), true);
        store.insert("private note", "user-1", Some("Alice".to_string()), false);
        store.insert("other public", "user-2", None, true);

        let public = store.public_notes();
        assert_eq!(public.len(), 2);
        assert!(public.iter().all(|n| n.public));
    }

    #[test]
    fn test_listings_are_newest_first() {
        let store = NoteStore::new(None);

        // Manufacture notes with distinct timestamps.
        for (i, text) in ["oldest", "middle", "newest"].iter().enumerate() {
            let note = Note {
                id: format!("note-{}", i),
                text: text.to_string(),
                user_id: "user-1".to_string(),
                creator_name: None,
                public: true,
                date: Utc::now() + chrono::Duration::seconds(i as i64),
            };
            store.by_id.insert(note.id.clone(), note);
        }

        let notes = store.notes_for_user("user-1");
        assert_eq!(notes[0].text, "newest");
        assert_eq!(notes[2].text, "oldest");

        let public = store.public_notes();
        assert_eq!(public[0].text, "newest");
    }

    #[test]
    fn test_public_flag_is_a_snapshot() {
        let store = NoteStore::new(None);

        let note = store.insert("note", "user-1", None, false);
        assert!(!note.public);

        // The stored note keeps the visibility it was created with; there
        // is no write path that revisits it.
        let listed = store.notes_for_user("user-1");
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].public);
        assert!(store.public_notes().is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let store = NoteStore::new(Some(dir.path().to_path_buf()));
        store.insert("saved note", "user-1", Some("Alice".to_string()), true);

        let reloaded = NoteStore::new(Some(dir.path().to_path_buf()));
        assert_eq!(reloaded.load_from_disk(), 1);
        let notes = reloaded.notes_for_user("user-1");
        assert_eq!(notes[0].text, "saved note");
        assert_eq!(notes[0].creator_name.as_deref(), Some("Alice"));
        assert!(notes[0].public);
    }
}
