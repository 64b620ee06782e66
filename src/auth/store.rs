//! Durable session persistence.
//!
//! The session survives restarts as three independent entries: the access
//! credential, the refresh credential, and the cached profile. Reads never
//! fail (absence is an expected state); writes commit the three entries
//! together or not at all.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::api::error::AuthError;
use crate::models::Profile;

/// File names for the three durable entries.
const ACCESS_FILE: &str = "access_token.json";
const REFRESH_FILE: &str = "refresh_token.json";
const PROFILE_FILE: &str = "profile.json";

/// A persisted entry together with its storage timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry<T> {
    data: T,
    stored_at: DateTime<Utc>,
}

impl<T> StoredEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            stored_at: Utc::now(),
        }
    }
}

/// Whatever subset of the session currently exists in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub profile: Option<Profile>,
}

// Allow dead code: inspection helpers for store consumers and tests
#[allow(dead_code)]
impl StoredSession {
    /// Both credentials are present; startup recovery can attempt them.
    pub fn has_credentials(&self) -> bool {
        self.access.is_some() && self.refresh.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && self.profile.is_none()
    }
}

/// Durable key/value persistence for the session.
///
/// Implementations have no side effects beyond their storage medium and
/// never perform network calls. The session controller is the only writer.
pub trait SessionStore: Send + Sync {
    /// Persist the credential pair and profile together. A full or disabled
    /// medium fails the whole write with `StorageUnavailable`; nothing
    /// partial is left behind.
    fn write(&self, access: &str, refresh: &str, profile: &Profile) -> Result<(), AuthError>;

    /// Return whatever subset of the entries currently exists.
    fn read(&self) -> StoredSession;

    /// Remove every session-scoped entry. Idempotent.
    fn clear(&self);
}

/// File-backed store: one JSON file per entry in a dedicated session
/// directory under the OS cache dir.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.tmp", name))
    }

    fn read_entry<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.path(name);
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(entry = name, error = %e, "Failed to read session entry");
                return None;
            }
        };
        match serde_json::from_str::<StoredEntry<T>>(&contents) {
            Ok(entry) => Some(entry.data),
            Err(e) => {
                warn!(entry = name, error = %e, "Failed to parse session entry");
                None
            }
        }
    }

    fn remove_all(&self, names: &[&str]) {
        for name in names {
            let _ = std::fs::remove_file(self.path(name));
            let _ = std::fs::remove_file(self.tmp_path(name));
        }
    }
}

fn storage_unavailable(err: impl std::fmt::Display) -> AuthError {
    AuthError::StorageUnavailable(err.to_string())
}

impl SessionStore for FileStore {
    fn write(&self, access: &str, refresh: &str, profile: &Profile) -> Result<(), AuthError> {
        std::fs::create_dir_all(&self.dir).map_err(storage_unavailable)?;

        let entries = [
            (
                ACCESS_FILE,
                serde_json::to_string_pretty(&StoredEntry::new(access)),
            ),
            (
                REFRESH_FILE,
                serde_json::to_string_pretty(&StoredEntry::new(refresh)),
            ),
            (
                PROFILE_FILE,
                serde_json::to_string_pretty(&StoredEntry::new(profile)),
            ),
        ];

        // Stage every entry first, then rename into place. A failure at any
        // point clears the store rather than leaving a mixed commit.
        let mut staged = Vec::new();
        for (name, json) in entries {
            let json = json.map_err(storage_unavailable)?;
            match std::fs::write(self.tmp_path(name), json) {
                Ok(()) => staged.push(name),
                Err(e) => {
                    self.remove_all(&[ACCESS_FILE, REFRESH_FILE, PROFILE_FILE]);
                    return Err(storage_unavailable(e));
                }
            }
        }
        for name in staged {
            if let Err(e) = std::fs::rename(self.tmp_path(name), self.path(name)) {
                self.remove_all(&[ACCESS_FILE, REFRESH_FILE, PROFILE_FILE]);
                return Err(storage_unavailable(e));
            }
        }
        Ok(())
    }

    fn read(&self) -> StoredSession {
        StoredSession {
            access: self.read_entry(ACCESS_FILE),
            refresh: self.read_entry(REFRESH_FILE),
            profile: self.read_entry(PROFILE_FILE),
        }
    }

    fn clear(&self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// In-memory store for tests and non-persistent sessions.
#[derive(Default)]
pub struct MemoryStore {
    cell: Mutex<StoredSession>,
    fail_writes: AtomicBool,
}

// Allow dead code: constructed by tests and embedding consumers
#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with `StorageUnavailable`, simulating a
    /// full or disabled medium.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredSession> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn write(&self, access: &str, refresh: &str, profile: &Profile) -> Result<(), AuthError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthError::StorageUnavailable(
                "storage disabled".to_string(),
            ));
        }
        *self.lock() = StoredSession {
            access: Some(access.to_string()),
            refresh: Some(refresh.to_string()),
            profile: Some(profile.clone()),
        };
        Ok(())
    }

    fn read(&self) -> StoredSession {
        self.lock().clone()
    }

    fn clear(&self) {
        *self.lock() = StoredSession::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::sample_profile;

    fn temp_store(test: &str) -> FileStore {
        let dir = std::env::temp_dir().join(format!(
            "brightroot-store-{}-{}",
            test,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        FileStore::new(dir)
    }

    #[test]
    fn file_store_roundtrip() {
        let store = temp_store("roundtrip");
        let profile = sample_profile("mara");

        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");

        let stored = store.read();
        assert_eq!(stored.access.as_deref(), Some("access-1"));
        assert_eq!(stored.refresh.as_deref(), Some("refresh-1"));
        assert_eq!(stored.profile, Some(profile));

        store.clear();
    }

    #[test]
    fn file_store_read_returns_the_surviving_subset() {
        let store = temp_store("subset");
        let profile = sample_profile("mara");
        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");

        // Lose one entry; the others must still come back.
        std::fs::remove_file(store.path(REFRESH_FILE)).expect("entry should exist");

        let stored = store.read();
        assert_eq!(stored.access.as_deref(), Some("access-1"));
        assert!(stored.refresh.is_none());
        assert!(stored.profile.is_some());
        assert!(!stored.has_credentials());

        store.clear();
    }

    #[test]
    fn file_store_corrupt_entry_reads_as_absent() {
        let store = temp_store("corrupt");
        let profile = sample_profile("mara");
        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");

        std::fs::write(store.path(PROFILE_FILE), "not json").expect("write should succeed");

        let stored = store.read();
        assert!(stored.profile.is_none());
        assert!(stored.has_credentials());

        store.clear();
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let store = temp_store("clear");
        store.clear();
        store.clear();
        assert!(store.read().is_empty());

        let profile = sample_profile("mara");
        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");
        store.clear();
        store.clear();
        assert!(store.read().is_empty());
    }

    #[test]
    fn file_store_rewrite_replaces_the_previous_session() {
        let store = temp_store("rewrite");
        let profile = sample_profile("mara");
        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");
        store
            .write("access-2", "refresh-2", &profile)
            .expect("write should succeed");

        let stored = store.read();
        assert_eq!(stored.access.as_deref(), Some("access-2"));
        assert_eq!(stored.refresh.as_deref(), Some("refresh-2"));

        store.clear();
    }

    #[test]
    fn memory_store_roundtrip_and_failure_mode() {
        let store = MemoryStore::new();
        let profile = sample_profile("mara");

        store
            .write("access-1", "refresh-1", &profile)
            .expect("write should succeed");
        assert!(store.read().has_credentials());

        store.set_fail_writes(true);
        let err = store
            .write("access-2", "refresh-2", &profile)
            .expect_err("write should fail");
        assert!(matches!(err, AuthError::StorageUnavailable(_)));

        // A failed write must not disturb what was already stored.
        assert_eq!(store.read().access.as_deref(), Some("access-1"));

        store.clear();
        assert!(store.read().is_empty());
        store.clear();
    }
}
