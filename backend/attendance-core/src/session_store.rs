// src/session_store.rs
//
// Small JSON files that outlive a page: the last per-employee attendance list
// (for cross-page navigation), the remembered login and recent logins. Each
// client session gets its own directory under the store root.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};

use crate::aggregate::{AttendanceSummary, EmployeeAttendance};
use crate::error::SheetError;

pub const SESSION_TTL_DAYS: i64 = 3;
pub const LOGIN_HISTORY_LIMIT: usize = 10;

const SNAPSHOT_FILE: &str = "attendance_snapshot.json";
const REMEMBERED_LOGIN_FILE: &str = "remembered_login.json";
const LOGIN_HISTORY_FILE: &str = "login_history.json";

const SESSION_ID_LEN: usize = 32;

// --- Session Id ---

/// Opaque client session identifier. Only ASCII letters, digits, `-` and `_`
/// are accepted, so an id is always a single safe path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = (8..=64).contains(&raw.len())
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Stored Types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub id: String,
    pub name: String,
    pub summary: AttendanceSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSnapshot {
    pub warehouse: String,
    /// Sheet the list was computed from
    pub page: String,
    pub items: Vec<SnapshotItem>,
    pub saved_at: DateTime<Utc>,
}

impl AttendanceSnapshot {
    pub fn from_employees(warehouse: &str, page: &str, employees: &[EmployeeAttendance]) -> Self {
        let items = employees
            .iter()
            .map(|e| SnapshotItem {
                // First contributing row doubles as the item id
                id: e.row_ids.first().cloned().unwrap_or_else(|| e.name.clone()),
                name: e.name.clone(),
                summary: e.summary.clone(),
            })
            .collect();
        Self {
            warehouse: warehouse.to_string(),
            page: page.to_string(),
            items,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberedLogin {
    pub name: String,
    pub warehouse_key: String,
    pub is_admin: bool,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginHistoryEntry {
    pub name: String,
    pub warehouse_key: String,
    pub at: DateTime<Utc>,
}

// --- Store ---

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store scoped to one client session.
    pub fn for_session(&self, id: &SessionId) -> SessionStore {
        Self {
            dir: self.dir.join(id.as_str()),
            ttl: self.ttl,
        }
    }

    fn is_expired(&self, stamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(stamp) >= self.ttl
    }

    async fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), SheetError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            SheetError::storage(format!("Failed to create session directory: {:?}", self.dir), e)
        })?;
        let path = self.dir.join(file_name);
        let json_string = serde_json::to_string_pretty(value)
            .map_err(|e| SheetError::storage(format!("Failed to encode {}", file_name), e))?;

        fs::write(&path, json_string)
            .await
            .map_err(|e| SheetError::storage(format!("Failed to write file: {:?}", path), e))?;
        debug!("Saved session file {:?}", path);
        Ok(())
    }

    /// `None` when the file is missing or unreadable as `T`.
    async fn read_json<T: DeserializeOwned>(&self, file_name: &str) -> Result<Option<T>, SheetError> {
        let path = self.dir.join(file_name);
        let json_string = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SheetError::storage(format!("Failed to read file: {:?}", path), e));
            }
        };

        match serde_json::from_str(&json_string) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Failed to deserialize session file {:?}: {}. Removing it.", path, e);
                self.remove(file_name).await;
                Ok(None)
            }
        }
    }

    async fn remove(&self, file_name: &str) {
        let path = self.dir.join(file_name);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                error!("Failed to remove session file {:?}: {}", path, e);
            }
        }
    }

    // --- Attendance Snapshot ---

    pub async fn save_snapshot(&self, snapshot: &AttendanceSnapshot) -> Result<(), SheetError> {
        self.write_json(SNAPSHOT_FILE, snapshot).await
    }

    pub async fn load_snapshot(&self) -> Result<Option<AttendanceSnapshot>, SheetError> {
        self.read_json(SNAPSHOT_FILE).await
    }

    // --- Remembered Login ---

    pub async fn remember_login(&self, login: &RememberedLogin) -> Result<(), SheetError> {
        self.write_json(REMEMBERED_LOGIN_FILE, login).await
    }

    pub async fn forget_login(&self) {
        self.remove(REMEMBERED_LOGIN_FILE).await;
    }

    pub async fn load_remembered_login(&self) -> Result<Option<RememberedLogin>, SheetError> {
        self.load_remembered_login_at(Utc::now()).await
    }

    /// Expired logins are deleted from disk and reported as absent.
    pub async fn load_remembered_login_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<RememberedLogin>, SheetError> {
        match self.read_json::<RememberedLogin>(REMEMBERED_LOGIN_FILE).await? {
            Some(login) if self.is_expired(login.saved_at, now) => {
                debug!("Remembered login for '{}' expired", login.name);
                self.forget_login().await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    // --- Login History ---

    /// Newest first; a repeat login for the same name and warehouse moves to
    /// the front instead of adding a second entry.
    pub async fn record_login(
        &self,
        entry: LoginHistoryEntry,
    ) -> Result<Vec<LoginHistoryEntry>, SheetError> {
        let mut history = self.load_login_history_at(entry.at).await?;
        history.retain(|h| !(h.name == entry.name && h.warehouse_key == entry.warehouse_key));
        history.insert(0, entry);
        history.truncate(LOGIN_HISTORY_LIMIT);
        self.write_json(LOGIN_HISTORY_FILE, &history).await?;
        Ok(history)
    }

    pub async fn load_login_history(&self) -> Result<Vec<LoginHistoryEntry>, SheetError> {
        self.load_login_history_at(Utc::now()).await
    }

    /// Drops expired entries and writes the pruned list back when anything
    /// was removed.
    pub async fn load_login_history_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<LoginHistoryEntry>, SheetError> {
        let history: Vec<LoginHistoryEntry> =
            self.read_json(LOGIN_HISTORY_FILE).await?.unwrap_or_default();
        let before = history.len();
        let kept: Vec<LoginHistoryEntry> = history
            .into_iter()
            .filter(|h| !self.is_expired(h.at, now))
            .collect();
        if kept.len() != before {
            debug!("Pruned {} expired login history entries", before - kept.len());
            self.write_json(LOGIN_HISTORY_FILE, &kept).await?;
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    fn test_dir(test_name: &str) -> PathBuf {
        PathBuf::from(format!("./test_session_{}", test_name))
    }

    // Clean up test files before and after tests
    fn setup(test_name: &str) -> SessionStore {
        teardown(test_name);
        SessionStore::new(test_dir(test_name))
    }

    fn teardown(test_name: &str) {
        let _ = std_fs::remove_dir_all(test_dir(test_name));
    }

    fn login(name: &str, warehouse_key: &str, at: DateTime<Utc>) -> LoginHistoryEntry {
        LoginHistoryEntry {
            name: name.to_string(),
            warehouse_key: warehouse_key.to_string(),
            at,
        }
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = setup("snapshot");
        assert_eq!(store.load_snapshot().await.unwrap(), None);

        let employees = vec![EmployeeAttendance {
            name: "王小明".to_string(),
            row_ids: vec!["gas_0".to_string(), "gas_3".to_string()],
            summary: AttendanceSummary::from_counts(9, 10),
        }];
        let snapshot = AttendanceSnapshot::from_employees("TP01", "3月班表", &employees);
        store.save_snapshot(&snapshot).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.items[0].id, "gas_0");
        teardown("snapshot");
    }

    #[tokio::test]
    async fn test_remembered_login_expires_after_three_days() {
        let store = setup("remembered");
        let saved_at = Utc::now();
        store
            .remember_login(&RememberedLogin {
                name: "王小明".to_string(),
                warehouse_key: "TP01".to_string(),
                is_admin: false,
                saved_at,
            })
            .await
            .unwrap();

        let still_valid = store
            .load_remembered_login_at(saved_at + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(still_valid.map(|l| l.name), Some("王小明".to_string()));

        let expired = store
            .load_remembered_login_at(saved_at + Duration::days(SESSION_TTL_DAYS))
            .await
            .unwrap();
        assert_eq!(expired, None);
        assert!(!store.dir().join(REMEMBERED_LOGIN_FILE).exists(), "expired login is deleted");
        teardown("remembered");
    }

    #[tokio::test]
    async fn test_login_history_dedups_and_prunes() {
        let store = setup("history");
        let start = Utc::now();
        store.record_login(login("王小明", "TP01", start)).await.unwrap();
        store
            .record_login(login("李小華", "TP01", start + Duration::days(2)))
            .await
            .unwrap();
        let history = store
            .record_login(login("王小明", "TP01", start + Duration::days(2)))
            .await
            .unwrap();
        let names: Vec<&str> = history.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["王小明", "李小華"]);

        // The first 王小明 entry was replaced, so nothing expires yet
        let later = store
            .load_login_history_at(start + Duration::days(4))
            .await
            .unwrap();
        assert_eq!(later.len(), 2);

        let pruned = store
            .load_login_history_at(start + Duration::days(5))
            .await
            .unwrap();
        assert!(pruned.is_empty());
        // Pruned list was written back
        let raw = std_fs::read_to_string(store.dir().join(LOGIN_HISTORY_FILE)).unwrap();
        assert_eq!(raw.trim(), "[]");
        teardown("history");
    }

    #[test]
    fn test_session_id_rejects_path_components() {
        let generated = SessionId::generate();
        assert_eq!(generated.as_str().len(), SESSION_ID_LEN);
        assert_eq!(SessionId::parse(generated.as_str()), Some(generated));

        assert!(SessionId::parse(" client-0001 ").is_some());
        assert_eq!(SessionId::parse("../../etc"), None);
        assert_eq!(SessionId::parse("short"), None);
        assert_eq!(SessionId::parse("a/b/c/d/e/f"), None);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_files() {
        let root = setup("scoped");
        let first = root.for_session(&SessionId::parse("session-one").unwrap());
        let second = root.for_session(&SessionId::parse("session-two").unwrap());
        let now = Utc::now();

        first
            .remember_login(&RememberedLogin {
                name: "王小明".to_string(),
                warehouse_key: "TP01".to_string(),
                is_admin: false,
                saved_at: now,
            })
            .await
            .unwrap();
        second.record_login(login("李小華", "KH02", now)).await.unwrap();
        second.forget_login().await;

        let remembered = first.load_remembered_login().await.unwrap();
        assert_eq!(remembered.map(|l| l.name), Some("王小明".to_string()));
        assert_eq!(second.load_remembered_login().await.unwrap(), None);
        assert!(first.load_login_history().await.unwrap().is_empty());
        assert_eq!(second.load_login_history().await.unwrap().len(), 1);
        teardown("scoped");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_absent() {
        let store = setup("corrupt");
        std_fs::create_dir_all(store.dir()).unwrap();
        std_fs::write(store.dir().join(SNAPSHOT_FILE), "{not json").unwrap();

        assert_eq!(store.load_snapshot().await.unwrap(), None);
        assert!(!store.dir().join(SNAPSHOT_FILE).exists());
        teardown("corrupt");
    }
}
