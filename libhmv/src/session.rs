use crate::errors::{HmvError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
}

impl std::fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoredCookie({}=<redacted>)", self.name)
    }
}

/// Authenticated client state that survives between invocations.
///
/// `captured_at` is informational only. Whether a session is still good is
/// decided by probing the site, never by its age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub cookies: Vec<StoredCookie>,
    pub user_agent: String,
    /// Files written before the timestamp was recorded load with "now".
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl SessionHandle {
    /// Value for a `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parses a `name=value; name2=value2` header back into cookies.
    pub fn parse_cookie_header(header: &str) -> Vec<StoredCookie> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| StoredCookie {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect()
    }
}

pub trait SessionStore: Send + Sync {
    /// `None` when nothing was saved or the saved data can't be read back.
    fn load(&self) -> Option<SessionHandle>;
    fn save(&self, session: &SessionHandle) -> Result<()>;
    /// Returns whether a saved session was actually removed.
    fn clear(&self) -> Result<bool>;
}

#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSessionStore { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<SessionHandle> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!("Error loading session {:?}\nError : {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!("Error loading session {:?}\nError : {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, session: &SessionHandle) -> Result<()> {
        let content =
            serde_json::to_string(session).map_err(|e| HmvError::file_error(&self.path, e))?;
        std::fs::write(&self.path, content).map_err(|e| HmvError::file_error(&self.path, e))
    }

    fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HmvError::file_error(&self.path, e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<SessionHandle>>,
    saves: Mutex<usize>,
}

impl MemorySessionStore {
    pub fn with(session: SessionHandle) -> Self {
        MemorySessionStore {
            session: Mutex::new(Some(session)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<SessionHandle> {
        self.session.lock().ok()?.clone()
    }

    fn save(&self, session: &SessionHandle) -> Result<()> {
        if let Ok(mut stored) = self.session.lock() {
            *stored = Some(session.clone());
        }
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        Ok(self
            .session
            .lock()
            .map(|mut s| s.take().is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn handle() -> SessionHandle {
        SessionHandle {
            cookies: vec![
                StoredCookie {
                    name: "PHPSESSID".into(),
                    value: "abc123".into(),
                },
                StoredCookie {
                    name: "lang".into(),
                    value: "en".into(),
                },
            ],
            user_agent: "test-agent".into(),
            captured_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn cookie_header_parses_back() {
        let header = handle().cookie_header();
        assert_eq!(header, "PHPSESSID=abc123; lang=en");
        assert_eq!(SessionHandle::parse_cookie_header(&header), handle().cookies);
        assert!(SessionHandle::parse_cookie_header(" ; junk; =x").is_empty());
    }

    #[test]
    fn file_store_persists_an_inspectable_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load(), None);
        assert_eq!(store.clear().unwrap(), false);

        store.save(&handle()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
        assert!(raw.contains("\"PHPSESSID\""));
        assert!(raw.contains("2024-01-02T03:04:05Z"));
        assert_eq!(store.load(), Some(handle()));

        assert_eq!(store.clear().unwrap(), true);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn old_sessions_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));
        let mut ancient = handle();
        ancient.captured_at = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap();
        store.save(&ancient).unwrap();
        assert_eq!(store.load(), Some(ancient));
    }

    #[test]
    fn sessions_without_a_timestamp_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"cookies":[{"name":"PHPSESSID","value":"x"}],"user_agent":"ua"}"#,
        )
        .unwrap();

        let before = Utc::now();
        let loaded = FileSessionStore::new(&path).load().unwrap();
        assert_eq!(loaded.cookie_header(), "PHPSESSID=x");
        assert_eq!(loaded.user_agent, "ua");
        assert!(loaded.captured_at >= before);
    }

    #[test]
    fn corrupt_session_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, [0x80, 0x04, 0x95]).unwrap();
        assert_eq!(FileSessionStore::new(&path).load(), None);
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemorySessionStore::default();
        store.save(&handle()).unwrap();
        store.save(&handle()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.clear().unwrap(), true);
        assert_eq!(store.clear().unwrap(), false);
    }
}
