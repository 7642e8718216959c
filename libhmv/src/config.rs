use crate::errors::{HmvError, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Trims both fields and refuses empty ones.
    pub fn new(username: &str, password: &str) -> Result<Self> {
        let credentials = Credentials {
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(HmvError::EmptyCredentials);
        }
        Ok(())
    }
}

/// Where the account credentials live between invocations.
pub trait ConfigStore: Send + Sync {
    /// `None` when nothing usable is stored. Never fails.
    fn load(&self) -> Option<Credentials>;
    /// Replaces whatever was stored. Empty fields are refused before anything
    /// is written.
    fn save(&self, credentials: &Credentials) -> Result<()>;
}

#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigStore { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Option<Credentials> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!("Error reading config file {:?}\nError : {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::error!("Error parsing config file {:?}\nError : {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        credentials.validate()?;
        let content = serde_json::to_string_pretty(credentials)
            .map_err(|e| HmvError::file_error(&self.path, e))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HmvError::file_error(parent, e))?;
        }
        std::fs::write(&self.path, content).map_err(|e| HmvError::file_error(&self.path, e))?;
        tracing::debug!("Configuration written to {:?}", self.path);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryConfigStore {
    pub fn with(credentials: Credentials) -> Self {
        MemoryConfigStore {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Option<Credentials> {
        self.credentials.lock().ok()?.clone()
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        credentials.validate()?;
        if let Ok(mut stored) = self.credentials.lock() {
            *stored = Some(credentials.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    #[test]
    fn new_trims_and_rejects_empty_fields() {
        assert_eq!(
            Credentials::new("  alice ", " s3cret\n").unwrap(),
            creds("alice", "s3cret")
        );
        assert_eq!(
            Credentials::new("   ", "pw").unwrap_err(),
            HmvError::EmptyCredentials
        );
        assert_eq!(
            Credentials::new("bob", "").unwrap_err(),
            HmvError::EmptyCredentials
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let printed = format!("{:?}", creds("alice", "hunter2"));
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn file_store_round_trips_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::new(&path);
        assert_eq!(store.load(), None);

        store.save(&creds("alice", "pw")).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"username\": \"alice\""));
        assert_eq!(store.load(), Some(creds("alice", "pw")));

        store.save(&creds("carol", "other")).unwrap();
        assert_eq!(store.load(), Some(creds("carol", "other")));
    }

    #[test]
    fn rejected_save_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::new(&path);
        store.save(&creds("alice", "pw")).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        for (user, pass) in [("", "pw"), ("alice", ""), ("", "")] {
            assert_eq!(
                store.save(&creds(user, pass)),
                Err(HmvError::EmptyCredentials)
            );
            assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        }

        let missing = FileConfigStore::new(dir.path().join("never.json"));
        assert!(missing.save(&creds("", "pw")).is_err());
        assert!(!dir.path().join("never.json").exists());
    }

    #[test]
    fn invalid_json_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ username: ").unwrap();
        assert_eq!(FileConfigStore::new(&path).load(), None);
    }

    #[test]
    fn memory_store_refuses_empty_fields() {
        let store = MemoryConfigStore::default();
        assert!(store.save(&creds("", "x")).is_err());
        assert_eq!(store.load(), None);
        store.save(&creds("a", "b")).unwrap();
        assert_eq!(store.load(), Some(creds("a", "b")));
    }
}
