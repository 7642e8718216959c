use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

pub mod auth;
pub mod config;
pub mod download;
mod errors;
pub mod flag;
pub mod machine;
pub mod markup;
pub mod session;
pub mod transport;
pub mod writeup;

pub use errors::{HmvError, Result};

pub const DEFAULT_BASE_URL: &str = "https://hackmyvm.eu/";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://downloads.hackmyvm.eu/";
pub const BASE_URL_ENV: &str = "HMV_BASE_URL";
pub const DOWNLOAD_URL_ENV: &str = "HMV_DOWNLOAD_URL";

/// Substring that only appears once the site renders a logged-in page.
pub const SUCCESS_MARKER: &str = "Logout";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITEUP_TIMEOUT: Duration = Duration::from_secs(15);

const CONFIG_FILE_NAME: &str = ".hmv_config.json";
const SESSION_FILE_NAME: &str = ".hmv_session.json";
const WRITEUP_FILE_NAME: &str = ".hmv_writeups.csv";
const LOG_DIRECTORY: &str = ".hmv/logs";

/// Locations of the remote pages this client talks to.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub base: Url,
    pub downloads: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            base: Url::parse(DEFAULT_BASE_URL).unwrap(),
            downloads: Url::parse(DEFAULT_DOWNLOAD_URL).unwrap(),
        }
    }
}

impl Endpoints {
    pub fn new(base: &str, downloads: &str) -> Result<Self> {
        Ok(Endpoints {
            base: parse_directory_url(base)?,
            downloads: parse_directory_url(downloads)?,
        })
    }

    /// Defaults, overridden by `HMV_BASE_URL` and `HMV_DOWNLOAD_URL` when set.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let downloads =
            std::env::var(DOWNLOAD_URL_ENV).unwrap_or_else(|_| DEFAULT_DOWNLOAD_URL.into());
        Endpoints::new(&base, &downloads)
    }

    pub fn machines_url(&self) -> Result<Url> {
        Ok(self.base.join("machines/")?)
    }

    pub fn login_url(&self) -> Result<Url> {
        Ok(self.base.join("login/auth.php")?)
    }

    pub fn writeups_url(&self) -> Result<Url> {
        Ok(self.base.join("hmv/writeupz.php")?)
    }

    pub fn flag_url(&self) -> Result<Url> {
        Ok(self.base.join("machines/checkflag.php")?)
    }

    pub fn machine_link(&self, name: &str) -> String {
        format!("{}machines/machine.php?vm={}", self.base, name)
    }

    /// Archives live under the download host as `<lowercased-name>.zip`.
    pub fn archive_url(&self, machine_name: &str) -> Result<Url> {
        Ok(self.downloads.join(&archive_file_name(machine_name))?)
    }
}

pub fn archive_file_name(machine_name: &str) -> String {
    format!("{}.zip", machine_name.to_lowercase())
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
fn parse_directory_url(raw: &str) -> Result<Url> {
    let raw = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&raw).map_err(|e| HmvError::InvalidUrl(format!("{raw} ({e})")))
}

/// Files this client keeps between invocations.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub config: PathBuf,
    pub session: PathBuf,
    pub writeups: PathBuf,
    pub log_dir: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: PathBuf) -> Self {
        StatePaths {
            config: dir.join(CONFIG_FILE_NAME),
            session: dir.join(SESSION_FILE_NAME),
            writeups: dir.join(WRITEUP_FILE_NAME),
            log_dir: dir.join(LOG_DIRECTORY),
        }
    }

    pub fn from_home() -> Result<Self> {
        dirs::home_dir()
            .map(StatePaths::in_dir)
            .ok_or(HmvError::HomeDirectoryNotFound)
    }
}

#[derive(Debug)]
pub enum Update {
    MessageUpdate(Message),
    ProgressUpdate(Progress),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug)]
pub struct Message {
    pub kind: MessageKind,
    pub content: String,
}

#[derive(Debug)]
pub struct Progress {
    pub bytes_written: u64,
    /// Zero when the server did not announce a length
    pub file_size: u64,
    pub resource_name: String,
}

/// Sends status updates to whoever renders them. A notifier without a
/// receiver, or whose receiver has gone away, drops updates silently.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<UnboundedSender<Update>>,
}

impl Notifier {
    pub fn new(tx: UnboundedSender<Update>) -> Self {
        Notifier { tx: Some(tx) }
    }

    pub fn silent() -> Self {
        Notifier::default()
    }

    fn send(&self, update: Update) {
        if let Some(tx) = &self.tx {
            if tx.send(update).is_err() {
                tracing::debug!("Update receiver dropped");
            }
        }
    }

    fn message(&self, kind: MessageKind, content: impl Into<String>) {
        self.send(Update::MessageUpdate(Message {
            kind,
            content: content.into(),
        }));
    }

    pub fn info(&self, content: impl Into<String>) {
        self.message(MessageKind::Info, content)
    }

    pub fn success(&self, content: impl Into<String>) {
        self.message(MessageKind::Success, content)
    }

    pub fn warning(&self, content: impl Into<String>) {
        self.message(MessageKind::Warning, content)
    }

    pub fn error(&self, content: impl Into<String>) {
        self.message(MessageKind::Error, content)
    }

    pub fn progress(&self, resource_name: &str, bytes_written: u64, file_size: u64) {
        self.send(Update::ProgressUpdate(Progress {
            bytes_written,
            file_size,
            resource_name: resource_name.to_string(),
        }));
    }
}
