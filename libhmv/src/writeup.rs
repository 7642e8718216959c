use crate::auth::SessionProvider;
use crate::errors::{HmvError, Result};
use crate::markup::MarkupParser;
use crate::transport::{Connector, Transport};
use crate::WRITEUP_TIMEOUT;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Age after which the local writeup mirror is refreshed before use.
pub const CACHE_TTL_HOURS: i64 = 24;

/// One community writeup. Field order is the column order of the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteupRecord {
    #[serde(rename = "vmname")]
    pub machine_name: String,
    pub machine_url: String,
    #[serde(rename = "author")]
    pub author_name: String,
    pub author_url: String,
    pub avatar_url: String,
    pub country_flag: String,
    pub language: String,
    #[serde(rename = "writeup")]
    pub writeup_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    English,
    Spanish,
    Chinese,
    Other,
}

impl LanguageFamily {
    pub fn of(language: &str) -> Self {
        match language.trim().to_lowercase().as_str() {
            "english" | "en" => LanguageFamily::English,
            "spanish" | "español" | "es" => LanguageFamily::Spanish,
            "chinese" | "zh" | "中文" => LanguageFamily::Chinese,
            _ => LanguageFamily::Other,
        }
    }
}

impl WriteupRecord {
    pub fn language_family(&self) -> LanguageFamily {
        LanguageFamily::of(&self.language)
    }
}

/// Case-insensitive substring match on the machine name.
pub fn search<'r>(records: &'r [WriteupRecord], pattern: &str) -> Vec<&'r WriteupRecord> {
    let pattern = pattern.to_lowercase();
    records
        .iter()
        .filter(|record| record.machine_name.to_lowercase().contains(&pattern))
        .collect()
}

/// Backing storage for the writeup mirror. Writes always replace the whole
/// data set.
pub trait WriteupStore: Send + Sync {
    /// Last modification time, `None` when nothing is stored.
    fn modified(&self) -> Option<DateTime<Utc>>;
    fn read(&self) -> Result<Vec<WriteupRecord>>;
    fn replace(&self, records: &[WriteupRecord]) -> Result<()>;

    fn exists(&self) -> bool {
        self.modified().is_some()
    }
}

#[derive(Debug)]
pub struct CsvWriteupStore {
    path: PathBuf,
}

impl CsvWriteupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvWriteupStore { path: path.into() }
    }
}

impl WriteupStore for CsvWriteupStore {
    fn modified(&self) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified());
        match modified {
            Ok(time) => Some(time.into()),
            Err(e) => {
                tracing::debug!("No usable writeup cache at {:?} : {}", self.path, e);
                None
            }
        }
    }

    fn read(&self) -> Result<Vec<WriteupRecord>> {
        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|e| HmvError::file_error(&self.path, e))?;
        let mut records = Vec::new();
        for (row_idx, row) in reader.deserialize::<WriteupRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping cached writeup row {} : {}", row_idx, e),
            }
        }
        Ok(records)
    }

    fn replace(&self, records: &[WriteupRecord]) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(&self.path).map_err(|e| HmvError::file_error(&self.path, e))?;
        for record in records.iter() {
            writer
                .serialize(record)
                .map_err(|e| HmvError::file_error(&self.path, e))?;
        }
        writer.flush().map_err(|e| HmvError::file_error(&self.path, e))
    }
}

#[derive(Debug, Default)]
pub struct MemoryWriteupStore {
    state: Mutex<Option<(DateTime<Utc>, Vec<WriteupRecord>)>>,
}

impl MemoryWriteupStore {
    pub fn with(modified: DateTime<Utc>, records: Vec<WriteupRecord>) -> Self {
        MemoryWriteupStore {
            state: Mutex::new(Some((modified, records))),
        }
    }
}

impl WriteupStore for MemoryWriteupStore {
    fn modified(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ok()?.as_ref().map(|(modified, _)| *modified)
    }

    fn read(&self) -> Result<Vec<WriteupRecord>> {
        Ok(self
            .state
            .lock()
            .ok()
            .and_then(|state| state.as_ref().map(|(_, records)| records.clone()))
            .unwrap_or_default())
    }

    fn replace(&self, records: &[WriteupRecord]) -> Result<()> {
        if let Ok(mut state) = self.state.lock() {
            *state = Some((Utc::now(), records.to_vec()));
        }
        Ok(())
    }
}

/// Where the records returned by [`WriteupCache::load`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// Within the freshness window, no request made
    Fresh,
    /// Just refreshed from the site
    Refreshed,
    /// Refresh failed, the older copy was used
    Stale,
    /// Refresh failed and there was nothing to fall back on
    Unavailable,
}

#[derive(Debug)]
pub struct WriteupLoad {
    pub records: Vec<WriteupRecord>,
    pub state: CacheState,
}

/// Time-boxed local mirror of the site's writeup index.
pub struct WriteupCache<'a> {
    store: &'a dyn WriteupStore,
    markup: &'a dyn MarkupParser,
}

impl<'a> WriteupCache<'a> {
    pub fn new(store: &'a dyn WriteupStore, markup: &'a dyn MarkupParser) -> Self {
        WriteupCache { store, markup }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.store.modified() {
            None => true,
            Some(modified) => now - modified > Duration::hours(CACHE_TTL_HOURS),
        }
    }

    /// Replaces the stored mirror with a fresh copy of the index. The store
    /// is left untouched unless at least one row was extracted.
    #[tracing::instrument(skip(self, provider))]
    pub async fn refresh<C: Connector>(&self, provider: &SessionProvider<'_, C>) -> Result<usize> {
        let authenticated = provider.authenticated_client().await?;
        provider
            .notifier()
            .info("Fetching writeup data from server...");
        let html = authenticated
            .client
            .get(&provider.endpoints.writeups_url()?, &[], WRITEUP_TIMEOUT)
            .await?;

        let parsed = self.markup.writeup_rows(&html, provider.endpoints);
        parsed.log_failures("writeup");
        if parsed.items.is_empty() {
            return Err(HmvError::NoData("writeup".into()));
        }
        self.store.replace(&parsed.items)?;
        tracing::debug!("Stored {} writeups", parsed.items.len());
        Ok(parsed.items.len())
    }

    /// Returns the mirror, refreshing it first when stale. A refresh that
    /// fails for anything but a fatal reason falls back on the older copy.
    pub async fn load<C: Connector>(
        &self,
        provider: &SessionProvider<'_, C>,
        now: DateTime<Utc>,
    ) -> Result<WriteupLoad> {
        let notifier = provider.notifier();
        let state = if !self.is_stale(now) {
            CacheState::Fresh
        } else {
            notifier.info("Writeup cache expired or missing, updating...");
            match self.refresh(provider).await {
                Ok(count) => {
                    notifier.success(format!(
                        "Writeup data updated successfully. ({count} records)"
                    ));
                    CacheState::Refreshed
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!("Writeup refresh failed\nError : {}", e);
                    notifier.error(e.to_string());
                    if self.store.exists() {
                        notifier.info("Using cached writeup data (might be outdated).");
                        CacheState::Stale
                    } else {
                        return Ok(WriteupLoad {
                            records: Vec::new(),
                            state: CacheState::Unavailable,
                        });
                    }
                }
            }
        };
        Ok(WriteupLoad {
            records: self.store.read()?,
            state,
        })
    }
}
