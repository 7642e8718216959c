use crate::auth::{SessionOrigin, SessionProvider};
use crate::errors::{HmvError, Result};
use crate::markup::MarkupParser;
use crate::transport::{Connector, Transport};
use crate::{Endpoints, REQUEST_TIMEOUT};
use phf::phf_map;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Easy,
    Medium,
    Hard,
    Unknown,
}

/// The index page marks difficulty only through a colored top border.
static BORDER_COLORS: phf::Map<&'static str, Level> = phf_map! {
    "#28a745" => Level::Easy,
    "#ffc107" => Level::Medium,
    "#dc3545" => Level::Hard,
};

impl Level {
    pub fn from_border_color(color: &str) -> Level {
        BORDER_COLORS
            .get(color.trim().to_lowercase().as_str())
            .copied()
            .unwrap_or(Level::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Easy => "easy",
            Level::Medium => "medium",
            Level::Hard => "hard",
            Level::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Level::Easy),
            "medium" => Ok(Level::Medium),
            "hard" => Ok(Level::Hard),
            "unknown" => Ok(Level::Unknown),
            other => Err(format!("unknown level {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRecord {
    pub name: String,
    pub level: Level,
    /// Badge text as rendered, "?" when the row has none
    pub status: String,
    pub creator: String,
    pub link: String,
}

impl MachineRecord {
    pub fn is_pending(&self) -> bool {
        self.status.contains("TO HACK")
    }
}

/// Filters for one listing request.
///
/// `level` is a server-side category (easy, windows, hacked, ...), and the
/// server renders every match on a single page. `filter_level` is applied
/// locally to the difficulty parsed from each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineQuery {
    pub level: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub filter_level: Option<Level>,
    pub page: u32,
}

impl Default for MachineQuery {
    fn default() -> Self {
        MachineQuery {
            level: None,
            search: None,
            tag: None,
            filter_level: None,
            page: 1,
        }
    }
}

impl MachineQuery {
    /// Query string for the index page. The page is only sent past the first
    /// page, and never together with a level.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(level) = &self.level {
            params.push(("l", level.clone()));
        }
        if self.page > 1 && self.level.is_none() {
            params.push(("p", self.page.to_string()));
        }
        params.extend(self.search_params());
        params
    }

    fn search_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(search) = &self.search {
            params.push(("v", search.clone()));
        }
        if let Some(tag) = &self.tag {
            params.push(("t", tag.clone()));
        }
        params
    }

    fn keeps(&self, machine: &MachineRecord) -> bool {
        match self.filter_level {
            Some(level) => machine.level == level,
            None => true,
        }
    }
}

#[derive(Debug)]
pub struct MachineListing {
    pub machines: Vec<MachineRecord>,
    pub page: u32,
    pub total_pages: u32,
    pub origin: SessionOrigin,
}

impl MachineListing {
    /// Whether a "page X of Y" footer applies.
    pub fn is_paginated(&self, query: &MachineQuery) -> bool {
        query.level.is_none() && self.total_pages > 1
    }
}

/// Number of index pages for the query. A level query always fits on one
/// page, and anything unreadable counts as a single page.
#[tracing::instrument(skip(client, markup, endpoints))]
pub async fn total_pages<T: Transport>(
    client: &T,
    markup: &dyn MarkupParser,
    endpoints: &Endpoints,
    query: &MachineQuery,
) -> u32 {
    if query.level.is_some() {
        return 1;
    }
    let url = match endpoints.machines_url() {
        Ok(u) => u,
        Err(e) => {
            tracing::error!("{}", e);
            return 1;
        }
    };
    match client.get(&url, &query.search_params(), REQUEST_TIMEOUT).await {
        Ok(html) => markup.total_pages(&html).unwrap_or(1),
        Err(e) => {
            tracing::error!("Error fetching total pages\nError : {}", e);
            1
        }
    }
}

/// Fetches one page of the machine index and parses it, dropping rows that
/// fail to parse or don't match `filter_level`.
#[tracing::instrument(skip(provider, markup))]
pub async fn list_machines<C: Connector>(
    provider: &SessionProvider<'_, C>,
    markup: &dyn MarkupParser,
    query: &MachineQuery,
) -> Result<MachineListing> {
    let authenticated = provider.authenticated_client().await?;
    let client = &authenticated.client;
    let endpoints = provider.endpoints;

    let html = client
        .get(&endpoints.machines_url()?, &query.params(), REQUEST_TIMEOUT)
        .await?;
    let total_pages = total_pages(client, markup, endpoints, query).await;
    if query.level.is_none() && (query.page < 1 || query.page > total_pages) {
        return Err(HmvError::InvalidPage {
            page: query.page,
            total_pages,
        });
    }

    let parsed = markup.machine_rows(&html, endpoints);
    parsed.log_failures("machine");
    let machines: Vec<MachineRecord> = parsed
        .items
        .into_iter()
        .filter(|machine| query.keeps(machine))
        .collect();
    tracing::debug!("{} machines after filtering", machines.len());
    if machines.is_empty() {
        return Err(HmvError::NoMachinesFound);
    }

    Ok(MachineListing {
        machines,
        page: query.page,
        total_pages,
        origin: authenticated.origin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_colors_map_to_levels() {
        assert_eq!(Level::from_border_color("#28a745"), Level::Easy);
        assert_eq!(Level::from_border_color(" #FFC107 "), Level::Medium);
        assert_eq!(Level::from_border_color("#DC3545"), Level::Hard);
        for color in ["", "#000000", "red", "#28a745;", "solid"] {
            assert_eq!(Level::from_border_color(color), Level::Unknown);
            assert_eq!(Level::from_border_color(color), Level::Unknown);
        }
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("MEDIUM".parse::<Level>(), Ok(Level::Medium));
        assert_eq!(" Easy".parse::<Level>(), Ok(Level::Easy));
        assert!("insane".parse::<Level>().is_err());
        assert_eq!(Level::Hard.to_string(), "hard");
    }

    #[test]
    fn page_param_only_without_level() {
        let query = MachineQuery {
            page: 3,
            search: Some("todd".into()),
            ..Default::default()
        };
        assert_eq!(
            query.params(),
            vec![("p", "3".to_string()), ("v", "todd".to_string())]
        );

        let query = MachineQuery {
            level: Some("easy".into()),
            page: 3,
            tag: Some("web".into()),
            ..Default::default()
        };
        assert_eq!(
            query.params(),
            vec![("l", "easy".to_string()), ("t", "web".to_string())]
        );

        assert!(MachineQuery::default().params().is_empty());
    }

    #[test]
    fn filter_keeps_only_matching_levels() {
        let machine = |level| MachineRecord {
            name: "m".into(),
            level,
            status: "?".into(),
            creator: "c".into(),
            link: "l".into(),
        };
        let query = MachineQuery {
            filter_level: Some(Level::Medium),
            ..Default::default()
        };
        assert!(query.keeps(&machine(Level::Medium)));
        assert!(!query.keeps(&machine(Level::Easy)));
        assert!(!query.keeps(&machine(Level::Unknown)));
        assert!(MachineQuery::default().keeps(&machine(Level::Unknown)));
    }

    #[test]
    fn pending_status() {
        let mut machine = MachineRecord {
            name: "m".into(),
            level: Level::Easy,
            status: "TO HACK".into(),
            creator: "c".into(),
            link: "l".into(),
        };
        assert!(machine.is_pending());
        machine.status = "HACKED".into();
        assert!(!machine.is_pending());
    }
}
