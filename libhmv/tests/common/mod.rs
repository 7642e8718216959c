#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use libhmv::config::{Credentials, MemoryConfigStore};
use libhmv::session::{SessionHandle, StoredCookie};
use libhmv::transport::{ChunkStream, Connector, Transport, USER_AGENT};
use libhmv::{HmvError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const SESSION_COOKIE: &str = "PHPSESSID";
pub const LOGGED_OUT_PAGE: &str = "<html><body><a href=\"/login/\">Login</a></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    pub host: String,
    pub path: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct SiteState {
    pub requests: Vec<Request>,
    pub username: String,
    pub password: String,
    /// Session token the site currently accepts
    pub valid_token: Option<String>,
    pub tokens_issued: u32,
    pub network_down: bool,
    pub machines_unreachable: bool,
    pub machines_html: String,
    pub writeups_html: String,
    pub writeups_unreachable: bool,
    pub flag_reply: String,
    /// `None` answers archive requests with 404
    pub archive: Option<Vec<u8>>,
    /// Fail the archive body after this many chunks
    pub archive_breaks_after: Option<usize>,
}

impl Default for SiteState {
    fn default() -> Self {
        SiteState {
            requests: Vec::new(),
            username: "alice".into(),
            password: "s3cret".into(),
            valid_token: None,
            tokens_issued: 0,
            network_down: false,
            machines_unreachable: false,
            machines_html: machines_page(&[("Todd", "#28a745", "HACKED", "sml")], 1),
            writeups_html: String::new(),
            writeups_unreachable: false,
            flag_reply: String::new(),
            archive: None,
            archive_breaks_after: None,
        }
    }
}

/// In-process stand-in for the site. Every request any client makes is
/// recorded in `state.requests`.
#[derive(Clone, Default)]
pub struct FakeSite {
    pub state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn with(configure: impl FnOnce(&mut SiteState)) -> Self {
        let site = FakeSite::default();
        configure(&mut site.state.lock().unwrap());
        site
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn login_posts(&self) -> usize {
        self.count("POST", "/login/auth.php")
    }

    /// A session the site will accept, as if saved by an earlier run.
    pub fn accepted_session(&self) -> SessionHandle {
        let mut state = self.state.lock().unwrap();
        state.tokens_issued += 1;
        let token = format!("tok-{}", state.tokens_issued);
        state.valid_token = Some(token.clone());
        session_with(&token)
    }
}

pub fn session_with(token: &str) -> SessionHandle {
    SessionHandle {
        cookies: vec![StoredCookie {
            name: SESSION_COOKIE.into(),
            value: token.into(),
        }],
        user_agent: USER_AGENT.into(),
        captured_at: Utc::now(),
    }
}

pub fn credentials() -> MemoryConfigStore {
    MemoryConfigStore::with(Credentials::new("alice", "s3cret").unwrap())
}

pub fn session_token(session: &SessionHandle) -> Option<String> {
    session
        .cookies
        .iter()
        .find(|c| c.name == SESSION_COOKIE)
        .map(|c| c.value.clone())
}

impl Connector for FakeSite {
    type Client = FakeClient;

    fn connect(&self, session: Option<&SessionHandle>) -> Result<FakeClient> {
        Ok(FakeClient {
            state: self.state.clone(),
            token: Mutex::new(session.and_then(session_token)),
        })
    }
}

pub struct FakeClient {
    state: Arc<Mutex<SiteState>>,
    token: Mutex<Option<String>>,
}

impl FakeClient {
    fn record(&self, method: &'static str, url: &Url, params: Vec<(String, String)>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(Request {
            method,
            host: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
            params,
        });
        if state.network_down {
            return Err(HmvError::NetworkError("connection refused".into()));
        }
        Ok(())
    }

    fn logged_in(&self) -> bool {
        let state = self.state.lock().unwrap();
        let token = self.token.lock().unwrap();
        token.is_some() && *token == state.valid_token
    }
}

#[async_trait]
impl Transport for FakeClient {
    async fn get(&self, url: &Url, query: &[(&str, String)], _timeout: Duration) -> Result<String> {
        let params = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.record("GET", url, params)?;
        let logged_in = self.logged_in();
        let state = self.state.lock().unwrap();
        match url.path() {
            "/machines/" if state.machines_unreachable => {
                Err(HmvError::NetworkError("timed out".into()))
            }
            "/machines/" if logged_in => Ok(state.machines_html.clone()),
            "/hmv/writeupz.php" if state.writeups_unreachable => {
                Err(HmvError::NetworkError("timed out".into()))
            }
            "/hmv/writeupz.php" if logged_in => Ok(state.writeups_html.clone()),
            _ => Ok(LOGGED_OUT_PAGE.to_string()),
        }
    }

    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        _timeout: Duration,
    ) -> Result<String> {
        let params: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.record("POST", url, params.clone())?;
        let logged_in = self.logged_in();
        let mut state = self.state.lock().unwrap();
        match url.path() {
            "/login/auth.php" => {
                let field = |name: &str| {
                    params
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                if field("admin") == state.username && field("password_usuario") == state.password
                {
                    state.tokens_issued += 1;
                    let token = format!("tok-{}", state.tokens_issued);
                    state.valid_token = Some(token.clone());
                    *self.token.lock().unwrap() = Some(token);
                    Ok("<html><a href=\"/logout.php\">Logout</a></html>".into())
                } else {
                    Ok("<html>Invalid user or password</html>".into())
                }
            }
            "/machines/checkflag.php" if logged_in => Ok(state.flag_reply.clone()),
            _ => Ok(LOGGED_OUT_PAGE.to_string()),
        }
    }

    async fn open_stream(&self, url: &Url, _timeout: Duration) -> Result<Box<dyn ChunkStream>> {
        self.record("GET", url, Vec::new())?;
        let state = self.state.lock().unwrap();
        match &state.archive {
            None => Err(HmvError::ErrorStatusCode {
                status_code: 404,
                url: url.to_string(),
            }),
            Some(bytes) => Ok(Box::new(FakeChunks {
                chunks: bytes.chunks(3).map(|c| c.to_vec()).collect(),
                served: 0,
                breaks_after: state.archive_breaks_after,
                length: bytes.len() as u64,
            })),
        }
    }

    fn export_session(&self) -> SessionHandle {
        let token = self.token.lock().unwrap().clone();
        SessionHandle {
            cookies: token
                .map(|value| {
                    vec![StoredCookie {
                        name: SESSION_COOKIE.into(),
                        value,
                    }]
                })
                .unwrap_or_default(),
            user_agent: USER_AGENT.into(),
            captured_at: Utc::now(),
        }
    }
}

struct FakeChunks {
    chunks: Vec<Vec<u8>>,
    served: usize,
    breaks_after: Option<usize>,
    length: u64,
}

#[async_trait]
impl ChunkStream for FakeChunks {
    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if Some(self.served) == self.breaks_after {
            return Err(HmvError::NetworkError("connection reset".into()));
        }
        let chunk = self.chunks.get(self.served).cloned();
        self.served += 1;
        Ok(chunk)
    }
}

/// Machine index markup. Rows are (name, border color, badge, creator); an
/// empty badge leaves the badge out.
pub fn machines_page(rows: &[(&str, &str, &str, &str)], total_pages: u32) -> String {
    let rows: String = rows
        .iter()
        .map(|(name, color, badge, creator)| {
            let badge = if badge.is_empty() {
                String::new()
            } else {
                format!("<span class=\"badge\">{badge}</span>")
            };
            format!(
                "<tr><td><div style=\"border-top: 5px solid {color};\"><h4 class=\"vmname\">{name}</h4></div>{badge}</td><td>{creator}</td></tr>"
            )
        })
        .collect();
    format!(
        r#"<html><body>
<div class="container-xxl"><div><div class="col-10"><div><div><div class="container">
<table class="mt-1 table table-striped table-dark"><tbody>{rows}</tbody></table>
<nav><ul><li><a>First</a></li><li><a>Prev</a></li><li><a>1</a></li><li><a>2</a></li><li><a>1/{total_pages}</a></li></ul></nav>
</div></div></div></div></div></div>
<a href="/logout.php">Logout</a>
</body></html>"#
    )
}

/// Writeup index markup. Rows are (machine, author, language, link).
pub fn writeups_page(rows: &[(&str, &str, &str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(machine, author, language, link)| {
            format!(
                "<tr><td><a href=\"/machines/machine.php?vm={machine}\">{machine}</a></td><td><a href=\"/profile/?user={author}\">{author}</a></td><td>{language}</td><td><a href=\"{link}\">Read</a></td></tr>"
            )
        })
        .collect();
    format!(
        "<html><body><table><tr><td>Machine</td><td>Author</td><td>Language</td><td>Writeup</td></tr>{rows}</table><a>Logout</a></body></html>"
    )
}
