use crate::errors::{HmvError, Result};
use crate::session::SessionHandle;
use crate::Endpoints;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The site gates on a desktop browser user agent.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One HTTP client together with its cookie jar.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GETs `url` and returns the body of the final (post-redirect) response.
    async fn get(&self, url: &Url, query: &[(&str, String)], timeout: Duration) -> Result<String>;

    /// POSTs an urlencoded form, following redirects.
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String>;

    /// Starts a streamed GET. Error statuses are reported here, before any
    /// body is read. `timeout` bounds the connect and every chunk read.
    async fn open_stream(&self, url: &Url, timeout: Duration) -> Result<Box<dyn ChunkStream>>;

    /// Snapshot of the cookies and headers needed to resume this client later.
    fn export_session(&self) -> SessionHandle;
}

#[async_trait]
pub trait ChunkStream: Send {
    /// Announced body length, if any.
    fn content_length(&self) -> Option<u64>;
    /// `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Builds transports, optionally resuming a saved session.
pub trait Connector: Send + Sync {
    type Client: Transport;

    fn connect(&self, session: Option<&SessionHandle>) -> Result<Self::Client>;
}

#[derive(Debug, Clone)]
pub struct HttpConnector {
    cookie_url: Url,
}

impl HttpConnector {
    pub fn new(endpoints: &Endpoints) -> Self {
        HttpConnector {
            cookie_url: endpoints.base.clone(),
        }
    }
}

impl Connector for HttpConnector {
    type Client = HttpClient;

    #[tracing::instrument(skip(session))]
    fn connect(&self, session: Option<&SessionHandle>) -> Result<HttpClient> {
        let jar = Arc::new(Jar::default());
        let user_agent = match session {
            Some(s) => {
                for cookie in s.cookies.iter() {
                    jar.add_cookie_str(&format!("{}={}", cookie.name, cookie.value), &self.cookie_url);
                }
                tracing::debug!("Resuming session captured at {}", s.captured_at);
                s.user_agent.clone()
            }
            None => USER_AGENT.to_string(),
        };
        let client = Client::builder()
            .user_agent(user_agent.clone())
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| HmvError::NetworkError(format!("failed to build HTTP client. {e}")))?;
        Ok(HttpClient {
            client,
            jar,
            cookie_url: self.cookie_url.clone(),
            user_agent,
        })
    }
}

pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
    cookie_url: Url,
    user_agent: String,
}

#[async_trait]
impl Transport for HttpClient {
    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &Url, query: &[(&str, String)], timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("GET {} => {}", response.url(), response.status());
        Ok(response.text().await?)
    }

    #[tracing::instrument(skip(self, form))]
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String> {
        let response = self
            .client
            .post(url.clone())
            .form(form)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("POST {} => {}", response.url(), response.status());
        Ok(response.text().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn open_stream(&self, url: &Url, timeout: Duration) -> Result<Box<dyn ChunkStream>> {
        let response = match tokio::time::timeout(timeout, self.client.get(url.clone()).send()).await
        {
            Err(_) => {
                return Err(HmvError::NetworkError(format!(
                    "request timed out. {url}"
                )))
            }
            Ok(r) => r?,
        };
        let response = response.error_for_status()?;
        Ok(Box::new(ResponseChunks { response, timeout }))
    }

    fn export_session(&self) -> SessionHandle {
        let cookies = self
            .jar
            .cookies(&self.cookie_url)
            .and_then(|header| header.to_str().map(SessionHandle::parse_cookie_header).ok())
            .unwrap_or_default();
        SessionHandle {
            cookies,
            user_agent: self.user_agent.clone(),
            captured_at: Utc::now(),
        }
    }
}

struct ResponseChunks {
    response: reqwest::Response,
    timeout: Duration,
}

#[async_trait]
impl ChunkStream for ResponseChunks {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(self.timeout, self.response.chunk()).await {
            Err(_) => Err(HmvError::NetworkError(format!(
                "timed out reading from {}",
                self.response.url()
            ))),
            Ok(chunk) => Ok(chunk?.map(|bytes| bytes.to_vec())),
        }
    }
}
