use crate::config::{ConfigStore, Credentials};
use crate::errors::{HmvError, Result};
use crate::session::{SessionHandle, SessionStore};
use crate::transport::{Connector, Transport};
use crate::{Endpoints, Notifier, REQUEST_TIMEOUT, SUCCESS_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// A saved session passed the probe
    Reused,
    /// A fresh login was performed
    LoggedIn,
}

pub struct Authenticated<T> {
    pub client: T,
    pub origin: SessionOrigin,
}

/// Logs `client` in and, on success, saves its session. A failed save is
/// reported but does not fail the login.
#[tracing::instrument(skip(client, credentials, sessions, notifier), fields(username = %credentials.username))]
pub async fn login<T: Transport>(
    client: &T,
    endpoints: &Endpoints,
    credentials: &Credentials,
    sessions: &dyn SessionStore,
    notifier: &Notifier,
) -> Result<()> {
    let form = [
        ("admin", credentials.username.as_str()),
        ("password_usuario", credentials.password.as_str()),
    ];
    let body = match client
        .post_form(&endpoints.login_url()?, &form, REQUEST_TIMEOUT)
        .await
    {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Login request failed\nError : {}", e);
            return Err(HmvError::AuthenticationError(e.to_string()));
        }
    };
    if !body.contains(SUCCESS_MARKER) {
        tracing::warn!("Login response did not contain the logged-in marker");
        return Err(HmvError::InvalidCredentials);
    }
    notifier.success("Login successful.");

    match sessions.save(&client.export_session()) {
        Ok(()) => notifier.success("Session saved."),
        Err(e) => {
            tracing::error!("Error saving session\nError : {}", e);
            notifier.error(format!("Error saving session: {e}"));
        }
    }
    Ok(())
}

/// Hands out one authenticated client per invocation, reusing the saved
/// session when the site still accepts it.
pub struct SessionProvider<'a, C: Connector> {
    pub endpoints: &'a Endpoints,
    pub connector: &'a C,
    config: &'a dyn ConfigStore,
    sessions: &'a dyn SessionStore,
    notifier: Notifier,
}

impl<'a, C: Connector> SessionProvider<'a, C> {
    pub fn new(
        endpoints: &'a Endpoints,
        connector: &'a C,
        config: &'a dyn ConfigStore,
        sessions: &'a dyn SessionStore,
        notifier: Notifier,
    ) -> Self {
        SessionProvider {
            endpoints,
            connector,
            config,
            sessions,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// 1. Without stored credentials nothing is attempted.
    /// 2. A saved session is probed and returned untouched if the site still
    ///    renders the logged-in page for it.
    /// 3. Otherwise (rejected, unreadable or unreachable) exactly one fresh
    ///    login is made, which also replaces the saved session.
    pub async fn authenticated_client(&self) -> Result<Authenticated<C::Client>> {
        let credentials = self.config.load().ok_or(HmvError::ConfigMissing)?;

        if let Some(saved) = self.sessions.load() {
            match self.probe(&saved).await {
                Ok(Some(client)) => {
                    self.notifier.success("Using saved session.");
                    return Ok(Authenticated {
                        client,
                        origin: SessionOrigin::Reused,
                    });
                }
                Ok(None) => tracing::info!("Saved session was rejected by the site"),
                Err(e) => tracing::warn!("Probing saved session failed\nError : {}", e),
            }
            self.notifier
                .warning("Saved session invalid, re-authenticating...");
        }

        let client = self.connector.connect(None)?;
        login(
            &client,
            self.endpoints,
            &credentials,
            self.sessions,
            &self.notifier,
        )
        .await?;
        Ok(Authenticated {
            client,
            origin: SessionOrigin::LoggedIn,
        })
    }

    /// `Ok(None)` when the site answered without the logged-in marker.
    #[tracing::instrument(skip(self, saved))]
    async fn probe(&self, saved: &SessionHandle) -> Result<Option<C::Client>> {
        let client = self.connector.connect(Some(saved))?;
        let body = client
            .get(&self.endpoints.machines_url()?, &[], REQUEST_TIMEOUT)
            .await?;
        Ok(body.contains(SUCCESS_MARKER).then_some(client))
    }
}
