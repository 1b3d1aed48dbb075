//! Session acquisition: restore, login or cookie import

use crate::api::models::{CurrentUserResponse, LoginResponse};
use crate::api::{build_http_client, ApiError};
use crate::config::ApiSettings;
use crate::crawler::{Backoff, RetryPolicy};
use crate::session::cookies::cookie_value;
use crate::session::{
    cookie_jar, load_cookie_file, parse_base_url, ApiRequest, Session, SessionJar, SessionState,
};
use crate::AuthError;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Username and password for a fresh login
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the session comes from
#[derive(Debug, Clone)]
pub enum LoginSource {
    /// Restore from the session file if possible, otherwise log in
    Credentials(Credentials),

    /// Import cookies exported from a browser
    CookieFile(PathBuf),
}

/// Establishes authenticated sessions
pub struct SessionManager {
    settings: ApiSettings,
    base_url: Url,
    retry: RetryPolicy,
}

impl SessionManager {
    /// Creates a session manager for the configured API
    pub fn new(settings: &ApiSettings) -> Result<Self, AuthError> {
        let base_url = parse_base_url(&settings.base_url)
            .map_err(|e| AuthError::Unexpected(format!("invalid base URL: {}", e)))?;

        Ok(Self {
            settings: settings.clone(),
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Sets the backoff used when session validation hits a transient failure
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Acquires a ready-to-use session
    ///
    /// # Flow
    ///
    /// 1. Credentials with an existing session file: load and validate it,
    ///    use it if it belongs to the same user
    /// 2. Credentials otherwise: log in with the password
    /// 3. Cookie file: import cookies and validate them
    /// 4. If a session file path was given and the session is new, persist it
    ///
    /// Persisting is best effort: a write failure is logged and the session is
    /// still returned.
    pub async fn acquire(
        &self,
        source: &LoginSource,
        session_file: Option<&Path>,
    ) -> Result<Session, AuthError> {
        let session = match source {
            LoginSource::Credentials(credentials) => {
                if let Some(path) = session_file {
                    if let Some(session) = self.restore(path, &credentials.username).await? {
                        return Ok(session);
                    }
                }
                tracing::info!("Logging in as {}", credentials.username);
                self.login(credentials).await?
            }
            LoginSource::CookieFile(path) => self.import_cookies(path).await?,
        };

        if let Some(path) = session_file {
            match session.persist(path) {
                Ok(()) => tracing::info!("Session saved to {}", path.display()),
                Err(e) => tracing::warn!("Could not save session: {}", e),
            }
        }

        Ok(session)
    }

    /// Builds a client that sends and fills `jar`
    fn client_for(&self, jar: Arc<SessionJar>) -> Result<Client, AuthError> {
        Ok(build_http_client(&self.settings, jar)?)
    }

    /// Tries to reuse a persisted session
    ///
    /// Returns `Ok(None)` when the stored session is unusable (no file, an
    /// unreadable file, missing cookies, rejected upstream or owned by another
    /// user), so the caller falls back to a fresh login. Challenges and an
    /// unreachable upstream are returned as errors: logging in again would not
    /// get past either.
    async fn restore(&self, path: &Path, username: &str) -> Result<Option<Session>, AuthError> {
        let state = match SessionState::load(path) {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!("No session file at {}, will log in fresh", path.display());
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file: {}", e);
                return Ok(None);
            }
        };

        let jar = Arc::new(SessionJar::new(state.cookie_store()));
        let client = self.client_for(jar.clone())?;
        let session = match Session::new(client, jar, self.base_url.clone(), state.username) {
            Ok(session) => session,
            Err(AuthError::MissingCookies(missing)) => {
                tracing::info!(
                    "Stored session lacks cookies {:?} (expired?), logging in fresh",
                    missing
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.validate(&session).await {
            Ok(current) if current.eq_ignore_ascii_case(username) => {
                tracing::info!("Restored session from {}", path.display());
                Ok(Some(session))
            }
            Ok(current) => {
                tracing::warn!(
                    "Session file {} belongs to {}, not {}; logging in fresh",
                    path.display(),
                    current,
                    username
                );
                Ok(None)
            }
            Err(AuthError::SessionRejected(reason)) => {
                tracing::info!("Stored session is no longer valid ({}), logging in fresh", reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Asks the upstream who the session belongs to
    ///
    /// Transient failures are retried with backoff. Returns the username on
    /// success.
    ///
    /// # Returns
    ///
    /// * `Err(AuthError::SessionRejected)` - Not logged in, or the cookies name another user id
    /// * `Err(AuthError::ChallengeRequired)` - The upstream wants a checkpoint flow
    /// * `Err(AuthError::Unavailable)` - Transient failures outlasted the retry budget
    /// * `Err(AuthError::Unexpected)` - Any other refusal or an unreadable response
    async fn validate(&self, session: &Session) -> Result<String, AuthError> {
        let mut backoff = Backoff::new(self.retry);

        loop {
            let response: Result<CurrentUserResponse, ApiError> = session
                .authenticated_fetch(ApiRequest::get("accounts/current_user/"))
                .await;

            let error = match response {
                Ok(current) => {
                    let user_id = current.user.pk.into_string();
                    if user_id != session.user_id() {
                        return Err(AuthError::SessionRejected(format!(
                            "cookies are for user id {} but upstream reports {}",
                            session.user_id(),
                            user_id
                        )));
                    }
                    return Ok(current.user.username);
                }
                Err(e) => e,
            };

            match error {
                ApiError::Unauthorized => {
                    return Err(AuthError::SessionRejected("not logged in".to_string()))
                }
                ApiError::Challenge {
                    message,
                    checkpoint_url,
                } => {
                    return Err(AuthError::ChallengeRequired {
                        message,
                        checkpoint_url,
                    })
                }
                e if e.is_transient() => match backoff.next_delay(e.retry_after()) {
                    Some(delay) => {
                        tracing::warn!("Session check failed ({}), retrying in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(AuthError::Unavailable(format!(
                            "{} (after {} attempts)",
                            e,
                            backoff.attempts()
                        )))
                    }
                },
                e => return Err(AuthError::Unexpected(format!("session check failed: {}", e))),
            }
        }
    }

    /// Performs a password login
    ///
    /// The login response's `Set-Cookie` headers land in a fresh jar, which
    /// becomes the session's jar.
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let url = self
            .base_url
            .join("accounts/login/")
            .map_err(|e| AuthError::Unexpected(e.to_string()))?;

        let jar = Arc::new(SessionJar::default());
        let client = self.client_for(jar.clone())?;
        let response = client
            .post(url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AuthError::Unexpected(format!(
                "login refused with HTTP {}; not retrying",
                status.as_u16()
            )));
        }

        let body: LoginResponse = serde_json::from_str(&text).map_err(|e| {
            AuthError::Unexpected(format!(
                "login returned HTTP {} with an unreadable body: {}",
                status.as_u16(),
                e
            ))
        })?;

        if body.is_challenge() {
            return Err(AuthError::ChallengeRequired {
                message: body
                    .message
                    .unwrap_or_else(|| "two-factor authentication required".to_string()),
                checkpoint_url: body.checkpoint_url,
            });
        }

        if !status.is_success() || !body.authenticated {
            return Err(AuthError::InvalidCredentials {
                username: credentials.username.clone(),
                message: body
                    .message
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            });
        }

        if let Some(user_id) = body.user_id {
            let mut store = jar.write();
            if cookie_value(&store, &self.base_url, "ds_user_id").is_none() {
                store
                    .parse(
                        &format!("ds_user_id={}; Path=/", user_id.into_string()),
                        &self.base_url,
                    )
                    .map_err(|e| AuthError::Unexpected(format!("cannot store user id: {}", e)))?;
            }
        }

        let session = Session::new(
            client,
            jar,
            self.base_url.clone(),
            Some(credentials.username.clone()),
        )?;
        tracing::info!("Logged in as {} (user id {})", credentials.username, session.user_id());
        Ok(session)
    }

    /// Builds a session from an exported cookie file and validates it
    async fn import_cookies(&self, path: &Path) -> Result<Session, AuthError> {
        let cookies = load_cookie_file(path, &self.settings.cookie_domain)?;
        tracing::debug!(
            "Read cookies from {}: {:?}",
            path.display(),
            cookies.keys().collect::<Vec<_>>()
        );

        let jar = Arc::new(SessionJar::new(cookie_jar(&cookies, &self.base_url)?));
        let client = self.client_for(jar.clone())?;
        let mut session = Session::new(client, jar, self.base_url.clone(), None)?;
        let username = self.validate(&session).await?;

        tracing::info!(
            "Loaded session from {} (user {}, id {})",
            path.display(),
            username,
            session.user_id()
        );
        session.username = Some(username);
        Ok(session)
    }
}
