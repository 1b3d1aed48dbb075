//! Authenticated session handling
//!
//! This module establishes and persists the authenticated session the crawl
//! runs on:
//! - `SessionManager::acquire` logs in, restores a session file or imports cookies
//! - `Session` is the opaque handle the crawl engine fetches through
//! - `SessionState` is what gets written to a session file

mod cookies;
mod manager;
mod store;

pub use cookies::{cookie_jar, load_cookie_file, parse_cookies, SessionJar, REQUIRED_COOKIES};
pub use manager::{Credentials, LoginSource, SessionManager};
pub use store::SessionState;

use crate::api::{classify_status, parse_retry_after, ApiError};
use crate::AuthError;
use cookies::{cookie_value, missing_cookies};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// HTTP method of an API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the API base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl ApiRequest {
    /// Creates a GET request for `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    /// Creates a POST request for `path`
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    /// Adds a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a form field (POST only)
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }
}

/// Opaque authenticated session
///
/// Shared by every paginator of a run. The client sends and updates the
/// cookie jar on every request, so cookies the upstream rotates mid-run are
/// picked up and persisted. The validity flag flips to false on logout or
/// when the upstream reports that the session expired.
pub struct Session {
    client: Client,
    jar: Arc<SessionJar>,
    base_url: Url,
    user_id: String,
    username: Option<String>,
    valid: AtomicBool,
}

impl Session {
    /// Wraps a client and the jar it was built with
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - The jar holds every required cookie for `base_url`
    /// * `Err(AuthError::MissingCookies)` - Some required cookies are absent
    pub(crate) fn new(
        client: Client,
        jar: Arc<SessionJar>,
        base_url: Url,
        username: Option<String>,
    ) -> Result<Self, AuthError> {
        let user_id = {
            let store = jar.read();
            let missing = missing_cookies(&store, &base_url);
            if !missing.is_empty() {
                return Err(AuthError::MissingCookies(missing));
            }
            cookie_value(&store, &base_url, "ds_user_id").unwrap_or_default()
        };

        Ok(Self {
            client,
            jar,
            base_url,
            user_id,
            username,
            valid: AtomicBool::new(true),
        })
    }

    /// Returns true until logout or an upstream-reported expiry
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Returns the id of the logged-in user
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the username, when known
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the current value of cookie `name`
    pub fn cookie(&self, name: &str) -> Option<String> {
        let store = self.jar.read();
        cookie_value(&store, &self.base_url, name)
    }

    /// Snapshots the session for persisting
    pub fn state(&self) -> Result<SessionState, AuthError> {
        let store = self.jar.read();
        SessionState::capture(&store, &self.base_url, self.username.clone())
    }

    /// Sends an authenticated request and decodes the JSON response
    ///
    /// Non-success statuses are classified into `ApiError` variants. An
    /// `Unauthorized` response also invalidates the session.
    pub async fn authenticated_fetch<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ApiError> {
        if !self.is_valid() {
            return Err(ApiError::Unauthorized);
        }

        let url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Decode(format!("invalid request path {}: {}", request.path, e)))?;

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).form(&request.form),
        };

        let mut builder = builder.query(&request.query);
        if let Some(csrf) = self.cookie("csrftoken") {
            builder = builder.header("X-CSRFToken", csrf);
        }

        let response = builder.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.map_err(ApiError::from_reqwest)?;

        if !status.is_success() {
            let error = classify_status(status, retry_after, &body);
            if error == ApiError::Unauthorized {
                tracing::warn!("Upstream reported the session as expired");
                self.invalidate();
            }
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Writes the session to `path` so later runs can skip the login
    pub fn persist(&self, path: &Path) -> Result<(), AuthError> {
        self.state()?.save(path)
    }

    /// Logs out upstream (best effort) and invalidates the session
    pub async fn logout(&self) {
        if self.is_valid() {
            let result: Result<serde_json::Value, ApiError> = self
                .authenticated_fetch(ApiRequest::post("accounts/logout/"))
                .await;
            if let Err(e) = result {
                tracing::debug!("Logout request failed: {}", e);
            }
        }
        self.invalidate();
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Parses a base URL, making sure relative joins keep its path
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{}/", raw))
    }
}
