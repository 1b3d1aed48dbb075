//! Session file persistence

use crate::session::cookies::{cookie_jar, cookie_value, missing_cookies};
use crate::AuthError;
use chrono::{DateTime, Utc};
use cookie_store::{Cookie, CookieStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use url::Url;

/// Persistable part of a session: who is logged in and the cookie jar
///
/// Cookies keep their domain, path and expiry, so a restored jar sends
/// exactly what the upstream set.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub username: Option<String>,
    pub user_id: String,
    pub cookies: Vec<Cookie<'static>>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Builds a session state from plain `name=value` auth cookies
    ///
    /// # Returns
    ///
    /// * `Ok(SessionState)` - All required cookies are present
    /// * `Err(AuthError::MissingCookies)` - Some required cookies are absent or empty
    pub fn from_cookies(
        cookies: BTreeMap<String, String>,
        base_url: &Url,
        username: Option<String>,
    ) -> Result<Self, AuthError> {
        let store = cookie_jar(&cookies, base_url)?;
        Self::capture(&store, base_url, username)
    }

    /// Snapshots the unexpired cookies of a jar
    pub fn capture(
        store: &CookieStore,
        base_url: &Url,
        username: Option<String>,
    ) -> Result<Self, AuthError> {
        let missing = missing_cookies(store, base_url);
        if !missing.is_empty() {
            return Err(AuthError::MissingCookies(missing));
        }

        let user_id = cookie_value(store, base_url, "ds_user_id").unwrap_or_default();
        Ok(Self {
            username,
            user_id,
            cookies: store.iter_unexpired().cloned().collect(),
            saved_at: None,
        })
    }

    /// Rebuilds the cookie jar, dropping cookies that expired since saving
    pub fn cookie_store(&self) -> CookieStore {
        let cookies = self.cookies.iter().cloned().map(Ok::<_, Infallible>);
        match CookieStore::from_cookies(cookies, false) {
            Ok(store) => store,
            Err(never) => match never {},
        }
    }

    /// Returns the value of cookie `name`, if stored
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value())
    }

    /// Loads a session file
    ///
    /// # Returns
    ///
    /// * `Ok(Some(SessionState))` - The file exists and parsed
    /// * `Ok(None)` - There is no file at `path`
    /// * `Err(AuthError::SessionFile)` - The file could not be read or parsed
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::SessionFile(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let state: Self = serde_json::from_str(&content).map_err(|e| {
            AuthError::SessionFile(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// Writes the session file
    ///
    /// The file is created, written, flushed and closed before this returns.
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        let to_error =
            |e: std::io::Error| AuthError::SessionFile(format!("cannot write {}: {}", path.display(), e));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_error)?;
        }

        let stamped = Self {
            saved_at: Some(Utc::now()),
            ..self.clone()
        };

        let file = File::create(path).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &stamped)
            .map_err(|e| AuthError::SessionFile(format!("cannot encode session: {}", e)))?;
        writer.flush().map_err(to_error)?;

        tracing::debug!("Session saved to {}", path.display());
        Ok(())
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field(
                "cookies",
                &self.cookies.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("saved_at", &self.saved_at)
            .finish()
    }
}
