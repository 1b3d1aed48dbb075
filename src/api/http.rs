//! HTTP client construction and response classification
//!
//! # Status Mapping
//!
//! | Condition | Result |
//! |-----------|--------|
//! | HTTP 2xx | Success |
//! | HTTP 400 + two-factor / checkpoint fields | Challenge |
//! | HTTP 400 + `login_required` | Unauthorized |
//! | HTTP 400 + "wait a few minutes" | Transient |
//! | Other HTTP 400 | Blocked |
//! | HTTP 401 | Unauthorized |
//! | HTTP 403 | Blocked |
//! | HTTP 404 | NotFound |
//! | HTTP 429 | Transient (honors Retry-After) |
//! | HTTP 5xx | Transient (honors Retry-After) |

use crate::api::models::ErrorBody;
use crate::api::ApiError;
use crate::config::ApiSettings;
use crate::session::SessionJar;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Builds an HTTP client with the configured user agent and timeouts
///
/// # Arguments
///
/// * `settings` - The API settings
/// * `jar` - Cookie jar the client sends from and stores `Set-Cookie` into
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    settings: &ApiSettings,
    jar: Arc<SessionJar>,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .cookie_provider(jar)
        .user_agent(settings.user_agent.clone())
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Classifies a non-success response
///
/// # Arguments
///
/// * `status` - The HTTP status code
/// * `retry_after` - Parsed `Retry-After` header, if any
/// * `body` - The response body (may be empty or non-JSON)
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ApiError {
    let error_body: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = error_body
        .message
        .clone()
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status {
        StatusCode::BAD_REQUEST => {
            if error_body.is_challenge() {
                ApiError::Challenge {
                    message,
                    checkpoint_url: error_body.checkpoint_url,
                }
            } else if message.contains("login_required") {
                ApiError::Unauthorized
            } else if message.to_lowercase().contains("wait a few minutes") {
                ApiError::Transient {
                    message,
                    retry_after: retry_after.or(Some(Duration::from_secs(60))),
                }
            } else {
                ApiError::Blocked(message)
            }
        }
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Blocked(message),
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ApiError::Transient {
            message: format!("rate limited: {}", message),
            retry_after,
        },
        s if s.is_server_error() => ApiError::Transient {
            message,
            retry_after,
        },
        _ => ApiError::Blocked(message),
    }
}

/// Parses a `Retry-After` header given in seconds
///
/// HTTP-date values are ignored; the exponential backoff applies instead.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
