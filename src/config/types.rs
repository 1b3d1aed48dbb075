use crate::crawler::{RetryPolicy, StreamOptions};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Settings file structure
///
/// Every section is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub crawl: CrawlSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Base URL all endpoints are resolved against
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cookie domain kept when importing a cookie file
    #[serde(rename = "cookie-domain", default = "default_cookie_domain")]
    pub cookie_domain: String,
}

/// Retry and backoff configuration for transient failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first failed attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds); doubles on each retry
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the computed backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Crawl bounds and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    /// Fewer posts than this flags a target as insufficient
    #[serde(rename = "min-posts", default = "default_min_posts")]
    pub min_posts: usize,

    /// Maximum posts written per target
    #[serde(rename = "max-posts", default = "default_max_posts")]
    pub max_posts: usize,

    /// Maximum posts explored per hashtag feed (defaults to max-posts)
    #[serde(rename = "scan-limit", default)]
    pub scan_limit: Option<usize>,

    /// Only collect single-image posts
    #[serde(rename = "images-only", default = "default_images_only")]
    pub images_only: bool,

    /// Pause between page fetches of one feed (milliseconds)
    #[serde(rename = "page-delay-ms", default)]
    pub page_delay_ms: u64,

    /// Pause before each profile lookup (milliseconds)
    #[serde(rename = "profile-delay-ms", default = "default_profile_delay_ms")]
    pub profile_delay_ms: u64,

    /// Abort a single target's crawl after this many seconds
    #[serde(rename = "run-timeout-secs", default)]
    pub run_timeout_secs: Option<u64>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// Directory the per-target JSON files are written to
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: String,

    /// Path of the session file to load and save
    #[serde(rename = "session-file", default)]
    pub session_file: Option<String>,
}

fn default_base_url() -> String {
    "https://i.instagram.com/api/v1/".to_string()
}

fn default_user_agent() -> String {
    format!("hashtag-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cookie_domain() -> String {
    "instagram.com".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_min_posts() -> usize {
    1
}

fn default_max_posts() -> usize {
    100
}

fn default_images_only() -> bool {
    true
}

fn default_profile_delay_ms() -> u64 {
    50
}

fn default_output_dir() -> String {
    "./hashtags".to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            cookie_domain: default_cookie_domain(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            min_posts: default_min_posts(),
            max_posts: default_max_posts(),
            scan_limit: None,
            images_only: default_images_only(),
            page_delay_ms: 0,
            profile_delay_ms: default_profile_delay_ms(),
            run_timeout_secs: None,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            session_file: None,
        }
    }
}

impl RetrySettings {
    /// Converts the settings into a retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Immutable configuration of one crawl run
///
/// Built once from settings and command-line overrides, then passed by
/// reference into the crawl driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlConfig {
    pub output_dir: PathBuf,
    pub session_file: Option<PathBuf>,
    pub min_posts: usize,
    pub max_posts: usize,
    pub scan_limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub images_only: bool,
    pub page_delay: Duration,
    pub profile_delay: Duration,
    pub run_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl CrawlConfig {
    /// Creates a configuration with default settings and the given output directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::from_settings(&Settings::default());
        config.output_dir = output_dir.into();
        config
    }

    /// Builds the run configuration from a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let crawl = &settings.crawl;
        Self {
            output_dir: PathBuf::from(&settings.output.output_dir),
            session_file: settings.output.session_file.as_ref().map(PathBuf::from),
            min_posts: crawl.min_posts,
            max_posts: crawl.max_posts,
            scan_limit: crawl.scan_limit,
            since: None,
            images_only: crawl.images_only,
            page_delay: Duration::from_millis(crawl.page_delay_ms),
            profile_delay: Duration::from_millis(crawl.profile_delay_ms),
            run_timeout: crawl.run_timeout_secs.map(Duration::from_secs),
            retry: settings.retry.policy(),
        }
    }

    pub fn with_posts(mut self, min_posts: usize, max_posts: usize) -> Self {
        self.min_posts = min_posts;
        self.max_posts = max_posts;
        self
    }

    pub fn with_since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_images_only(mut self, images_only: bool) -> Self {
        self.images_only = images_only;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_profile_delay(mut self, profile_delay: Duration) -> Self {
        self.profile_delay = profile_delay;
        self
    }

    /// Maximum posts explored per hashtag feed
    pub fn scan_limit(&self) -> usize {
        self.scan_limit.unwrap_or(self.max_posts)
    }

    /// Paginator options derived from this configuration
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            max_items: self.scan_limit(),
            since: self.since,
            images_only: self.images_only,
            page_delay: self.page_delay,
            retry: self.retry,
        }
    }
}
