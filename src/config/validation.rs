use crate::config::types::{ApiSettings, CrawlConfig, CrawlSettings, RetrySettings, Settings};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire settings file
pub fn validate(settings: &Settings) -> ConfigResult<()> {
    validate_api_settings(&settings.api)?;
    validate_retry_settings(&settings.retry)?;
    validate_crawl_settings(&settings.crawl)?;

    if settings.output.output_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a run configuration after command-line overrides were applied
pub fn validate_crawl_config(config: &CrawlConfig) -> ConfigResult<()> {
    validate_post_bounds(config.min_posts, config.max_posts)?;

    if config.scan_limit == Some(0) {
        return Err(ConfigError::Validation(
            "scan-limit must be >= 1".to_string(),
        ));
    }

    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_api_settings(api: &ApiSettings) -> ConfigResult<()> {
    let url = Url::parse(&api.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", api.base_url, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if api.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if api.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if api.cookie_domain.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cookie-domain cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_settings(retry: &RetrySettings) -> ConfigResult<()> {
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) must not exceed max-delay-ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_crawl_settings(crawl: &CrawlSettings) -> ConfigResult<()> {
    validate_post_bounds(crawl.min_posts, crawl.max_posts)?;

    if crawl.scan_limit == Some(0) {
        return Err(ConfigError::Validation(
            "scan-limit must be >= 1".to_string(),
        ));
    }

    if crawl.run_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "run-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_post_bounds(min_posts: usize, max_posts: usize) -> ConfigResult<()> {
    if max_posts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-posts must be >= 1, got {}",
            max_posts
        )));
    }

    if min_posts > max_posts {
        return Err(ConfigError::Validation(format!(
            "min-posts ({}) must not exceed max-posts ({})",
            min_posts, max_posts
        )));
    }

    Ok(())
}
