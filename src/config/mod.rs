//! Configuration module for the hashtag crawler
//!
//! This module handles loading, parsing, and validating the optional TOML
//! settings file, and turning settings into the immutable `CrawlConfig` a run
//! is driven by.
//!
//! # Example
//!
//! ```no_run
//! use hashtag_crawler::config::{load_settings, CrawlConfig};
//! use std::path::Path;
//!
//! let settings = load_settings(Path::new("crawler.toml")).unwrap();
//! let config = CrawlConfig::from_settings(&settings);
//! println!("Collecting at most {} posts per target", config.max_posts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiSettings, CrawlConfig, CrawlSettings, OutputSettings, RetrySettings, Settings};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_settings, load_settings_with_hash};
pub use validation::{validate, validate_crawl_config};
