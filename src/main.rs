//! Hashtag crawler main entry point
//!
//! This is the command-line interface for the hashtag crawler.

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use hashtag_crawler::config::{load_settings_with_hash, validate_crawl_config, CrawlConfig, Settings};
use hashtag_crawler::crawler::{run_batch, CancelHandle, CrawlDriver};
use hashtag_crawler::model::{parse_target_list, Target};
use hashtag_crawler::output::{print_summary, JsonFileSink};
use hashtag_crawler::session::{Credentials, LoginSource, SessionManager};
use hashtag_crawler::{AuthError, CrawlError, RunError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Hashtag crawler: collects posts for hashtags and hashtag AND-groups
///
/// Every target is written to its own JSON file in the output directory,
/// named after its tags (`food.json`, `food_AND_pizza.json`).
#[derive(Parser, Debug)]
#[command(name = "hashtag-crawler")]
#[command(version)]
#[command(about = "Collect posts for hashtags", long_about = None)]
struct Cli {
    /// Account username
    #[arg(short, long, requires = "password", conflicts_with = "cookie_file")]
    username: Option<String>,

    /// Account password
    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Exported browser cookie file (Netscape cookies.txt or JSON)
    #[arg(long, value_name = "FILE")]
    cookie_file: Option<PathBuf>,

    /// Hashtag to crawl; `food+pizza` is an AND-group (repeatable)
    #[arg(short, long = "target", value_name = "TAG")]
    targets: Vec<String>,

    /// File with one target per line
    #[arg(short = 'f', long, value_name = "FILE")]
    targetfile: Option<PathBuf>,

    /// Combine all -t hashtags into a single AND-group
    #[arg(long)]
    and: bool,

    /// Directory for output data
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Maximum posts written per target
    #[arg(long)]
    max_posts: Option<usize>,

    /// Fewer posts than this flags a target as insufficient
    #[arg(long)]
    min_posts: Option<usize>,

    /// Only collect posts newer than this (unix seconds or RFC 3339)
    #[arg(long, value_parser = parse_since)]
    since: Option<DateTime<Utc>>,

    /// Session file to restore from and save to
    #[arg(long, value_name = "FILE")]
    session_file: Option<PathBuf>,

    /// Path to TOML settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip targets whose output file already exists (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Crawl every target again, overwriting existing output
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Log out upstream after the run
    #[arg(long)]
    logout: bool,

    /// Validate settings and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match handle_crawl(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("hashtag_crawler=info,warn"),
            1 => EnvFilter::new("hashtag_crawler=debug,info"),
            2 => EnvFilter::new("hashtag_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Maps a failed run to the process exit code
///
/// 1 usage or settings, 2 authentication, 3 challenge, 4 fetch failure,
/// 130 cancelled.
fn exit_status(error: &anyhow::Error) -> u8 {
    let crawl_error = error
        .downcast_ref::<CrawlError>()
        .or_else(|| error.downcast_ref::<RunError>().map(|e| &e.source));

    match crawl_error {
        Some(CrawlError::Auth(e)) if e.is_challenge() => 3,
        Some(CrawlError::Auth(AuthError::Unavailable(_))) => 4,
        Some(CrawlError::Auth(_)) => 2,
        Some(CrawlError::Fetch { .. }) | Some(CrawlError::TargetUnavailable { .. }) => 4,
        Some(CrawlError::Cancelled { .. }) => 130,
        _ => 1,
    }
}

/// Parses `--since` as unix seconds or an RFC 3339 timestamp
fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(seconds) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| format!("timestamp out of range: {}", seconds));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected unix seconds or RFC 3339, got '{}': {}", raw, e))
}

/// Loads the settings file, or defaults when none was given
fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    tracing::info!("Loading settings from: {}", path.display());
    let (settings, hash) = load_settings_with_hash(path)
        .map_err(CrawlError::from)
        .with_context(|| format!("cannot load settings from {}", path.display()))?;
    tracing::info!("Settings loaded successfully (hash: {})", hash);
    Ok(settings)
}

/// Applies command-line overrides on top of the settings file
fn build_config(cli: &Cli, settings: &Settings) -> Result<CrawlConfig, CrawlError> {
    let mut config = CrawlConfig::from_settings(settings).with_since(cli.since);

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(max_posts) = cli.max_posts {
        config.max_posts = max_posts;
    }
    if let Some(min_posts) = cli.min_posts {
        config.min_posts = min_posts;
    }
    if let Some(path) = &cli.session_file {
        config.session_file = Some(path.clone());
    }

    validate_crawl_config(&config)?;
    Ok(config)
}

/// Collects targets from `-t` flags and the target file
fn resolve_targets(cli: &Cli) -> anyhow::Result<Vec<Target>> {
    let mut targets = Vec::new();

    if cli.and && !cli.targets.is_empty() {
        targets.push(Target::parse(&cli.targets.join(" "))?);
    } else {
        for raw in &cli.targets {
            targets.push(Target::parse(raw)?);
        }
    }

    if let Some(path) = &cli.targetfile {
        let content = std::fs::read_to_string(path)
            .map_err(CrawlError::from)
            .with_context(|| format!("cannot read target file {}", path.display()))?;
        for target in parse_target_list(&content)? {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    if targets.is_empty() {
        return Err(CrawlError::InvalidTarget(
            "provide a hashtag with -t or a file of hashtags with -f".to_string(),
        )
        .into());
    }

    Ok(targets)
}

/// Picks the session source from the command line
fn login_source(cli: &Cli) -> anyhow::Result<LoginSource> {
    match (&cli.username, &cli.password, &cli.cookie_file) {
        (Some(username), Some(password), _) => Ok(LoginSource::Credentials(Credentials::new(
            username.clone(),
            password.clone(),
        ))),
        (_, _, Some(path)) => Ok(LoginSource::CookieFile(path.clone())),
        _ => anyhow::bail!("provide --username and --password, or --cookie-file"),
    }
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(settings: &Settings, config: &CrawlConfig, targets: &[Target]) {
    println!("=== Hashtag Crawler Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", settings.api.base_url);
    println!("  User agent: {}", settings.api.user_agent);

    println!("\nCrawl:");
    println!("  Posts per target: {} to {}", config.min_posts, config.max_posts);
    println!("  Scan limit per hashtag: {}", config.scan_limit());
    println!("  Images only: {}", config.images_only);
    if let Some(since) = config.since {
        println!("  Since: {}", since.to_rfc3339());
    }
    println!("  Retries: {}", config.retry.max_retries);

    println!("\nOutput:");
    println!("  Directory: {}", config.output_dir.display());
    if let Some(path) = &config.session_file {
        println!("  Session file: {}", path.display());
    }

    println!("\nTargets ({}):", targets.len());
    for target in targets {
        println!("  - {} -> {}.json", target, target.key());
    }

    println!("\n✓ Settings are valid");
}

/// Handles the main crawl operation
async fn handle_crawl(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = load_settings(cli.config.as_deref())?;
    let config = build_config(&cli, &settings)?;
    let targets = resolve_targets(&cli)?;

    if cli.dry_run {
        handle_dry_run(&settings, &config, &targets);
        return Ok(ExitCode::SUCCESS);
    }

    let source = login_source(&cli)?;
    let resume = !cli.fresh;
    if resume {
        tracing::info!("Resuming: targets with existing output are skipped");
    } else {
        tracing::info!("Fresh run: existing output is overwritten");
    }
    tracing::info!("Targets: {}", targets.len());

    let manager = SessionManager::new(&settings.api)
        .map_err(CrawlError::from)?
        .with_retry(settings.retry.policy());
    let session = Arc::new(
        manager
            .acquire(&source, config.session_file.as_deref())
            .await
            .map_err(CrawlError::from)?,
    );

    let cancel = CancelHandle::new();
    let token = cancel.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current request");
            cancel.cancel();
        }
    });

    let sink = JsonFileSink::new(&config.output_dir).map_err(CrawlError::from)?;
    let session_file = config.session_file.clone();
    let driver = CrawlDriver::for_session(session.clone(), config);

    let result = run_batch(&driver, &targets, &sink, resume, &token).await;

    if cli.logout {
        session.logout().await;
        tracing::info!("Logged out");
    } else if let Some(path) = session_file.as_deref() {
        if session.is_valid() {
            if let Err(e) = session.persist(path) {
                tracing::warn!("Could not save refreshed session: {}", e);
            }
        }
    }

    let summary = result?;
    if !cli.quiet {
        print_summary(&summary);
    }

    if summary.failed() > 0 {
        Ok(ExitCode::from(4))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
