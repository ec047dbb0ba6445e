use anyhow::{Context, Result};
use clap::Parser;
use reqwest::redirect::Policy;
use std::path::PathBuf;
use std::time::Duration;

use stablefeed::config::{Config, FeedConfig};
use stablefeed::extract::gather;
use stablefeed::feed::{self, PipelineError, RunOutcome, Source};
use stablefeed::storage::FileFeedStore;

#[derive(Parser, Debug)]
#[command(
    name = "stablefeed",
    about = "Publish RSS feeds from scraped listings, rewriting them only when items change"
)]
struct Args {
    /// Feeds configuration file
    #[arg(long, value_name = "FILE", default_value = "feeds.toml")]
    config: PathBuf,

    /// Only process the named feed (repeatable)
    #[arg(long = "feed", value_name = "NAME")]
    feeds: Vec<String>,

    /// Decide and report, but never write
    #[arg(long)]
    dry_run: bool,
}

/// How one feed's run ended, for the exit status.
enum FeedStatus {
    Done,
    /// Configuration or write failure: the published document did not move.
    Failed,
}

/// Redirect policy for extractor requests.
///
/// - Limits redirects to 3 hops maximum
/// - Detects redirect loops (same URL appearing twice in chain)
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    let timezone = config.timezone_offset().context("Invalid timezone")?;

    if config.feeds.is_empty() {
        eprintln!("No feeds configured in {}", args.config.display());
        return Ok(());
    }

    for name in &args.feeds {
        if !config.feeds.iter().any(|f| &f.name == name) {
            anyhow::bail!("No feed named '{}' in {}", name, args.config.display());
        }
    }

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(create_redirect_policy())
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    let selected = config
        .feeds
        .iter()
        .filter(|f| args.feeds.is_empty() || args.feeds.contains(&f.name));

    // One in-flight pipeline per feed: feeds run strictly one after another.
    let mut failed = Vec::new();
    for feed_config in selected {
        let status = process_feed(&config, feed_config, &client, timezone, args.dry_run).await;
        if let FeedStatus::Failed = status {
            failed.push(feed_config.name.as_str());
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Feed update(s) did not land: {}", failed.join(", "));
    }
    Ok(())
}

async fn process_feed(
    config: &Config,
    feed_config: &FeedConfig,
    client: &reqwest::Client,
    timezone: chrono::FixedOffset,
    dry_run: bool,
) -> FeedStatus {
    let name = feed_config.name.as_str();

    let extractors = match feed_config
        .validate()
        .and_then(|()| feed_config.extractors(client))
    {
        Ok(extractors) => extractors,
        Err(e) => {
            tracing::error!(feed = %name, error = %e, "Feed skipped");
            eprintln!("{name}: {e}");
            return FeedStatus::Failed;
        }
    };

    let gathered = gather(&extractors, &config.gather_options()).await;
    for (_, report) in &gathered {
        if let Err(e) = &report.result {
            eprintln!("{name}: source {} failed: {e}", report.name);
        }
    }
    let sources: Vec<Source> = gathered.into_iter().map(|(source, _)| source).collect();

    let store = FileFeedStore::new(&feed_config.output);
    let channel = feed_config.channel();
    let options = feed_config.pipeline_options(timezone);

    let outcome = if dry_run {
        Ok(feed::plan(&store, &sources, &channel, &options))
    } else {
        feed::publish(&store, &sources, &channel, &options)
    };

    match outcome {
        Ok(outcome) => {
            print_outcome(name, &outcome, dry_run, &feed_config.output);
            FeedStatus::Done
        }
        Err(PipelineError::Write(e)) => {
            tracing::error!(feed = %name, error = %e, "Feed write failed");
            eprintln!("{name}: update NOT written: {e}");
            FeedStatus::Failed
        }
    }
}

fn print_outcome(name: &str, outcome: &RunOutcome, dry_run: bool, output: &std::path::Path) {
    let report = &outcome.report;
    tracing::info!(
        feed = %name,
        kept = report.kept,
        dropped = report.dropped.len(),
        duplicates = report.duplicates(),
        warnings = report.warnings.len(),
        changed = outcome.changed,
        reason = %outcome.decision.reason,
        "Feed processed"
    );

    let action = match (outcome.changed, dry_run) {
        (true, true) => "would write",
        (true, false) => "written",
        (false, _) if outcome.decision.is_outage() => "kept (extraction outage)",
        (false, _) => "unchanged",
    };
    println!(
        "{name}: {action} {} ({} items, {}; {} dropped)",
        output.display(),
        outcome.document.items.len(),
        outcome.decision.reason,
        report.dropped.len()
    );
}
