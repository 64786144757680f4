use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use vodfeeds::manifest::{
    DEFAULT_CHUNK_BUDGET, DEFAULT_ENRICH_ITEMS_PER_FEED, DEFAULT_MAX_EPISODES_PER_FEED,
};
use vodfeeds::scheduler::DEFAULT_CONCURRENCY;
use vodfeeds::{
    BuildOptions, FeedCache, FetchStatus, ProbeSettings, ProgressEvent, ProgressReporter,
    ReqwestClient, SharedProgressReporter, UpdateOptions, build_manifest, load_feeds_config,
    update_feeds,
};

// Emoji with fallback for terminals without Unicode support
static SATELLITE: Emoji<'_, '_> = Emoji("📡 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static FILM: Emoji<'_, '_> = Emoji("🎬 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static UNCHANGED: Emoji<'_, '_> = Emoji("💤 ", "[=] ");
static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[-] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[?] ");
static CHUNK: Emoji<'_, '_> = Emoji("📦 ", "[>] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Fetch video and podcast feeds and publish them as a chunked manifest
#[derive(Parser, Debug)]
#[command(name = "vodfeeds")]
#[command(about = "Fetch video and podcast feeds and publish them as a chunked manifest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every configured feed into the cache
    Update(UpdateArgs),
    /// Build the manifest from the cached feeds
    Build(BuildArgs),
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Path to the feeds config (JSON)
    #[arg(long, default_value = "feeds.json")]
    feeds: PathBuf,

    /// Cache directory for feed bodies and the fetch-state ledger
    #[arg(long, default_value = "cache")]
    cache: PathBuf,

    /// Ignore the cooldown and check every feed
    #[arg(short, long)]
    force: bool,

    /// Maximum number of concurrent fetches
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Quiet mode - only print errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Path to the feeds config (JSON)
    #[arg(long, default_value = "feeds.json")]
    feeds: PathBuf,

    /// Cache directory written by `update`
    #[arg(long, default_value = "cache")]
    cache: PathBuf,

    /// Output directory for the manifest and feed copies
    #[arg(short, long, default_value = "dist")]
    out: PathBuf,

    /// URL path the output directory is served under
    #[arg(long, default_value = "/")]
    base_path: String,

    /// Do not fetch configured feeds missing from the cache
    #[arg(long)]
    no_fetch_missing_feeds: bool,

    /// Probe media size and duration where feeds omit them
    #[arg(long)]
    enrich_media: bool,

    /// Newest episodes per feed to probe
    #[arg(long, default_value_t = DEFAULT_ENRICH_ITEMS_PER_FEED)]
    enrich_items_per_feed: usize,

    /// Newest episodes per feed to publish
    #[arg(long, default_value_t = DEFAULT_MAX_EPISODES_PER_FEED)]
    max_episodes_per_feed: usize,

    /// Byte budget per manifest chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_BUDGET)]
    chunk_budget: usize,

    /// Quiet mode - only print errors
    #[arg(short, long)]
    quiet: bool,
}

/// Renders progress events as a spinner plus one line per source.
///
/// In quiet mode the spinner is hidden and only failures are printed.
struct TerminalReporter {
    spinner: ProgressBar,
    quiet: bool,
}

impl TerminalReporter {
    fn new(quiet: bool) -> Self {
        let spinner = if quiet {
            ProgressBar::hidden()
        } else {
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bar = ProgressBar::new_spinner();
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { spinner, quiet }
    }

    fn line(&self, message: String) {
        if self.spinner.is_hidden() {
            eprintln!("{message}");
        } else {
            self.spinner.println(message);
        }
    }

    fn item(&self, message: String) {
        if !self.quiet {
            self.line(message);
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::UpdateStarted { total_sources } => {
                self.spinner.set_message(format!(
                    "{SEARCH}Checking {} feeds",
                    total_sources.to_string().cyan()
                ));
            }

            ProgressEvent::FeedFetched {
                source_id,
                status,
                bytes,
            } => match status {
                FetchStatus::NotModified => {
                    self.item(format!("  {UNCHANGED}{} {}", source_id, "not modified".dimmed()));
                }
                _ => {
                    let size = bytes.map(|b| format!("{b} bytes")).unwrap_or_default();
                    self.item(format!("  {SUCCESS}{} {}", source_id.green(), size.dimmed()));
                }
            },

            ProgressEvent::FeedSkipped { source_id, reason } => {
                self.item(format!("  {SKIPPED}{} {}", source_id, reason.dimmed()));
            }

            ProgressEvent::FeedFailed { source_id, error } => {
                self.line(format!("  {FAILURE}{} - {}", source_id.red(), error.red()));
            }

            ProgressEvent::UpdateCompleted {
                ok_count,
                not_modified_count,
                skipped_count,
                error_count,
            } => {
                self.spinner.finish_and_clear();
                if !self.quiet {
                    println!(
                        "\n{PARTY}{} {} fetched, {} not modified, {} skipped, {} failed",
                        "Update complete:".bold().green(),
                        ok_count.to_string().green().bold(),
                        not_modified_count.to_string().cyan(),
                        skipped_count.to_string().yellow(),
                        if error_count > 0 {
                            error_count.to_string().red().bold()
                        } else {
                            error_count.to_string().green()
                        }
                    );
                }
            }

            ProgressEvent::BuildStarted { total_sources } => {
                self.spinner.set_message(format!(
                    "{FILM}Building manifest for {} feeds",
                    total_sources.to_string().cyan()
                ));
            }

            ProgressEvent::CacheCoverage { missing, extra } => {
                if !missing.is_empty() {
                    self.item(format!(
                        "  {WARNING}{} configured feeds not cached: {}",
                        missing.len().to_string().yellow(),
                        missing.join(", ").dimmed()
                    ));
                }
                if !extra.is_empty() {
                    self.item(format!(
                        "  {WARNING}{} cached feeds not configured: {}",
                        extra.len().to_string().yellow(),
                        extra.join(", ").dimmed()
                    ));
                }
            }

            ProgressEvent::FeedParsed {
                source_id,
                channel_title,
                episode_count,
            } => {
                self.item(format!(
                    "  {FILM}{} • {} • {} episodes",
                    source_id.bold(),
                    channel_title.green(),
                    episode_count.to_string().cyan()
                ));
            }

            ProgressEvent::MediaProbed { url, .. } => {
                self.spinner
                    .set_message(format!("{SEARCH}Probed {}", url.dimmed()));
            }

            ProgressEvent::ChunkWritten { filename, bytes } => {
                self.item(format!(
                    "  {CHUNK}{} {}",
                    filename.cyan(),
                    format!("{bytes} bytes").dimmed()
                ));
            }

            ProgressEvent::BuildCompleted {
                feed_count,
                episode_count,
                chunk_count,
            } => {
                self.spinner.finish_and_clear();
                if !self.quiet {
                    println!(
                        "\n{PARTY}{} {} feeds, {} episodes, {} chunks",
                        "Build complete:".bold().green(),
                        feed_count.to_string().green().bold(),
                        episode_count.to_string().cyan(),
                        chunk_count.to_string().cyan()
                    );
                }
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn banner(quiet: bool) {
    if !quiet {
        println!(
            "\n{}{} {}\n",
            SATELLITE,
            "vodfeeds".bold().magenta(),
            "- Feed Manifest Builder".dimmed()
        );
    }
}

async fn run_update(args: UpdateArgs) -> Result<()> {
    let config = load_feeds_config(&args.feeds)
        .with_context(|| format!("Failed to load feeds config {}", args.feeds.display()))?;

    let options = UpdateOptions {
        force: args.force,
        concurrency: args.concurrency,
        ..UpdateOptions::from_defaults(&config.defaults)
    };
    let cache = FeedCache::new(&args.cache);
    let reporter: SharedProgressReporter = Arc::new(TerminalReporter::new(args.quiet));

    update_feeds(&ReqwestClient::new(), &config, &cache, &options, reporter)
        .await
        .context("Failed to write fetch-state ledger")?;

    if !args.quiet {
        println!(
            "\n{FOLDER}Cache: {}\n",
            args.cache.display().to_string().cyan()
        );
    }
    Ok(())
}

async fn run_build(args: BuildArgs) -> Result<()> {
    let config = load_feeds_config(&args.feeds)
        .with_context(|| format!("Failed to load feeds config {}", args.feeds.display()))?;

    let options = BuildOptions {
        base_path: args.base_path,
        fetch_missing: !args.no_fetch_missing_feeds,
        enrich_media: args.enrich_media,
        enrich_items_per_feed: args.enrich_items_per_feed,
        max_episodes_per_feed: args.max_episodes_per_feed,
        chunk_budget: args.chunk_budget,
        probe: ProbeSettings::from_defaults(&config.defaults),
        ..BuildOptions::new(&args.out)
    };
    let cache = FeedCache::new(&args.cache);
    let reporter: SharedProgressReporter = Arc::new(TerminalReporter::new(args.quiet));

    build_manifest(&ReqwestClient::new(), &config, &cache, &options, reporter)
        .await
        .context("Failed to build manifest")?;

    if !args.quiet {
        println!(
            "\n{FOLDER}Output: {}\n",
            args.out.display().to_string().cyan()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Update(args) => {
            banner(args.quiet);
            run_update(args).await
        }
        Command::Build(args) => {
            banner(args.quiet);
            run_build(args).await
        }
    }
}
