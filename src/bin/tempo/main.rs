use clap::{Args, Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use tempo::adapters::{JsonlSource, NullBus, NullCache, RelayVerifier};
use tempo::sync::SyncDriver;
use tempo::Config;
use tempo_core::{revert_to, ChallengeBus, RefreshCache};
use tempo_indexer::{build_schema, IndexerContext};
use tempo_redb::RedbStore;
use tempo_redis::{RedisChallengeBus, RedisRefreshCache};

#[derive(Debug, Args)]
struct DaemonArgs {}

#[derive(Debug, Args)]
struct RevertArgs {
    /// Unwind every block above this one
    #[arg(long)]
    to: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the indexing daemon against the configured feed
    Daemon(DaemonArgs),

    /// Manually unwind the store to a block (for operator recovery)
    Revert(RevertArgs),
}

#[derive(Debug, Parser)]
#[clap(name = "Tempo")]
#[clap(bin_name = "tempo")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    config: Option<std::path::PathBuf>,
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn daemon(config: &Config) -> Result<()> {
    let schema = build_schema();

    let store = RedbStore::open(&config.store.path, schema.clone())
        .into_diagnostic()
        .context("opening entity store")?;

    let (bus, cache): (Box<dyn ChallengeBus>, Box<dyn RefreshCache>) = match &config.redis {
        Some(redis) => {
            let bus = RedisChallengeBus::open(&redis.url, redis.challenge_queue.clone())
                .into_diagnostic()
                .context("connecting challenge bus")?;

            let cache = RedisRefreshCache::open(&redis.url, redis.refresh_set.clone())
                .into_diagnostic()
                .context("connecting refresh cache")?;

            (Box::new(bus), Box::new(cache))
        }
        None => (Box::new(NullBus), Box::new(NullCache)),
    };

    let verifier = RelayVerifier;

    let ctx = IndexerContext {
        config: &config.indexer,
        bus: bus.as_ref(),
        cache: cache.as_ref(),
        verifier: &verifier,
    };

    let feed = config
        .sync
        .feed
        .as_ref()
        .ok_or_else(|| miette::miette!("sync.feed is required for the daemon"))?;

    let source = JsonlSource::open(feed)
        .into_diagnostic()
        .context("opening relay feed")?;

    let mut driver = SyncDriver::new(ctx, &store, &schema, source, config.sync.retention);

    let stop = Arc::new(AtomicBool::new(false));

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    {
        let stop = stop.clone();
        rt.spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            stop.store(true, Ordering::Relaxed);
        });
    }

    driver
        .run_until(&stop, Duration::from_millis(config.sync.poll_interval_ms))
        .into_diagnostic()
}

fn revert(config: &Config, args: &RevertArgs) -> Result<()> {
    let schema = build_schema();

    let store = RedbStore::open(&config.store.path, schema.clone())
        .into_diagnostic()
        .context("opening entity store")?;

    let unwound = revert_to(&store, &schema, args.to).into_diagnostic()?;

    info!(to = args.to, unwound, "manual revert complete");

    Ok(())
}

fn main() -> Result<()> {
    setup_tracing();

    let args = Cli::parse();
    let config = Config::new(&args.config).into_diagnostic()?;

    match args.command {
        Command::Daemon(_) => daemon(&config),
        Command::Revert(x) => revert(&config, &x),
    }
}
