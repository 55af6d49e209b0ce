//! monitor-engine: binary entrypoint.
//! Loads `.env`, the bots file and runs one bot once or forever.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use monitor_engine::{bootstrap, config, metrics, RunMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "monitor-engine", version, about = "Scheduled monitor -> decide -> act bots")]
struct Cli {
    /// Bot name from the bots file.
    #[arg(long, env = "BOT_NAME")]
    bot: String,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Bots file; defaults to $BOTS_CONFIG_PATH, then config/bots.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// `RUST_LOG` filter, `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("monitor_engine=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; real env wins.
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    if let Some(addr) = metrics::init_from_env()? {
        tracing::info!(target: "engine", %addr, "prometheus exporter listening");
    }

    let cfg = config::load(cli.config.as_deref()).context("loading bots config")?;
    let mut rt = bootstrap::build(&cfg, &cli.bot).with_context(|| format!("building bot `{}`", cli.bot))?;

    let mode = if cli.once { RunMode::Once } else { RunMode::Forever };
    tracing::info!(target: "engine", bot = %cli.bot, ?mode, "starting");

    match rt.scheduler.run(&mut *rt.bot, mode).await {
        Ok(outcome) => {
            tracing::info!(target: "engine", bot = %cli.bot, outcome = outcome.as_str(), "finished");
            Ok(())
        }
        Err(e) => Err(e).context("cycle failed"),
    }
}
