use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ghr_core::{
    config::{default_state_path, Config},
    delivery::{DeliveryPort, ThrottleConfig, ThrottledDelivery},
    feed::FeedSource,
    relay::{self, Relay},
};
use ghr_github::GithubFeed;
use ghr_slack::SlackDelivery;

#[derive(Parser)]
#[command(name = "ghr", version, about = "Relay GitHub activity to a Slack channel")]
struct Cli {
    /// JSON config file ({"slack": {...}, "github": {...}})
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the received-events feed and post new events until interrupted
    Watch {
        /// Checkpoint file
        #[arg(short, long, default_value_os_t = default_state_path())]
        state: PathBuf,
    },
    /// Post a single event record read from a JSON file
    Single {
        /// Event file (`-` reads stdin)
        event: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ghr_core::logging::init("ghr")?;

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let slack: Arc<dyn DeliveryPort> =
        Arc::new(SlackDelivery::new(&cfg.slack_api_url, &cfg.slack_token)?);
    let delivery: Arc<dyn DeliveryPort> =
        Arc::new(ThrottledDelivery::new(slack, ThrottleConfig::default()));
    let relay = Arc::new(Relay::new(delivery, cfg.slack_channel.clone()));

    match cli.cmd {
        Command::Watch { state } => {
            let feed: Arc<dyn FeedSource> = Arc::new(GithubFeed::new(
                &cfg.github_api_url,
                &cfg.github_user,
                &cfg.github_token,
            )?);
            info!(endpoint = feed.endpoint(), channel = %cfg.slack_channel.0, "watching feed");

            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());

            let last = relay::watch(feed, relay, state, cancel).await?;
            info!(watermark = %last.watermark, "stopped");
        }
        Command::Single { event } => {
            let envelope = relay::read_event(&event)
                .await
                .with_context(|| format!("reading event from {}", event.display()))?;
            relay.single(envelope).await?;
        }
    }

    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            return;
        }
        info!("interrupt received; shutting down (press ctrl-c again to force)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt; exiting without waiting");
            std::process::exit(130);
        }
    });
}
