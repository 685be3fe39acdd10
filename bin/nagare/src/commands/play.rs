use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use clap_handler::handler;
use nagare::{
    config::OverflowPolicy,
    controller::SessionReport,
    sink::{CodecDescriptor, PipeSink},
    Player, PlayerConfig,
};
use reqwest::Url;

#[derive(Parser, Clone, Default, Debug)]
#[clap(name = "play", short_flag = 'P')]
pub struct PlayCommand {
    /// TOML player configuration, command line options take precedence
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Server-sent event stream announcing ready fragments
    #[clap(long, env = "NAGARE_NOTIFICATION_ENDPOINT")]
    pub notification_endpoint: Option<Url>,

    /// Base URL fragment paths are resolved against
    #[clap(long, env = "NAGARE_FRAGMENT_BASE_URL")]
    pub fragment_base_url: Option<Url>,

    /// Codec descriptor the fragments must match
    #[clap(long, env = "NAGARE_CODEC")]
    pub codec: Option<String>,

    /// Fragment retry limit
    #[clap(long)]
    pub retries: Option<u32>,

    /// Skip fragments announced more than once
    #[clap(long)]
    pub dedup: bool,

    /// Maximum number of pending fragments
    #[clap(long)]
    pub queue_capacity: Option<NonZeroUsize>,

    /// Fragment dropped when the queue is full: oldest or newest
    #[clap(long)]
    pub overflow: Option<OverflowPolicy>,

    /// HTTP timeout, in seconds
    #[clap(short, long)]
    pub timeout: Option<u64>,

    /// Output file, stdout if omitted
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Fragments to play instead of following a notification stream
    pub fragments: Vec<String>,
}

impl PlayCommand {
    fn player_config(&self) -> anyhow::Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&data)?
            }
            None => {
                let Some(base) = self.fragment_base_url.clone() else {
                    anyhow::bail!("--fragment-base-url is required without --config");
                };
                PlayerConfig::fixed(Vec::new(), base)
            }
        };

        if let Some(endpoint) = &self.notification_endpoint {
            config.notification_endpoint = Some(endpoint.clone());
        }
        if !self.fragments.is_empty() {
            config.fragments = self.fragments.clone();
        }
        if let Some(base) = &self.fragment_base_url {
            config.fragment_base_url = base.clone();
        }
        if let Some(codec) = &self.codec {
            config.codec = codec.clone();
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        config.dedup |= self.dedup;
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = Some(capacity);
        }
        if let Some(overflow) = self.overflow {
            config.overflow = overflow;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }

        Ok(config)
    }
}

fn print_report(report: &SessionReport) {
    log::info!(
        "Session finished: {} appended, {} dropped, {} failed",
        report.appended,
        report.dropped,
        report.failed.len()
    );
    for locator in &report.failed {
        log::warn!("Missing fragment: {locator}");
    }
}

#[handler(PlayCommand)]
pub async fn play(me: PlayCommand) -> anyhow::Result<()> {
    let config = me.player_config()?;
    let codec = CodecDescriptor::parse(&config.codec)?;
    let sink = match &me.output {
        Some(output) => PipeSink::file(output, codec).await?,
        None => PipeSink::stdout(codec),
    };

    let mut handle = Player::from_config(&config, sink)?.start();
    let report = tokio::select! {
        report = handle.join() => report?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping player...");
            handle.stop().await?
        }
    };
    print_report(&report);

    Ok(())
}
