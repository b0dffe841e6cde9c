//! Command-line crawler.
//!
//! Joins the Mainline DHT and logs every info-hash it sees. Confirmed
//! hashes are logged at `info`, unconfirmed ones at `debug`:
//!
//! ```bash
//! RUST_LOG=dht_crawler=debug dht-crawler --config crawler.toml
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

use dht_crawler::{Crawler, CrawlerConfig, CrawlerEvent, PortRange};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "dht-crawler", version, about = "Crawl the BitTorrent DHT for info-hashes")]
struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bootstrap router as host:port (repeatable, replaces the defaults)
    #[arg(short, long = "bootstrap")]
    bootstrap: Vec<String>,

    /// Local address to bind
    #[arg(long)]
    bind: Option<Ipv4Addr>,

    /// Candidate local ports as START-END
    #[arg(long, value_parser = parse_port_range)]
    ports: Option<PortRange>,

    /// Maximum number of nodes in the routing table
    #[arg(long)]
    table_capacity: Option<usize>,
}

fn parse_port_range(s: &str) -> Result<PortRange, String> {
    let (start, end) = s.split_once('-').unwrap_or((s, s));
    let parse = |p: &str| p.trim().parse::<u16>().map_err(|e| format!("{p:?}: {e}"));
    Ok(PortRange {
        start: parse(start)?,
        end: parse(end)?,
    })
}

fn load_config(args: &Args) -> Result<CrawlerConfig> {
    let mut config = match &args.config {
        Some(path) => CrawlerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CrawlerConfig::default(),
    };

    if !args.bootstrap.is_empty() {
        config.bootstrap_nodes = args.bootstrap.clone();
    }
    if let Some(bind) = args.bind {
        config.bind_ip = bind;
    }
    if let Some(ports) = args.ports {
        config.port_range = ports;
    }
    if let Some(capacity) = args.table_capacity {
        config.table_capacity = capacity;
    }

    config.validate()?;
    Ok(config)
}

#[derive(Debug, Default)]
struct Stats {
    nodes: usize,
    unconfirmed: usize,
    confirmed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let mut crawler = Crawler::new(config)?;
    let mut events = crawler.subscribe();
    crawler.start().await.context("starting crawler")?;

    let mut stats = Stats::default();
    let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
    stats_interval.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            _ = stats_interval.tick() => {
                info!(
                    "last {}s: {} nodes, {} unconfirmed, {} confirmed",
                    STATS_INTERVAL.as_secs(),
                    stats.nodes,
                    stats.unconfirmed,
                    stats.confirmed
                );
                stats = Stats::default();
            }
            event = events.recv() => match event {
                Ok(CrawlerEvent::NodesDiscovered(nodes)) => {
                    trace!("discovered {} nodes", nodes.len());
                    stats.nodes += nodes.len();
                }
                Ok(CrawlerEvent::UnconfirmedHash(info_hash)) => {
                    debug!("unconfirmed {}", info_hash);
                    stats.unconfirmed += 1;
                }
                Ok(CrawlerEvent::ConfirmedHash { info_hash, peer }) => {
                    info!("confirmed {} at {}", info_hash, peer);
                    stats.confirmed += 1;
                }
                Ok(CrawlerEvent::TransportError(e)) => {
                    crawler.stop().await;
                    anyhow::bail!("crawler socket failed: {e}");
                }
                Err(RecvError::Lagged(missed)) => warn!("event consumer lagging, missed {}", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    crawler.stop().await;
    Ok(())
}
