use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jikimi::cluster::{Member, PartitionTable, TopologyCoordinator};
use jikimi::config::Config;
use jikimi::node::ClusterNode;
use jikimi::scheduler::local::{EntryStore, MemoryStore};
use jikimi::scheduler::{Scheduler, Transport};
use jikimi::topology::MetadataMode;

#[derive(Parser)]
#[command(
    name = "jikimi",
    version,
    about = "Primary-owner task scheduling for partitioned clusters",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process cluster, join members one by one and report ownership
    Simulate {
        /// Number of members to end up with
        #[arg(short, long, default_value = "3")]
        nodes: usize,

        /// Number of entries to schedule
        #[arg(short, long, default_value = "100")]
        entries: usize,

        /// Override the configured segment count
        #[arg(short, long)]
        segments: Option<u32>,

        /// Seed for generated entry ids
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print Prometheus metrics when done
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// Load, validate and print the effective configuration
    Config,
}

/// Metadata carried by simulated entries
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Expiration {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Simulate {
            nodes,
            entries,
            segments,
            seed,
            metrics,
        } => {
            if let Some(segments) = segments {
                config.topology.segments = segments;
                config.validate().context("Invalid segment count")?;
            }
            tracing::info!(
                nodes,
                entries,
                segments = config.topology.segments,
                seed,
                "Starting simulate command"
            );
            simulate(&config, nodes, entries, seed, metrics).await?;
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("jikimi=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("jikimi={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
    }

    Ok(())
}

async fn simulate(config: &Config, nodes: usize, entries: usize, seed: u64, print_metrics: bool) -> Result<()> {
    if let Err(e) = jikimi::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed; continuing without metrics");
    }

    let members: Vec<Member> = (0..nodes.max(1)).map(|i| Member::new(format!("node-{i}"))).collect();
    let store = Arc::new(MemoryStore::new());
    let ids = generate_entries(&store, entries, seed);
    let store: Arc<dyn EntryStore<String, Expiration>> = store;

    let table = Arc::new(PartitionTable::new(config.topology.segments, &members[..1])?);
    let coordinator = TopologyCoordinator::new(table);
    let transport = Transport::new();

    let mut cluster = Vec::with_capacity(members.len());
    cluster.push(ClusterNode::start(
        members[0].clone(),
        Arc::clone(&store),
        &coordinator,
        &transport,
        config,
    )?);

    for id in &ids {
        match config.topology.metadata_mode {
            MetadataMode::Transient => cluster[0].scheduler().schedule(id).await,
            MetadataMode::Persistent => {
                if let Some(metadata) = store.metadata(id)? {
                    cluster[0].scheduler().schedule_with(id, metadata).await;
                }
            }
        }
    }
    report("initial", &cluster).await;

    for joined in 1..members.len() {
        cluster.push(ClusterNode::start(
            members[joined].clone(),
            Arc::clone(&store),
            &coordinator,
            &transport,
            config,
        )?);

        let topology_id = coordinator.rebalance_to(&members[..=joined]).await?;
        for node in &cluster {
            if let Some(sweep) = node.reactor().current_sweep() {
                sweep.wait().await;
            }
        }
        report(&format!("topology {topology_id}"), &cluster).await;
    }

    let mut missing = 0;
    for id in &ids {
        if !cluster[0].scheduler().contains(id).await {
            missing += 1;
        }
    }
    println!("entries: {}  scheduled on owner: {}  missing: {missing}", ids.len(), ids.len() - missing);

    for node in &cluster {
        node.shutdown(&coordinator).await;
    }

    if print_metrics {
        let text = jikimi::metrics::gather_metrics().map_err(|e| anyhow::anyhow!("{e}"))?;
        println!("{text}");
    }

    Ok(())
}

fn generate_entries(store: &MemoryStore<String, Expiration>, count: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let now = Utc::now();

    (0..count)
        .map(|_| {
            let id = format!("session-{:016x}", rng.gen::<u64>());
            let ttl = ChronoDuration::seconds(rng.gen_range(60..3_600));
            store.insert(
                id.clone(),
                Expiration {
                    created_at: now,
                    expires_at: now + ttl,
                },
            );
            id
        })
        .collect()
}

async fn report(label: &str, cluster: &[ClusterNode<String, Expiration>]) {
    println!("[{label}]");
    let Some(first) = cluster.first() else {
        return;
    };
    for node in cluster {
        let name = node.member().to_string();
        match first.scheduler().entries_on(node.member()).await {
            Ok(entries) => println!("  {name:<10} {:>6} entries", entries.len()),
            Err(e) => println!("  {name:<10} unavailable: {e}"),
        }
    }
}
