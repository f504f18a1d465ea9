mod demo;

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Parser, Subcommand};

use mqk_rb_config::RebalanceConfig;
use mqk_rb_engine::{Collaborators, RebalanceRequest, RebalancerEngine};
use mqk_rb_events::{EventSink, JsonlEventSink, NullEventSink};
use mqk_rb_regime::RebalanceDate;

#[derive(Parser)]
#[command(name = "mqk-rb")]
#[command(about = "Portfolio rebalancing decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the layered config hash and print canonical JSON.
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...).
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one rebalance date against the bundled example universe and
    /// print the Target JSON form.
    Rebalance {
        /// Layered config paths in merge order. Omit to use defaults.
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Day index for this rebalance (a `RebalanceDate`, not a calendar date).
        #[arg(long, default_value_t = 0)]
        date: i64,

        /// Append events as JSON-Lines to this path instead of discarding them.
        #[arg(long)]
        event_log: Option<String>,

        /// Hash-chain the event log for tamper-evidence (requires --event-log).
        #[arg(long, default_value_t = false)]
        hash_chain: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = RebalanceConfig::load_layered(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Rebalance { config_paths, date, event_log, hash_chain } => {
            let mut config = if config_paths.is_empty() {
                RebalanceConfig::default()
            } else {
                let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
                RebalanceConfig::load_layered(&path_refs)?.config
            };
            config.validate()?;
            let domain_config = config.to_domain();

            let sink: Box<dyn EventSink> = match event_log {
                Some(path) => Box::new(JsonlEventSink::new(&path, hash_chain)?),
                None => Box::new(NullEventSink),
            };

            let universe = demo::DemoUniverse::new();
            let collab = Collaborators {
                regime_provider: &universe,
                bucket_catalog: &universe,
                price_provider: &universe,
                technical: Some(&universe),
                fundamental: Some(&universe),
            };

            let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
            holdings.insert("AAPL".to_string(), 0.10);
            holdings.insert("TLT".to_string(), 0.05);

            let mut engine = RebalancerEngine::new();
            let req = RebalanceRequest {
                date: RebalanceDate::new(date),
                holdings: &holdings,
                bucket_filter: None,
            };

            let result = engine.rebalance(&req, &collab, &domain_config, sink.as_ref())?;
            let timestamp = chrono::Utc::now().to_rfc3339();
            let json = mqk_rb_engine::targets_to_json(&result.targets, &timestamp);
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
