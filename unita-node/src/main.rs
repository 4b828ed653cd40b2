use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use unita_ledger::{ChainBackend, MemoryChain, UtxoLedger};
use unita_peg::{PegConfig, PegController};
use unita_types::units::COIN_SCALE;

#[derive(Parser, Debug)]
#[command(author, version, about = "unita-node — UNA algorithmic peg node")]
struct Args {
    /// Data directory for persistent state.
    #[arg(long, default_value = "./data")]
    data_dir: String,
    /// Oracle spec: stub | fixed:X | file:PATH | random:C:V | aggregated:a;b
    #[arg(long, default_value = "stub")]
    oracle: String,
    /// Protocol treasury address.
    #[arg(long, default_value = "una1treasury0dev0000000000000000")]
    treasury: String,
    /// Enable the peg mechanism at startup.
    #[arg(long)]
    enable: bool,
    /// Seconds between control epochs.
    #[arg(long, default_value_t = 3_600)]
    epoch_seconds: u64,
    /// Proportional gain in ppm.
    #[arg(long, default_value_t = 50_000)]
    k_ppm: i64,
    /// Dead-band around the target in ppm.
    #[arg(long, default_value_t = 10_000)]
    deadband_ppm: i64,
    /// Per-epoch expansion cap in ppm of supply.
    #[arg(long, default_value_t = 50_000)]
    max_expansion_ppm: i64,
    /// Per-epoch contraction cap in ppm of supply.
    #[arg(long, default_value_t = 50_000)]
    max_contraction_ppm: i64,
    /// Maximum oracle price age in seconds.
    #[arg(long, default_value_t = 600)]
    oracle_max_age_seconds: u64,
    /// Circuit-breaker deviation threshold in ppm.
    #[arg(long, default_value_t = 500_000)]
    circuit_breaker_ppm: i64,
    /// Genesis supply in whole UNA, credited to the genesis address.
    #[arg(long, default_value_t = 1_000_000_000)]
    genesis_supply: u64,
    /// API listen address.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,
}

const GENESIS_ADDRESS: &str = "una1supply0seed0000000000000000";

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing subscriber failed")?;

    let args = Args::parse();
    info!("starting unita-node");

    // Storage for controller state, events, and bonds.
    #[cfg(feature = "rocksdb")]
    let kv: Arc<dyn unita_storage::KvStore> = Arc::new(
        unita_storage::RocksStore::open(&format!("{}/peg", args.data_dir))
            .context("failed to open peg database")?,
    );
    #[cfg(not(feature = "rocksdb"))]
    let kv: Arc<dyn unita_storage::KvStore> = Arc::new(unita_storage::MemoryStore::new());
    info!(data_dir = %args.data_dir, "storage initialized");

    // Chain backend: a single-node in-memory UTXO set seeded with the
    // genesis supply. A networked deployment plugs the real engine in
    // through the same traits.
    let genesis_units = i64::try_from(args.genesis_supply as i128 * COIN_SCALE as i128)
        .context("genesis supply does not fit in a single output")?;
    let chain = MemoryChain::with_genesis(GENESIS_ADDRESS, genesis_units);
    let ledger = Arc::new(UtxoLedger::new(
        Arc::new(chain.clone()),
        Arc::new(chain.clone()),
    ));

    let oracle: Arc<dyn unita_oracle::Oracle> = unita_oracle::oracle_from_spec(&args.oracle)
        .context("invalid oracle spec")?
        .into();
    info!(oracle = %args.oracle, "oracle constructed");

    let config = PegConfig {
        enabled: args.enable,
        epoch_seconds: args.epoch_seconds,
        deadband_ppm: args.deadband_ppm,
        k_ppm: args.k_ppm,
        max_expansion_ppm: args.max_expansion_ppm,
        max_contraction_ppm: args.max_contraction_ppm,
        oracle_max_age_seconds: args.oracle_max_age_seconds,
        circuit_breaker_ppm: args.circuit_breaker_ppm,
        treasury_address: args.treasury.clone(),
        ..Default::default()
    };
    let controller =
        Arc::new(PegController::new(ledger, oracle, kv, config).context("peg controller init")?);

    // API server.
    let api_controller = controller.clone();
    let listen = args.listen;
    tokio::spawn(async move {
        if let Err(err) = unita_api::start_server(api_controller, listen).await {
            error!(%err, "API server exited");
        }
    });

    // Epoch scheduler: allocates strictly increasing epoch ids and
    // drives the controller off the async runtime.
    let scheduler_controller = controller.clone();
    let scheduler_chain = chain.clone();
    let epoch_interval = Duration::from_secs(args.epoch_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(epoch_interval);
        loop {
            ticker.tick().await;
            let controller = scheduler_controller.clone();
            let epoch_id = controller.get_state().epoch_id + 1;
            let block_height = scheduler_chain.height();
            let timestamp = unix_now();
            let outcome =
                tokio::task::spawn_blocking(move || {
                    controller.run_epoch(epoch_id, block_height, timestamp)
                })
                .await;
            match outcome {
                Ok(true) => {}
                Ok(false) => error!(epoch_id, "epoch reported failure"),
                Err(err) => error!(epoch_id, %err, "epoch task panicked"),
            }
        }
    });

    info!("node running; press Ctrl+C to stop");
    signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
