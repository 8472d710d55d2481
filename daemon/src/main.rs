//! Ballotguard daemon: replicates ballots across ledger nodes with an
//! encrypted local emergency ledger as the backstop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use ballotguard_crypto::EnvelopeCipher;
use ballotguard_election::ElectionStateMachine;
use ballotguard_emergency::{EmergencyLedger, EmergencyStore};
use ballotguard_failover::{NodeHealthMonitor, NodeRoster};
use ballotguard_ledger_client::{LedgerNode, ReceiptWaiter};
use ballotguard_replicator::{
    init_logging, ReplicatorConfig, ReplicatorMetrics, ReplicatorParts, ShutdownController,
    VoteReplicator,
};
use ballotguard_rpc::{ApiState, RpcServer};
use ballotguard_types::NodeId;
use clap::Parser;

#[derive(Parser)]
#[command(name = "ballotguard", about = "Ballot replication daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "BALLOTGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Secret the emergency ledger key is derived from (at least 16 bytes).
    /// Never read from the config file.
    #[arg(long, env = "BALLOTGUARD_EMERGENCY_KEY", hide_env_values = true)]
    emergency_key: Option<String>,

    /// Encrypted emergency ledger file.
    #[arg(long, env = "BALLOTGUARD_EMERGENCY_PATH")]
    emergency_path: Option<PathBuf>,

    /// HTTP API port.
    #[arg(long, env = "BALLOTGUARD_HTTP_PORT")]
    http_port: Option<u16>,

    /// Do not serve the HTTP API.
    #[arg(long, env = "BALLOTGUARD_DISABLE_HTTP")]
    disable_http: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BALLOTGUARD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "BALLOTGUARD_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the reconciliation loop and the HTTP API until SIGINT/SIGTERM.
    Run,
    /// Probe every node once and print the node status table.
    Status,
    /// Inspect the emergency ledger.
    Emergency {
        #[command(subcommand)]
        action: EmergencyAction,
    },
    /// Poll a node until a transaction is mined.
    WaitReceipt {
        /// Node id as configured.
        node: String,
        /// Transaction hash.
        tx_hash: String,
    },
}

#[derive(clap::Subcommand)]
enum EmergencyAction {
    /// Vote counts, last update and file location.
    Stats,
    /// Decrypt and print every record as JSON.
    Export,
    /// Check that the file decrypts, matches its recorded vote count and
    /// holds one record per ballot and voter.
    Verify,
}

fn load_config(cli: &Cli) -> anyhow::Result<ReplicatorConfig> {
    let mut config = match &cli.config {
        Some(path) => ReplicatorConfig::from_toml_file(path)?,
        None => ReplicatorConfig::default(),
    };
    if let Some(path) = &cli.emergency_path {
        config.emergency_path = path.clone();
    }
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }
    if cli.disable_http {
        config.enable_http = false;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    Ok(config)
}

fn cipher(cli: &Cli) -> anyhow::Result<EnvelopeCipher> {
    let secret = cli
        .emergency_key
        .as_deref()
        .context("emergency ledger key missing: pass --emergency-key or set BALLOTGUARD_EMERGENCY_KEY")?;
    Ok(EnvelopeCipher::from_secret(secret)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_format(), &config.log_level)?;

    match &cli.command {
        Command::Run => run(&cli, config).await,
        Command::Status => status(config).await,
        Command::Emergency { action } => emergency(&cli, &config, action).await,
        Command::WaitReceipt { node, tx_hash } => wait_receipt(config, node, tx_hash).await,
    }
}

async fn run(cli: &Cli, config: ReplicatorConfig) -> anyhow::Result<()> {
    config.validate()?;
    let cipher = cipher(cli)?;

    let election = Arc::new(ElectionStateMachine::new());
    let ledger = Arc::new(
        EmergencyLedger::open(&config.emergency_path, cipher, election.subscribe())
            .await
            .with_context(|| format!("opening {}", config.emergency_path.display()))?,
    );
    election.restore(ledger.election_snapshot().await)?;
    let follower = ledger.follow_election();

    let replicator = Arc::new(VoteReplicator::new(
        config.settings(),
        ReplicatorParts {
            nodes: config.rpc_nodes()?,
            health: Default::default(),
            emergency: ledger.clone() as Arc<dyn EmergencyStore>,
            election: election.clone(),
            metrics: Arc::new(ReplicatorMetrics::new()),
        },
    )?);

    let http = if config.enable_http {
        config.http_port.to_string()
    } else {
        "off".into()
    };
    tracing::info!(
        nodes = replicator.monitor().roster().len(),
        election = %election.status(),
        %http,
        "starting ballotguard"
    );

    let shutdown = ShutdownController::new();
    let sync_task = replicator.run_background(shutdown.subscribe());

    let http_task = if config.enable_http {
        let addr: SocketAddr = format!("{}:{}", config.http_bind, config.http_port)
            .parse()
            .with_context(|| format!("invalid HTTP bind address {}", config.http_bind))?;
        let server = RpcServer::new(
            addr,
            ApiState::new(replicator.clone(), &config.voter_hash_salt),
        );
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move { server.start(rx).await }))
    } else {
        None
    };

    let signal = shutdown.wait_for_signal().await;
    tracing::info!(%signal, "stopping ballotguard");

    sync_task.await?;
    if let Some(http) = http_task {
        http.await??;
    }
    follower.abort();

    let stats = ledger.stats().await?;
    tracing::info!(
        total = stats.total_votes,
        pending = stats.pending_votes,
        "ballotguard exited cleanly"
    );
    Ok(())
}

async fn status(config: ReplicatorConfig) -> anyhow::Result<()> {
    config.validate()?;
    let roster = NodeRoster::new(config.rpc_nodes()?)?;
    let monitor = NodeHealthMonitor::new(
        roster,
        Default::default(),
        config.settings().probe_timeout,
    );
    for node in monitor.roster().nodes() {
        monitor.check_health(node.as_ref()).await;
    }
    if let Err(e) = monitor.select_active_node().await {
        tracing::warn!("{e}");
    }
    print_json(&monitor.node_status())
}

async fn emergency(
    cli: &Cli,
    config: &ReplicatorConfig,
    action: &EmergencyAction,
) -> anyhow::Result<()> {
    let cipher = cipher(cli)?;
    let path = &config.emergency_path;
    if !path.exists() {
        anyhow::bail!("no emergency ledger at {}", path.display());
    }

    match action {
        EmergencyAction::Export => {
            let contents = EmergencyLedger::read_file(path, &cipher).await?;
            print_json(&contents)
        }
        EmergencyAction::Verify => {
            let votes = EmergencyLedger::verify_file(path, &cipher)
                .await
                .with_context(|| format!("verifying {}", path.display()))?;
            println!("{}: ok, {votes} votes", path.display());
            Ok(())
        }
        EmergencyAction::Stats => {
            // Opening an existing file never rewrites it.
            let election = ElectionStateMachine::new();
            let ledger = EmergencyLedger::open(path, cipher, election.subscribe()).await?;
            print_json(&ledger.stats().await?)
        }
    }
}

async fn wait_receipt(config: ReplicatorConfig, node: &str, tx_hash: &str) -> anyhow::Result<()> {
    let id = NodeId::new(node);
    let node = config
        .rpc_nodes()?
        .into_iter()
        .find(|n| n.id() == &id)
        .with_context(|| format!("node {id} is not configured"))?;
    let waiter = ReceiptWaiter::new(config.receipt_options());
    let receipt = waiter.wait_for_receipt(node.as_ref(), tx_hash).await?;
    print_json(&receipt)
}
