use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multisig_spend::blockchain::BlockchainClient;
use multisig_spend::btc::network::Network;
use multisig_spend::cli;
use multisig_spend::config::Config;
use multisig_spend::storage::FileStorage;
use multisig_spend::CommandResult;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "multisig.toml";

#[derive(Parser)]
#[command(name = "multisig-spend")]
#[command(about = "Combine multisig signatures and broadcast Bitcoin transactions", long_about = None)]
struct Cli {
    /// Config file (network and broadcast endpoint)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network override (mainnet, testnet)
    #[arg(long, global = true)]
    network: Option<Network>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine collected signatures and print the signed transaction
    Combine {
        /// Spend session JSON (unsigned tx, inputs, signature importers)
        #[arg(long)]
        session: PathBuf,
    },

    /// Combine signatures and broadcast the signed transaction
    Broadcast {
        /// Spend session JSON; the outcome is written back into it
        #[arg(long)]
        session: PathBuf,
    },

    /// Print the block explorer link for a transaction id
    ExplorerUrl {
        /// Transaction id (64 hex chars)
        #[arg(long)]
        txid: String,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG))?,
        None => Config::default(),
    };
    Ok(config.with_env()?)
}

fn print_result(cmd_result: &CommandResult) {
    println!("{}", cmd_result.output);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}\n", cmd_result.result);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Cli::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Combine { session } => {
            let (storage, key) = FileStorage::for_file(&session)?;
            let cmd_result = cli::combine_core(&key, &storage)?;
            print_result(&cmd_result);
        }
        Commands::Broadcast { session } => {
            let (storage, key) = FileStorage::for_file(&session)?;
            let client = BlockchainClient::from_config(&config.client)?;
            tracing::info!(client = client.kind(), "using broadcast endpoint");
            let cmd_result = cli::broadcast_core(&key, args.network, &storage, &client).await?;
            print_result(&cmd_result);
        }
        Commands::ExplorerUrl { txid } => {
            let network = args.network.unwrap_or(config.network);
            let cmd_result = cli::explorer_url_core(&txid, network)?;
            print_result(&cmd_result);
        }
    }

    Ok(())
}
