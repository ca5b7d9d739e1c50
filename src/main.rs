use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ctrleak::{spawn_server, AttackConfig, FlawedOracle, KeyRecovery, OracleClient};

const DEFAULT_TARGET: &str = "127.0.0.1:11223";
const TARGET_ENV: &str = "CTRLEAK_TARGET";

#[derive(Parser)]
#[command(
    name = "ctrleak",
    version,
    about = "Recover a CTR-encrypted secret from an oracle that reuses its key across modes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the key recovery against a target
    Attack {
        /// Target host:port (default: $CTRLEAK_TARGET, then 127.0.0.1:11223)
        #[arg(long)]
        target: Option<String>,
        /// JSON file overriding the default attack layout
        #[arg(long)]
        config: Option<PathBuf>,
        /// First ciphertext block to recover
        #[arg(long)]
        start_block: Option<usize>,
        /// One past the last ciphertext block to recover
        #[arg(long)]
        end_block: Option<usize>,
    },
    /// Serve a local toy target with the same flaw
    Serve {
        #[arg(long, default_value = DEFAULT_TARGET)]
        bind: String,
        /// Seed for the key, nonce and pin (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
        /// Pin length in bytes; must be a multiple of 16
        #[arg(long, default_value_t = 32)]
        pin_len: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Attack {
            target,
            config,
            start_block,
            end_block,
        } => attack(target, config, start_block, end_block).await,
        Command::Serve {
            bind,
            seed,
            pin_len,
        } => serve(&bind, seed, pin_len).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn attack(
    target: Option<String>,
    config_path: Option<PathBuf>,
    start_block: Option<usize>,
    end_block: Option<usize>,
) -> ctrleak::Result<()> {
    let target = target
        .or_else(|| std::env::var(TARGET_ENV).ok())
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    let mut config = match config_path {
        Some(path) => AttackConfig::from_file(&path)?,
        None => AttackConfig::default(),
    };
    if let Some(start) = start_block {
        config.start_block = start;
    }
    if end_block.is_some() {
        config.end_block = end_block;
    }

    let mut client = OracleClient::connect(target.as_str()).await?;
    let challenge = client.receive_initial().await?;
    let report = KeyRecovery::new(&mut client, challenge, config)?.run().await?;
    client.shutdown().await?;

    println!("plaintext {}", report.plaintext.escape_ascii());
    println!("pin {}", hex::encode(&report.pin));
    println!("{}", report.verdict);
    Ok(())
}

async fn serve(bind: &str, seed: Option<u64>, pin_len: usize) -> ctrleak::Result<()> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let oracle = FlawedOracle::random(&mut rng, pin_len)?;
    info!(pin = %hex::encode(oracle.pin()), "generated secret");
    let addr = spawn_server(bind, oracle).await?;
    info!(%addr, "serving, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}
