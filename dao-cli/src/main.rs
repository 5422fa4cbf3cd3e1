//! dao CLI - MySQL bootstrap and CRUD demo
//!
//! Entry point for the `dao` binary:
//! - Opens the database described by `<dir>/configs/dao.toml` and runs the
//!   sample CRUD sequence (`demo`, the default)
//! - Inspects the config file (`config` subcommand)
//! - Redacts credentials in arbitrary text (`mask`)

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod demo;
mod named;

#[derive(Parser, Debug)]
#[command(
    name = "dao",
    author,
    version,
    about = "Bootstrap a MySQL database from configs/dao.toml and run a CRUD demo"
)]
struct Cli {
    /// Base directory containing configs/dao.toml
    #[arg(long, short = 'd', global = true, default_value = ".", env = "DAO_DIR")]
    dir: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the database and run the sample CRUD sequence
    Demo,
    /// Inspect the database configuration (show, path, validate)
    Config(config::ConfigArgs),
    /// Print TEXT with datasource credentials replaced by ****
    Mask {
        /// Text that may contain a datasource string
        text: String,
    },
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Demo) {
        Commands::Demo => demo::run_demo(&cli.dir).await,
        Commands::Config(args) => config::run_config(&cli.dir, args),
        Commands::Mask { text } => {
            println!("{}", dao_core::mask_credentials(&text));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose).ok();
    dao_core::config::load_dotenv();

    if let Err(err) = run(cli).await {
        println!("{:#}", err);
        std::process::exit(1);
    }
}
