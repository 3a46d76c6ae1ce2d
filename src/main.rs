//! `valkey` command line entry point

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;
use valkey_iam_client::config::{ClientSettings, SettingsOverrides};

#[derive(Parser, Debug)]
#[command(name = "valkey", author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch valkey client
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Config file in YAML format (optional)
    #[arg(long, env = "VALKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Valkey discovery address [default: localhost:8001]
    #[arg(long, env = "VALKEY_ADDR")]
    addr: Option<String>,

    /// Valkey TLS root CA in PEM format (repeatable)
    #[arg(long = "root-ca", visible_alias = "rootCAs", env = "VALKEY_ROOTCAS")]
    root_cas: Vec<String>,

    /// Principal presented with the token [default: default]
    #[arg(long, env = "VALKEY_PRINCIPAL")]
    principal: Option<String>,

    /// OAuth scope requested for the token (repeatable)
    #[arg(long = "scope", env = "VALKEY_SCOPE", value_delimiter = ',')]
    scopes: Vec<String>,

    /// Key written and read back [default: key]
    #[arg(long, env = "VALKEY_KEY")]
    key: Option<String>,

    /// Value written [default: OK]
    #[arg(long, env = "VALKEY_VALUE")]
    value: Option<String>,

    /// Seconds between iterations [default: 1]
    #[arg(long, env = "VALKEY_INTERVAL")]
    interval: Option<u64>,

    /// Stop after this many iterations instead of running forever
    #[arg(long, env = "VALKEY_ITERATIONS")]
    iterations: Option<u64>,
}

impl ClientArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            addr: self.addr.clone(),
            root_cas: self.root_cas.clone(),
            principal: self.principal.clone(),
            scopes: self.scopes.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            interval: self.interval,
            iterations: self.iterations,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Client(args) => {
            let settings = ClientSettings::resolve(args.config.as_deref(), args.overrides())
                .context("invalid client configuration")?;

            valkey_iam_client::client::run(&settings).await?;
        }
    }

    Ok(())
}
