//! SimTrace RPC Proxy Server
//!
//! Relays JSON-RPC traffic to one node and simulates every `eth_call`
//! against the state overrides loaded from a JSON file.

use clap::{Parser, Subcommand};
use eyre::Result;
use simtrace_common::init_logging;
use simtrace_sim::OverrideSet;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};
use tracing::info;

use simtrace_rpc_proxy::proxy::ProxyServerBuilder;

/// SimTrace state-override RPC proxy
#[derive(Parser, Debug)]
#[command(name = "simtrace-rpc-proxy")]
#[command(about = "JSON-RPC proxy that simulates eth_call against state overrides")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (repeat for more: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start RPC proxy server
    Server(ServerArgs),
}

/// Server mode arguments
#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind to
    /// Example: --host 0.0.0.0
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8546")]
    port: u16,

    /// Upstream node RPC URL
    /// Example: --upstream http://localhost:8545
    #[arg(long, env = "SIMTRACE_UPSTREAM")]
    upstream: String,

    /// JSON file mapping addresses to account overrides
    /// Example: {"0x…": {"balance": "0xde0b6b3a7640000", "nonce": "0x1"}}
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Upstream request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Also write logs to a daily rolling file in the temp directory
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set RUST_LOG based on verbosity
    if std::env::var("RUST_LOG").is_err() {
        let level = match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
    }
}

/// Run the RPC proxy server
async fn run_server(args: ServerArgs) -> Result<()> {
    init_logging("simtrace-rpc-proxy", args.log_file)?;

    let overrides = match &args.overrides {
        Some(path) => OverrideSet::from_json_file(path)?,
        None => {
            info!("No override file given, eth_call will see real chain state");
            OverrideSet::new()
        }
    };

    let proxy = ProxyServerBuilder::new()
        .upstream(args.upstream)
        .overrides(overrides)
        .request_timeout(args.request_timeout)
        .build()
        .await?;

    let ip = IpAddr::from_str(&args.host)?;
    let addr = SocketAddr::from((ip, args.port));

    info!("Starting SimTrace RPC Proxy on {}", addr);

    tokio::select! {
        result = proxy.serve(addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
