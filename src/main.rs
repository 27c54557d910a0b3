use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rawrpc::config::AppConfig;
use rawrpc::logging::{self, LogConfig};
use rawrpc::{RpcClient, RpcServer, Value, builtin};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "rawrpc")]
#[command(about = "XML-RPC over raw TCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./rawrpc.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo methods until Ctrl-C
    Serve(ServerArgs),
    /// Call a remote method; arguments are parsed as JSON, falling back to strings
    Call(CallArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Serialize)]
struct ServerArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    backlog: Option<u32>,
}

#[derive(Args, Serialize)]
struct CallArgs {
    #[serde(skip)]
    method: String,

    #[serde(skip)]
    args: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    let mut config = match &cli.command {
        Commands::Serve(args) => AppConfig::new(config_file, "server", Some(args)),
        Commands::Call(args) => AppConfig::new(config_file, "client", Some(args)),
        Commands::Config => AppConfig::new::<()>(config_file, "server", None),
    }
    .context("Failed to load configuration")?;
    config.log.verbose |= cli.verbose;
    config.log.json |= cli.json_logs;

    match &cli.command {
        Commands::Serve(_) => {
            logging::init(LogConfig::from(&config.log));
            run_server(config).await.context("Server failed")?
        }
        Commands::Call(args) => {
            logging::init(LogConfig::from(&config.log));
            run_call(config, args).await.context("Call failed")?
        }
        Commands::Config => print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to render configuration")?
        ),
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let mut server = RpcServer::bind(&config.server).await?;
    server.add_methods(&builtin::methods());

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt");
            handle.shutdown();
        }
    });

    server.serve().await?;
    Ok(())
}

async fn run_call(config: AppConfig, args: &CallArgs) -> Result<()> {
    let params = args.args.iter().map(|arg| parse_arg(arg)).collect();

    let client = RpcClient::with_config(config.client);
    let result: Value = client.call(&args.method, params).await?;

    let json = serde_json::Value::from(result);
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// `3` is an int, `"3"` and `abc` are strings, `[1,2]` is an array.
fn parse_arg(arg: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(arg) {
        Ok(json) => Value::from(json),
        Err(_) => Value::from(arg),
    }
}
