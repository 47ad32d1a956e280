//! `superego` binary: CLI parsing, logging setup, exit codes.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use superego_primitives::SuperegoError;
use superego_server::{ServerConfig, TransportKind, run};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit code for fatal startup errors.
const EXIT_FATAL: u8 = 1;
/// Exit code for invalid configuration.
const EXIT_CONFIG: u8 = 2;
/// Exit code for SIGINT-initiated shutdown.
const EXIT_SIGINT: u8 = 130;

#[derive(Parser)]
#[command(name = "superego", version, about = "Inline security-policy decisions for AI coding agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the policy decision engine.
    Mcp {
        /// Transport front-end to serve.
        #[arg(short = 't', long, value_enum, default_value = "unified")]
        transport: TransportKind,

        /// Port for the HTTP/WebSocket listener.
        #[arg(short = 'p', long)]
        port: Option<u16>,
    },
}

fn init_logging() {
    // SUPEREGO_LOG_LEVEL wins; RUST_LOG is honored as a fallback. Logs go
    // to stderr so stdout stays clean for the stdio transport.
    let filter = std::env::var("SUPEREGO_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(|_| EnvFilter::new("info"), EnvFilter::new);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let Command::Mcp { transport, port } = cli.command;

    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(port) = port {
        config.set_port(port);
    }

    match run(config, transport).await {
        Ok(true) => ExitCode::from(EXIT_SIGINT),
        Ok(false) => ExitCode::SUCCESS,
        Err(err @ SuperegoError::Config { .. }) => {
            error!(error = %err, "invalid configuration");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(err) => {
            error!(error = %err, "fatal server error");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
