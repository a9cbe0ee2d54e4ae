mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, Context};
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "flashrpc", version, about = "SPI flash programmer over JSON-RPC")]
struct Cli {
    /// Programmer device socket.
    #[arg(
        long,
        value_name = "PATH",
        env = "FLASHRPC_SOCKET",
        default_value = "/tmp/flashrpc.sock",
        global = true
    )]
    socket: PathBuf,

    /// Chip catalog JSON file. Default: built-in catalog.
    #[arg(long, value_name = "PATH", env = "FLASHRPC_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// How long to wait for each device response (e.g. 40s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "40s", global = true)]
    call_timeout: String,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        socket: cli.socket,
        catalog: cli.catalog,
        call_timeout: cli.call_timeout,
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
    };

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, &ctx)));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
