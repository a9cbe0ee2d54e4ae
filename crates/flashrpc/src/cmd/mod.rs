use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use flashrpc_peer::{connect_with_config, ClientConfig, RpcClient, UdsConnector};
use flashrpc_programmer::{ChipCatalog, Programmer, DEFAULT_MAX_ATTEMPTS};

use crate::exit::{programmer_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod chips;
pub mod detect;
pub mod erase;
pub mod read;
pub mod simulate;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify the chip attached to the programmer.
    Detect,
    /// List the chips in the catalog.
    Chips,
    /// Read the whole chip into a file.
    Read(ReadArgs),
    /// Write an image file to the chip.
    Write(WriteArgs),
    /// Erase the whole chip.
    Erase(EraseArgs),
    /// Serve a simulated programmer on the socket path.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Options shared by every command.
pub struct Context {
    pub socket: PathBuf,
    pub catalog: Option<PathBuf>,
    pub call_timeout: String,
    pub format: OutputFormat,
}

pub type DeviceProgrammer = Programmer<RpcClient<UdsConnector>>;

impl Context {
    pub fn load_catalog(&self) -> CliResult<ChipCatalog> {
        let catalog = match &self.catalog {
            Some(path) => ChipCatalog::from_path(path),
            None => ChipCatalog::builtin(),
        };
        catalog.map_err(|err| programmer_error("catalog load failed", err))
    }

    /// Programmer client for the device socket. Nothing is sent until the
    /// first command.
    pub fn programmer(&self) -> CliResult<DeviceProgrammer> {
        let catalog = self.load_catalog()?;
        let config = ClientConfig {
            call_timeout: parse_duration(&self.call_timeout)?,
            ..ClientConfig::default()
        };
        Ok(Programmer::new(
            connect_with_config(&self.socket, config),
            catalog,
        ))
    }
}

pub async fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Detect => detect::run(ctx).await,
        Command::Chips => chips::run(ctx),
        Command::Read(args) => read::run(args, ctx).await,
        Command::Write(args) => write::run(args, ctx).await,
        Command::Erase(args) => erase::run(args, ctx).await,
        Command::Simulate(args) => simulate::run(args, ctx).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Chip model from the catalog (e.g. W25Q32).
    #[arg(long, short = 'c')]
    pub chip: String,
    /// File to write the chip contents to.
    #[arg(long, short = 'o')]
    pub output: PathBuf,
    /// Attempts per block before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,
    /// Do not ask the device for per-block checksums.
    #[arg(long)]
    pub no_crc: bool,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Chip model from the catalog (e.g. W25Q32).
    #[arg(long, short = 'c')]
    pub chip: String,
    /// Image file to program.
    #[arg(long, short = 'i')]
    pub input: PathBuf,
    /// Erase the chip before writing.
    #[arg(long)]
    pub erase: bool,
    /// Read the chip back and compare after writing.
    #[arg(long)]
    pub verify: bool,
    /// Attempts per block before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,
    #[command(flatten)]
    pub erase_timing: EraseTiming,
}

#[derive(Args, Debug)]
pub struct EraseArgs {
    #[command(flatten)]
    pub timing: EraseTiming,
}

#[derive(Args, Debug)]
pub struct EraseTiming {
    /// Interval between erase completion queries (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub poll_interval: String,
    /// Give up if the erase takes longer than this. Default: wait forever.
    #[arg(long)]
    pub erase_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Catalog chip to impersonate.
    #[arg(long, short = 'c', default_value = "W25Q32")]
    pub chip: String,
    /// Bytes per read block.
    #[arg(long, default_value_t = 32 * 1024)]
    pub read_block_size: usize,
    /// Bytes per write block.
    #[arg(long, default_value_t = 2 * 1024)]
    pub write_block_size: usize,
    /// Erase status queries answered "busy" after each erase.
    #[arg(long, default_value_t = 3)]
    pub erase_polls: u32,
    /// Corrupt the checksum of the first N block reads.
    #[arg(long, default_value_t = 0)]
    pub corrupt_reads: u32,
    /// Leave the first N requests unanswered.
    #[arg(long, default_value_t = 0)]
    pub drop_replies: u32,
    /// Fail the first N block writes.
    #[arg(long, default_value_t = 0)]
    pub fail_writes: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

impl EraseTiming {
    pub fn to_config(&self) -> CliResult<flashrpc_programmer::EraseConfig> {
        Ok(flashrpc_programmer::EraseConfig {
            poll_interval: parse_duration(&self.poll_interval)?,
            timeout: self
                .erase_timeout
                .as_deref()
                .map(parse_duration)
                .transpose()?,
        })
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("40s").unwrap(), Duration::from_secs(40));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn erase_timing_defaults_to_unbounded() {
        let timing = EraseTiming {
            poll_interval: "1s".into(),
            erase_timeout: None,
        };
        let config = timing.to_config().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.timeout.is_none());
    }

    #[test]
    fn missing_catalog_file_is_reported() {
        let ctx = Context {
            socket: PathBuf::from("/tmp/flashrpc-unused.sock"),
            catalog: Some(PathBuf::from("/nonexistent/flashrpc/chips.json")),
            call_timeout: "40s".into(),
            format: OutputFormat::Json,
        };
        assert!(ctx.load_catalog().is_err());
    }
}
