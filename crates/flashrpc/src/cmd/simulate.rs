use std::sync::Arc;

use flashrpc_programmer::sim::{SimConfig, SimulatedFlash};
use tracing::info;

use crate::cmd::{Context, SimulateArgs};
use crate::exit::{programmer_error, CliError, CliResult, SUCCESS, USAGE};

pub async fn run(args: SimulateArgs, ctx: &Context) -> CliResult<i32> {
    let sim = Arc::new(build_simulator(&args, ctx)?);
    serve(sim, ctx).await
}

fn build_simulator(args: &SimulateArgs, ctx: &Context) -> CliResult<SimulatedFlash> {
    let catalog = ctx.load_catalog()?;
    let chip = catalog
        .lookup(&args.chip)
        .map_err(|err| programmer_error("simulate failed", err))?;
    let capacity = usize::try_from(chip.capacity)
        .map_err(|_| CliError::new(USAGE, format!("{} is too large to simulate", chip.model)))?;

    for (name, size) in [
        ("read", args.read_block_size),
        ("write", args.write_block_size),
    ] {
        if size == 0 || capacity % size != 0 {
            return Err(CliError::new(
                USAGE,
                format!("{name} block size {size} does not divide capacity {capacity}"),
            ));
        }
    }

    let sim = SimulatedFlash::new(SimConfig {
        jedec_id: chip.jedec_hex(),
        capacity,
        read_block_size: args.read_block_size,
        write_block_size: args.write_block_size,
        erase_polls: args.erase_polls,
    });
    sim.faults().corrupt_reads(args.corrupt_reads);
    sim.faults().drop_replies(args.drop_replies);
    sim.faults().fail_writes(args.fail_writes);

    info!(
        chip = %chip.model,
        jedec_id = %sim.config().jedec_id,
        capacity,
        "simulated programmer ready"
    );
    Ok(sim)
}

#[cfg(unix)]
async fn serve(sim: Arc<SimulatedFlash>, ctx: &Context) -> CliResult<i32> {
    use flashrpc_peer::DeviceListener;

    use crate::exit::{io_error, peer_error};

    let listener =
        DeviceListener::bind(&ctx.socket).map_err(|err| peer_error("bind failed", err))?;
    info!(path = %listener.path().display(), "listening");

    tokio::select! {
        result = listener.run(sim) => {
            result.map_err(|err| peer_error("accept failed", err))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_error("signal handler setup failed", err))?;
            info!("interrupted; shutting down");
        }
    }
    Ok(SUCCESS)
}

#[cfg(not(unix))]
async fn serve(_sim: Arc<SimulatedFlash>, _ctx: &Context) -> CliResult<i32> {
    Err(CliError::new(
        USAGE,
        "simulate needs Unix domain sockets, which this platform lacks",
    ))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::output::OutputFormat;

    fn ctx() -> Context {
        Context {
            socket: PathBuf::from("/tmp/flashrpc-unused.sock"),
            catalog: None,
            call_timeout: "40s".into(),
            format: OutputFormat::Json,
        }
    }

    fn args(chip: &str, read_block_size: usize) -> SimulateArgs {
        SimulateArgs {
            chip: chip.into(),
            read_block_size,
            write_block_size: 2048,
            erase_polls: 0,
            corrupt_reads: 0,
            drop_replies: 0,
            fail_writes: 0,
        }
    }

    #[test]
    fn impersonates_catalog_chip() {
        let sim = build_simulator(&args("w25q64", 32 * 1024), &ctx()).unwrap();
        assert_eq!(sim.config().jedec_id, "ef4017");
        assert_eq!(sim.config().capacity, 8 * 1024 * 1024);
    }

    #[test]
    fn rejects_unknown_chip_and_bad_geometry() {
        assert_eq!(
            build_simulator(&args("NOPE", 4096), &ctx()).err().unwrap().code,
            USAGE
        );
        assert_eq!(
            build_simulator(&args("W25Q32", 3000), &ctx()).err().unwrap().code,
            USAGE
        );
    }
}
