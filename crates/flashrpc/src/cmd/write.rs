use std::time::Instant;

use flashrpc_programmer::TransferConfig;
use tracing::info;

use crate::cmd::{Context, WriteArgs};
use crate::exit::{io_error, programmer_error, CliResult, SUCCESS};
use crate::output::{print_summary, TransferSummary};

pub async fn run(args: WriteArgs, ctx: &Context) -> CliResult<i32> {
    let started = Instant::now();
    let image = std::fs::read(&args.input)
        .map_err(|err| io_error(&format!("failed to read {}", args.input.display()), err))?;

    let mut programmer = ctx
        .programmer()?
        .with_transfer_config(TransferConfig {
            max_attempts: args.attempts,
            ..TransferConfig::default()
        })
        .with_erase_config(args.erase_timing.to_config()?);

    // Resolve the chip before touching the device.
    programmer
        .catalog()
        .lookup(&args.chip)
        .map_err(|err| programmer_error("write failed", err))?;

    if args.erase {
        programmer
            .erase()
            .await
            .map_err(|err| programmer_error("erase failed", err))?;
    }

    let mut writer = programmer
        .write(&args.chip, &image)
        .await
        .map_err(|err| programmer_error("write failed", err))?;
    let total = writer.block_count();
    while let Some(index) = writer.next().await {
        let index = index.map_err(|err| programmer_error("write failed", err))?;
        info!(block = index + 1, total, "write progress");
    }

    if args.verify {
        programmer
            .verify(&args.chip, &image)
            .await
            .map_err(|err| programmer_error("verify failed", err))?;
    }
    programmer.rpc_mut().close().await;

    let summary = TransferSummary {
        operation: "write",
        chip: Some(args.chip),
        blocks: total,
        bytes: image.len() as u64,
        path: Some(args.input.display().to_string()),
        verified: args.verify,
        elapsed_ms: started.elapsed().as_millis(),
    };
    print_summary(&summary, ctx.format);
    Ok(SUCCESS)
}
