use std::time::Instant;

use flashrpc_programmer::TransferConfig;
use tracing::info;

use crate::cmd::{Context, ReadArgs};
use crate::exit::{io_error, programmer_error, CliResult, SUCCESS};
use crate::output::{print_summary, TransferSummary};

pub async fn run(args: ReadArgs, ctx: &Context) -> CliResult<i32> {
    let started = Instant::now();
    let mut programmer = ctx.programmer()?.with_transfer_config(TransferConfig {
        max_attempts: args.attempts,
        append_crc: !args.no_crc,
    });

    let mut reader = programmer
        .read(&args.chip)
        .await
        .map_err(|err| programmer_error("read failed", err))?;
    let total = reader.block_count();
    let mut image = Vec::new();
    while let Some(block) = reader.next().await {
        let block = block.map_err(|err| programmer_error("read failed", err))?;
        image.extend_from_slice(&block.payload);
        info!(block = block.index + 1, total, "read progress");
    }

    std::fs::write(&args.output, &image)
        .map_err(|err| io_error(&format!("failed to write {}", args.output.display()), err))?;
    programmer.rpc_mut().close().await;

    let summary = TransferSummary {
        operation: "read",
        chip: Some(args.chip),
        blocks: total,
        bytes: image.len() as u64,
        path: Some(args.output.display().to_string()),
        verified: false,
        elapsed_ms: started.elapsed().as_millis(),
    };
    print_summary(&summary, ctx.format);
    Ok(SUCCESS)
}
