use std::time::Instant;

use crate::cmd::{Context, EraseArgs};
use crate::exit::{programmer_error, CliResult, SUCCESS};
use crate::output::{print_summary, TransferSummary};

pub async fn run(args: EraseArgs, ctx: &Context) -> CliResult<i32> {
    let started = Instant::now();
    let mut programmer = ctx.programmer()?.with_erase_config(args.timing.to_config()?);

    programmer
        .erase()
        .await
        .map_err(|err| programmer_error("erase failed", err))?;
    programmer.rpc_mut().close().await;

    let summary = TransferSummary {
        operation: "erase",
        chip: None,
        blocks: 0,
        bytes: 0,
        path: None,
        verified: false,
        elapsed_ms: started.elapsed().as_millis(),
    };
    print_summary(&summary, ctx.format);
    Ok(SUCCESS)
}
