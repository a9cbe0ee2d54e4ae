use serde::Serialize;

use crate::cmd::Context;
use crate::exit::{programmer_error, CliResult, SUCCESS};
use crate::output::{human_size, new_table, print_json, ChipOutput, OutputFormat};

#[derive(Serialize)]
struct DetectOutput<'a> {
    jedec_id: &'a str,
    known: bool,
    chip: Option<ChipOutput<'a>>,
}

pub async fn run(ctx: &Context) -> CliResult<i32> {
    let mut programmer = ctx.programmer()?;
    let (jedec_id, chip) = programmer
        .detect()
        .await
        .map_err(|err| programmer_error("detect failed", err))?;

    let out = DetectOutput {
        jedec_id: &jedec_id,
        known: chip.is_some(),
        chip: chip.as_ref().map(ChipOutput::from),
    };
    print_detect(&out, ctx.format);
    programmer.rpc_mut().close().await;
    Ok(SUCCESS)
}

fn print_detect(out: &DetectOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["JEDEC ID", "MODEL", "MANUFACTURER", "CAPACITY", "PAGE"]);
            match &out.chip {
                Some(chip) => table.add_row(vec![
                    out.jedec_id.to_string(),
                    chip.model.to_string(),
                    chip.manufacturer.to_string(),
                    human_size(chip.capacity),
                    chip.page_size.to_string(),
                ]),
                None => table.add_row(vec![out.jedec_id, "unknown", "-", "-", "-"]),
            };
            println!("{table}");
        }
        OutputFormat::Pretty => match &out.chip {
            Some(chip) => println!(
                "{} {} ({}), {}",
                out.jedec_id,
                chip.model,
                chip.manufacturer,
                human_size(chip.capacity)
            ),
            None => println!("{} (not in catalog)", out.jedec_id),
        },
    }
}
