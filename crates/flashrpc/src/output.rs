use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use flashrpc_programmer::ChipDescriptor;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct ChipOutput<'a> {
    pub model: &'a str,
    pub jedec_id: &'a str,
    pub capacity: u64,
    pub page_size: u32,
    pub manufacturer: &'a str,
}

impl<'a> From<&'a ChipDescriptor> for ChipOutput<'a> {
    fn from(chip: &'a ChipDescriptor) -> Self {
        Self {
            model: &chip.model,
            jedec_id: &chip.jedec_id,
            capacity: chip.capacity,
            page_size: chip.page_size,
            manufacturer: &chip.manufacturer,
        }
    }
}

/// Outcome of a read, write or erase.
#[derive(Serialize)]
pub struct TransferSummary {
    pub operation: &'static str,
    pub chip: Option<String>,
    pub blocks: u64,
    pub bytes: u64,
    pub path: Option<String>,
    pub verified: bool,
    pub elapsed_ms: u128,
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_chips(chips: &[ChipOutput<'_>], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&chips),
        OutputFormat::Table => {
            let mut table = new_table(vec!["MODEL", "JEDEC ID", "CAPACITY", "PAGE", "MANUFACTURER"]);
            for chip in chips {
                table.add_row(vec![
                    chip.model.to_string(),
                    chip.jedec_id.to_string(),
                    human_size(chip.capacity),
                    chip.page_size.to_string(),
                    chip.manufacturer.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for chip in chips {
                println!(
                    "{} ({}) {} page={} jedec={}",
                    chip.model,
                    chip.manufacturer,
                    human_size(chip.capacity),
                    chip.page_size,
                    chip.jedec_id
                );
            }
        }
    }
}

pub fn print_summary(summary: &TransferSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = new_table(vec!["OPERATION", "CHIP", "BLOCKS", "BYTES", "FILE", "VERIFIED", "ELAPSED"]);
            table.add_row(vec![
                summary.operation.to_string(),
                summary.chip.clone().unwrap_or_else(|| "-".to_string()),
                summary.blocks.to_string(),
                summary.bytes.to_string(),
                summary.path.clone().unwrap_or_else(|| "-".to_string()),
                summary.verified.to_string(),
                format!("{} ms", summary.elapsed_ms),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            print!("{}", summary.operation);
            if let Some(chip) = &summary.chip {
                print!(" chip={chip}");
            }
            print!(" blocks={} bytes={}", summary.blocks, summary.bytes);
            if let Some(path) = &summary.path {
                print!(" file={path}");
            }
            if summary.verified {
                print!(" verified");
            }
            println!(" elapsed={}ms", summary.elapsed_ms);
        }
    }
}

pub fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_largest_exact_unit() {
        assert_eq!(human_size(4_194_304), "4 MiB");
        assert_eq!(human_size(32_768), "32 KiB");
        assert_eq!(human_size(1000), "1000 B");
    }

    #[test]
    fn summary_serializes_as_flat_object() {
        let summary = TransferSummary {
            operation: "read",
            chip: Some("W25Q32".into()),
            blocks: 128,
            bytes: 4_194_304,
            path: None,
            verified: false,
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["operation"], "read");
        assert_eq!(json["blocks"], 128);
        assert!(json["path"].is_null());
    }
}
