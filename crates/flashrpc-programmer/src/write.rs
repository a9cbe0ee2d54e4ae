use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flashrpc_peer::RpcCaller;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::checksum::checksum;
use crate::config::TransferConfig;
use crate::error::{ProgrammerError, Result};
use crate::methods::WRITE_BLOCK;

/// Forward-only sequence of block writes over an image.
///
/// [`next`](Self::next) writes one block and yields its index. Every block
/// carries its checksum so the device can read it back before answering.
pub struct BlockWriter<'a, R> {
    rpc: &'a mut R,
    image: &'a [u8],
    block_size: usize,
    page_size: u32,
    next_index: u64,
    config: TransferConfig,
    finished: bool,
}

impl<'a, R: RpcCaller> BlockWriter<'a, R> {
    /// Fails with [`ProgrammerError::LengthMismatch`] unless the image splits
    /// into whole blocks. No device call is made in that case.
    pub fn new(
        rpc: &'a mut R,
        image: &'a [u8],
        block_size: usize,
        page_size: u32,
        config: TransferConfig,
    ) -> Result<Self> {
        if block_size == 0 || image.len() % block_size != 0 {
            return Err(ProgrammerError::LengthMismatch {
                len: image.len(),
                block_size,
            });
        }
        Ok(Self {
            rpc,
            image,
            block_size,
            page_size,
            next_index: 0,
            config,
            finished: false,
        })
    }

    pub fn block_count(&self) -> u64 {
        (self.image.len() / self.block_size) as u64
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Index of the block the next call will write.
    pub fn position(&self) -> u64 {
        self.next_index
    }

    pub async fn next(&mut self) -> Option<Result<u64>> {
        if self.finished || self.next_index >= self.block_count() {
            self.finished = true;
            return None;
        }

        let index = self.next_index;
        match self.write_block(index).await {
            Ok(()) => {
                self.next_index += 1;
                Some(Ok(index))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }

    /// Write every remaining block; returns how many were written.
    pub async fn write_all(mut self) -> Result<u64> {
        let mut written = 0;
        while let Some(result) = self.next().await {
            result?;
            written += 1;
        }
        Ok(written)
    }

    async fn write_block(&mut self, index: u64) -> Result<()> {
        let start = index as usize * self.block_size;
        let chunk = &self.image[start..start + self.block_size];
        let crc = checksum(chunk);
        let data = STANDARD.encode(chunk);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let params = json!({
                "block_id": index,
                "chip_page_size": self.page_size,
                "data": data,
                "crc": crc,
            });
            match self.rpc.request(WRITE_BLOCK, Some(params)).await {
                Ok(result) => match reported_checksum(&result) {
                    Some(reported) if reported != u64::from(crc) => {
                        warn!(block = index, attempt, expected = crc, reported, "device checksum differs");
                        last_error =
                            format!("device reported checksum {reported:#04x}, sent {crc:#04x}");
                    }
                    _ => {
                        debug!(block = index, attempt, "block written");
                        return Ok(());
                    }
                },
                Err(err) => {
                    warn!(block = index, attempt, error = %err, "block write failed");
                    last_error = err.to_string();
                }
            }
        }

        Err(ProgrammerError::RetriesExhausted {
            block: index,
            attempts,
            last_error,
        })
    }
}

/// The device answers a write with its checksum, usually as a hex string
/// (`"0x1f"`), sometimes as a plain number. Anything else is not a checksum.
fn reported_checksum(result: &Value) -> Option<u64> {
    match result {
        Value::Number(n) => n.as_u64(),
        Value::String(text) => {
            let hex = text.strip_prefix("0x").unwrap_or(text);
            u64::from_str_radix(hex, 16).ok()
        }
        _ => None,
    }
}
