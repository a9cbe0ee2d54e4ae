use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flashrpc_peer::RpcCaller;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::checksum::split_checked;
use crate::config::TransferConfig;
use crate::error::{ProgrammerError, Result};
use crate::methods::READ_BLOCK;

/// One validated block of chip contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    /// Block data with the checksum byte removed.
    pub payload: Vec<u8>,
    /// Checksum sent by the device, if one was requested.
    pub checksum: Option<u8>,
}

/// Forward-only sequence of chip blocks.
///
/// Each call to [`next`](Self::next) reads one block, retrying up to
/// `max_attempts` times on transport failures, malformed data, checksum
/// mismatch or a payload of the wrong length. A payload is either a full
/// block or one byte short of it when the device counts the checksum inside
/// the block. After an error or the last block the reader only yields `None`.
pub struct BlockReader<'a, R> {
    rpc: &'a mut R,
    block_size: u64,
    block_count: u64,
    next_index: u64,
    config: TransferConfig,
    finished: bool,
}

impl<'a, R: RpcCaller> BlockReader<'a, R> {
    pub fn new(rpc: &'a mut R, block_size: u64, block_count: u64, config: TransferConfig) -> Self {
        Self {
            rpc,
            block_size,
            block_count,
            next_index: 0,
            config,
            finished: false,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Index of the block the next call will read.
    pub fn position(&self) -> u64 {
        self.next_index
    }

    pub async fn next(&mut self) -> Option<Result<Block>> {
        if self.finished || self.next_index >= self.block_count {
            self.finished = true;
            return None;
        }

        let index = self.next_index;
        match self.read_block(index).await {
            Ok(block) => {
                self.next_index += 1;
                Some(Ok(block))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }

    /// Read every remaining block into one buffer.
    pub async fn read_all(mut self) -> Result<Vec<u8>> {
        let remaining = self.block_count.saturating_sub(self.next_index);
        let mut image = Vec::with_capacity((remaining * self.block_size) as usize);
        while let Some(block) = self.next().await {
            image.extend_from_slice(&block?.payload);
        }
        Ok(image)
    }

    async fn read_block(&mut self, index: u64) -> Result<Block> {
        let attempts = self.config.max_attempts.max(1);
        let append_crc = self.config.append_crc;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let params = json!({ "block_id": index, "append_crc": append_crc });
            let result = match self.rpc.request(READ_BLOCK, Some(params)).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(block = index, attempt, error = %err, "block read failed");
                    last_error = err.to_string();
                    continue;
                }
            };

            match decode_block(&result, append_crc, self.block_size) {
                Ok((payload, checksum)) => {
                    debug!(block = index, attempt, len = payload.len(), "block read");
                    return Ok(Block {
                        index,
                        payload,
                        checksum,
                    });
                }
                Err(reason) => {
                    warn!(block = index, attempt, %reason, "block rejected");
                    last_error = reason;
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

fn decode_block(
    result: &Value,
    checked: bool,
    block_size: u64,
) -> std::result::Result<(Vec<u8>, Option<u8>), String> {
    let encoded = result
        .as_str()
        .ok_or_else(|| format!("expected base64 string, got {result}"))?;
    let mut raw = STANDARD
        .decode(encoded)
        .map_err(|err| format!("invalid base64: {err}"))?;

    let sum = if checked {
        let sum = split_checked(&raw)
            .map(|(_, sum)| sum)
            .ok_or_else(|| "checksum mismatch".to_string())?;
        raw.pop();
        Some(sum)
    } else {
        None
    };

    let len = raw.len() as u64;
    if len != block_size && len + 1 != block_size {
        return Err(format!("block length {len}, expected {block_size}"));
    }
    Ok((raw, sum))
}
