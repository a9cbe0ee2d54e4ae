use flashrpc_peer::RpcCaller;
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::{ChipCatalog, ChipDescriptor};
use crate::config::{EraseConfig, TransferConfig};
use crate::erase::EraseController;
use crate::error::{ProgrammerError, Result};
use crate::methods::{GET_JEDEC_ID, GET_READ_BLOCK_SIZE, GET_WRITE_BLOCK_SIZE};
use crate::read::BlockReader;
use crate::write::BlockWriter;

/// Host-side driver for one programmer device.
///
/// Chip names are resolved through the catalog before the device is asked
/// anything, so an unknown chip never reaches the wire.
pub struct Programmer<R> {
    rpc: R,
    catalog: ChipCatalog,
    transfer: TransferConfig,
    erase: EraseConfig,
}

impl<R: RpcCaller> Programmer<R> {
    pub fn new(rpc: R, catalog: ChipCatalog) -> Self {
        Self {
            rpc,
            catalog,
            transfer: TransferConfig::default(),
            erase: EraseConfig::default(),
        }
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer = config;
        self
    }

    pub fn with_erase_config(mut self, config: EraseConfig) -> Self {
        self.erase = config;
        self
    }

    pub fn catalog(&self) -> &ChipCatalog {
        &self.catalog
    }

    pub fn rpc_mut(&mut self) -> &mut R {
        &mut self.rpc
    }

    pub fn into_inner(self) -> R {
        self.rpc
    }

    /// Raw JEDEC id reported by the device.
    pub async fn jedec_id(&mut self) -> Result<String> {
        match self.rpc.request(GET_JEDEC_ID, None).await? {
            Value::String(id) => Ok(id),
            other => Err(ProgrammerError::UnexpectedResult {
                method: GET_JEDEC_ID,
                value: other,
            }),
        }
    }

    /// Identify the attached chip. `Ok(None)` when the id is not catalogued.
    pub async fn detect(&mut self) -> Result<(String, Option<ChipDescriptor>)> {
        let id = self.jedec_id().await?;
        let chip = self.catalog.by_jedec_id(&id).cloned();
        match &chip {
            Some(chip) => info!(jedec_id = %id, model = %chip.model, "chip detected"),
            None => info!(jedec_id = %id, "chip not in catalog"),
        }
        Ok((id, chip))
    }

    pub async fn read_block_size(&mut self) -> Result<u64> {
        self.block_size(GET_READ_BLOCK_SIZE).await
    }

    pub async fn write_block_size(&mut self) -> Result<u64> {
        self.block_size(GET_WRITE_BLOCK_SIZE).await
    }

    /// Start reading the whole of `chip`.
    pub async fn read(&mut self, chip: &str) -> Result<BlockReader<'_, R>> {
        let config = self.transfer;
        self.reader(chip, config).await
    }

    async fn reader(&mut self, chip: &str, config: TransferConfig) -> Result<BlockReader<'_, R>> {
        let capacity = self.catalog.lookup(chip)?.capacity;
        let block_size = self.read_block_size().await?;
        if capacity % block_size != 0 {
            return Err(ProgrammerError::CapacityNotAligned {
                capacity,
                block_size,
            });
        }

        let blocks = capacity / block_size;
        debug!(chip, capacity, block_size, blocks, "read planned");
        Ok(BlockReader::new(&mut self.rpc, block_size, blocks, config))
    }

    /// Start writing `image` to `chip`.
    pub async fn write<'a>(&'a mut self, chip: &str, image: &'a [u8]) -> Result<BlockWriter<'a, R>> {
        let page_size = self.catalog.lookup(chip)?.page_size;
        let block_size = self.write_block_size().await? as usize;
        let writer = BlockWriter::new(&mut self.rpc, image, block_size, page_size, self.transfer)?;
        debug!(chip, len = image.len(), block_size, blocks = writer.block_count(), "write planned");
        Ok(writer)
    }

    /// Read the chip back, with checksums, and compare it with `image`.
    pub async fn verify(&mut self, chip: &str, image: &[u8]) -> Result<()> {
        let config = TransferConfig {
            append_crc: true,
            ..self.transfer
        };
        let mut reader = self.reader(chip, config).await?;
        let mut offset = 0usize;

        while offset < image.len() {
            let Some(block) = reader.next().await else {
                return Err(ProgrammerError::VerifyTruncated {
                    read: offset,
                    expected: image.len(),
                });
            };
            let block = block?;
            let expected = &image[offset..];
            let compared = block.payload.len().min(expected.len());
            if let Some(at) = (0..compared).find(|&i| block.payload[i] != expected[i]) {
                return Err(ProgrammerError::VerifyMismatch {
                    offset: offset + at,
                    expected: expected[at],
                    actual: block.payload[at],
                });
            }
            offset += compared;
            if block.payload.is_empty() {
                return Err(ProgrammerError::VerifyTruncated {
                    read: offset,
                    expected: image.len(),
                });
            }
        }

        info!(chip, len = image.len(), "image verified");
        Ok(())
    }

    pub fn eraser(&mut self) -> EraseController<'_, R> {
        EraseController::new(&mut self.rpc, self.erase)
    }

    /// Erase the whole chip and wait for completion.
    pub async fn erase(&mut self) -> Result<u32> {
        self.eraser().erase().await
    }

    async fn block_size(&mut self, method: &'static str) -> Result<u64> {
        let value = self.rpc.request(method, None).await?;
        match value.as_u64() {
            Some(size) if size > 0 => Ok(size),
            _ => Err(ProgrammerError::UnexpectedResult { method, value }),
        }
    }
}
