//! Block transfer protocol for remote SPI flash.
//!
//! Reads and writes a flash image in fixed-size blocks over a JSON-RPC
//! channel, validating every block with an additive checksum and retrying a
//! bounded number of times before giving up on the whole transfer.
//!
//! - [`Programmer`] resolves chips through a [`ChipCatalog`] and starts
//!   transfers.
//! - [`BlockReader`] and [`BlockWriter`] are forward-only block sequences.
//! - [`EraseController`] starts a chip erase and polls for completion.
//! - [`sim::SimulatedFlash`] implements the device side in memory.

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod erase;
pub mod error;
pub mod methods;
pub mod programmer;
pub mod read;
pub mod sim;
pub mod write;

#[cfg(test)]
mod testing;

pub use catalog::{ChipCatalog, ChipDescriptor};
pub use checksum::checksum;
pub use config::{EraseConfig, TransferConfig, DEFAULT_ERASE_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS};
pub use erase::EraseController;
pub use error::{ProgrammerError, Result};
pub use programmer::Programmer;
pub use read::{Block, BlockReader};
pub use write::BlockWriter;
