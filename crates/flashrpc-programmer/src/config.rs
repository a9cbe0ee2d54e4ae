use std::time::Duration;

/// Attempts per block before a transfer is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Interval between erase completion queries.
pub const DEFAULT_ERASE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Controls block transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Attempts per block, counting the first. Default: 3.
    pub max_attempts: u32,
    /// Ask the device to append a checksum byte to every read block.
    pub append_crc: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            append_crc: true,
        }
    }
}

/// Controls erase completion polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseConfig {
    /// Delay between `programmer_erase_done` queries. Default: 1 s.
    pub poll_interval: Duration,
    /// Give up after this long. `None` polls until the device reports done.
    pub timeout: Option<Duration>,
}

impl Default for EraseConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_ERASE_POLL_INTERVAL,
            timeout: None,
        }
    }
}
