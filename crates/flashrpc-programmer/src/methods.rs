//! RPC method names implemented by the device.

pub const GET_JEDEC_ID: &str = "get_jedec_id";
pub const GET_READ_BLOCK_SIZE: &str = "get_read_block_size";
pub const GET_WRITE_BLOCK_SIZE: &str = "get_write_block_size";
pub const READ_BLOCK: &str = "programmer_read_block";
pub const WRITE_BLOCK: &str = "programmer_write_block";
pub const START_ERASE_CHIP: &str = "programmer_start_erase_chip";
pub const ERASE_DONE: &str = "programmer_erase_done";
