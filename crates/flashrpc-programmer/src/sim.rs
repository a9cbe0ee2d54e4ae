//! In-memory programmer device.
//!
//! [`SimulatedFlash`] answers the same methods as the device firmware over
//! any channel the peer crate can serve: a loopback pipe in tests or a Unix
//! socket under `flashrpc simulate`. Faults can be armed to exercise the
//! host's retry paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flashrpc_envelope::{ErrorObject, Params};
use flashrpc_peer::{MethodHandler, Reply};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::checksum::checksum;
use crate::methods::{
    ERASE_DONE, GET_JEDEC_ID, GET_READ_BLOCK_SIZE, GET_WRITE_BLOCK_SIZE, READ_BLOCK,
    START_ERASE_CHIP, WRITE_BLOCK,
};

const ERASED: u8 = 0xFF;

/// Geometry and timing of the simulated chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Reported by `get_jedec_id`: lowercase hex, no prefix.
    pub jedec_id: String,
    pub capacity: usize,
    pub read_block_size: usize,
    pub write_block_size: usize,
    /// `programmer_erase_done` answers `false` this many times after an
    /// erase starts.
    pub erase_polls: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            jedec_id: "ef4016".to_string(),
            capacity: 4 * 1024 * 1024,
            read_block_size: 32 * 1024,
            write_block_size: 2 * 1024,
            erase_polls: 3,
        }
    }
}

/// One-shot faults, each consumed by the next matching request.
#[derive(Debug, Default)]
pub struct Faults {
    corrupt_reads: AtomicU32,
    dropped_replies: AtomicU32,
    failed_writes: AtomicU32,
}

impl Faults {
    /// Send a wrong checksum on the next `count` block reads.
    pub fn corrupt_reads(&self, count: u32) {
        self.corrupt_reads.fetch_add(count, Ordering::SeqCst);
    }

    /// Do not answer the next `count` requests.
    pub fn drop_replies(&self, count: u32) {
        self.dropped_replies.fetch_add(count, Ordering::SeqCst);
    }

    /// Fail the next `count` block writes with a device error.
    pub fn fail_writes(&self, count: u32) {
        self.failed_writes.fetch_add(count, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// NOR flash held in memory. Programming can only clear bits; erase sets
/// every byte back to `0xFF`.
pub struct SimulatedFlash {
    config: SimConfig,
    memory: Mutex<Vec<u8>>,
    erase_remaining: Mutex<Option<u32>>,
    faults: Faults,
    calls: Mutex<Vec<String>>,
}

impl SimulatedFlash {
    pub fn new(config: SimConfig) -> Self {
        let memory = vec![ERASED; config.capacity];
        Self {
            config,
            memory: Mutex::new(memory),
            erase_remaining: Mutex::new(None),
            faults: Faults::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Every method name received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Copy of the whole chip.
    pub fn snapshot(&self) -> Vec<u8> {
        lock(&self.memory).clone()
    }

    fn read_block(&self, params: &Params) -> Reply {
        let block_id = match optional_index(params, "block_id") {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let append_crc = params
            .get("append_crc")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let size = self.config.read_block_size;
        let Some(start) = block_start(block_id, size, self.config.capacity) else {
            return Reply::Error(ErrorObject::invalid_params(format!(
                "block {block_id} is beyond the end of the chip"
            )));
        };

        let mut data = lock(&self.memory)[start..start + size].to_vec();
        if append_crc {
            let mut crc = checksum(&data);
            if Faults::take(&self.faults.corrupt_reads) {
                warn!(block = block_id, "injecting read checksum fault");
                crc = crc.wrapping_add(1);
            }
            data.push(crc);
        }
        debug!(block = block_id, len = data.len(), "block read");
        Reply::Result(Value::String(STANDARD.encode(&data)))
    }

    fn write_block(&self, params: &Params) -> Reply {
        let block_id = match optional_index(params, "block_id") {
            Ok(id) => id,
            Err(reply) => return reply,
        };
        let Some(encoded) = params.get("data").and_then(Value::as_str) else {
            return Reply::Error(ErrorObject::invalid_params("No data provided for writing."));
        };
        let Ok(data) = STANDARD.decode(encoded) else {
            return Reply::Error(ErrorObject::invalid_params("Invalid base64 data provided."));
        };
        let size = self.config.write_block_size;
        if data.len() != size {
            return Reply::Error(ErrorObject::invalid_params(format!(
                "Data length ({}) does not match expected block size ({size}).",
                data.len()
            )));
        }
        let page_size = match params.get("chip_page_size").and_then(Value::as_u64) {
            Some(page) if page > 0 => page as usize,
            _ => return Reply::Error(ErrorObject::invalid_params("chip_page_size must be a positive integer")),
        };
        let Some(start) = block_start(block_id, size, self.config.capacity) else {
            return Reply::Error(ErrorObject::invalid_params(format!(
                "block {block_id} is beyond the end of the chip"
            )));
        };
        if Faults::take(&self.faults.failed_writes) {
            warn!(block = block_id, "injecting write fault");
            return Reply::Error(ErrorObject::internal(format!(
                "Verification failed for block {block_id}."
            )));
        }

        let mut memory = lock(&self.memory);
        for (page, chunk) in data.chunks(page_size).enumerate() {
            let base = start + page * page_size;
            for (cell, byte) in memory[base..base + chunk.len()].iter_mut().zip(chunk) {
                *cell &= *byte;
            }
        }

        if let Some(expected) = params.get("crc") {
            let actual = checksum(&memory[start..start + size]);
            if expected.as_u64() != Some(u64::from(actual)) {
                warn!(block = block_id, %expected, actual, "write verification failed");
                return Reply::Error(ErrorObject::internal(format!(
                    "Verification failed for block {block_id}."
                )));
            }
        }
        debug!(block = block_id, "block written");
        Reply::Result(json!(format!("{:#x}", checksum(&data))))
    }

    fn start_erase(&self) -> Reply {
        lock(&self.memory).fill(ERASED);
        *lock(&self.erase_remaining) = Some(self.config.erase_polls);
        info!("chip erase started");
        Reply::Result(json!("Chip erase started."))
    }

    fn erase_done(&self) -> Reply {
        let mut remaining = lock(&self.erase_remaining);
        match *remaining {
            Some(polls) if polls > 0 => {
                *remaining = Some(polls - 1);
                Reply::Result(json!(false))
            }
            _ => {
                *remaining = None;
                Reply::Result(json!(true))
            }
        }
    }
}

impl MethodHandler for SimulatedFlash {
    fn handle(&self, method: &str, params: &Params) -> Reply {
        lock(&self.calls).push(method.to_string());
        if Faults::take(&self.faults.dropped_replies) {
            warn!(method, "dropping reply");
            return Reply::Silent;
        }

        match method {
            GET_JEDEC_ID => Reply::Result(json!(self.config.jedec_id)),
            GET_READ_BLOCK_SIZE => Reply::Result(json!(self.config.read_block_size)),
            GET_WRITE_BLOCK_SIZE => Reply::Result(json!(self.config.write_block_size)),
            READ_BLOCK => self.read_block(params),
            WRITE_BLOCK => self.write_block(params),
            START_ERASE_CHIP => self.start_erase(),
            ERASE_DONE => self.erase_done(),
            _ => Reply::Error(ErrorObject::method_not_found(method)),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A missing index means block 0.
fn optional_index(params: &Params, key: &str) -> Result<u64, Reply> {
    match params.get(key) {
        None => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            Reply::Error(ErrorObject::invalid_params(format!(
                "{key} must be a non-negative integer, got {value}"
            )))
        }),
    }
}

fn block_start(block_id: u64, size: usize, capacity: usize) -> Option<usize> {
    let start = usize::try_from(block_id).ok()?.checked_mul(size)?;
    (start.checked_add(size)? <= capacity).then_some(start)
}

#[cfg(test)]
mod tests {
    use flashrpc_envelope::ErrorCode;
    use serde_json::Map;

    use super::*;
    use crate::checksum::split_checked;

    fn small() -> SimulatedFlash {
        SimulatedFlash::new(SimConfig {
            jedec_id: "ef4016".into(),
            capacity: 64,
            read_block_size: 16,
            write_block_size: 8,
            erase_polls: 1,
        })
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => Params::from(map),
            _ => Params::from(Map::new()),
        }
    }

    fn result(reply: Reply) -> Value {
        match reply {
            Reply::Result(value) => value,
            other => panic!("expected result, got {other:?}"),
        }
    }

    fn error(reply: Reply) -> ErrorObject {
        match reply {
            Reply::Error(error) => error,
            other => panic!("expected error, got {other:?}"),
        }
    }

    fn write(sim: &SimulatedFlash, block: u64, data: &[u8], crc: Option<u8>) -> Reply {
        let mut args = json!({
            "block_id": block,
            "chip_page_size": 4,
            "data": STANDARD.encode(data),
        });
        if let Some(crc) = crc {
            args["crc"] = json!(crc);
        }
        sim.handle(WRITE_BLOCK, &params(args))
    }

    #[test]
    fn starts_erased_and_reads_with_checksum() {
        let sim = small();
        let encoded = result(sim.handle(READ_BLOCK, &params(json!({"block_id": 1, "append_crc": true}))));
        let raw = STANDARD.decode(encoded.as_str().unwrap()).unwrap();
        assert_eq!(raw.len(), 17);
        let (payload, _) = split_checked(&raw).expect("checksum should match");
        assert!(payload.iter().all(|&b| b == ERASED));
    }

    #[test]
    fn read_defaults_to_block_zero_without_checksum() {
        let sim = small();
        let encoded = result(sim.handle(READ_BLOCK, &Params::None));
        assert_eq!(STANDARD.decode(encoded.as_str().unwrap()).unwrap().len(), 16);
    }

    #[test]
    fn write_returns_hex_checksum_and_lands_in_memory() {
        let sim = small();
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let reply = result(write(&sim, 2, &data, Some(checksum(&data))));
        assert_eq!(reply, json!("0x24"));
        assert_eq!(&sim.snapshot()[16..24], &data);
    }

    #[test]
    fn programming_over_written_data_fails_verification() {
        let sim = small();
        write(&sim, 0, &[0x0F; 8], None);
        let err = error(write(&sim, 0, &[0xF0; 8], Some(checksum(&[0xF0; 8]))));
        assert_eq!(err.kind(), ErrorCode::InternalError);
        assert_eq!(err.data, Some(json!("Verification failed for block 0.")));
        assert_eq!(&sim.snapshot()[..8], &[0x00; 8]);
    }

    #[test]
    fn wrong_length_and_bad_base64_are_invalid_params() {
        let sim = small();
        assert_eq!(error(write(&sim, 0, &[0; 7], None)).kind(), ErrorCode::InvalidParams);
        let bad = sim.handle(
            WRITE_BLOCK,
            &params(json!({"block_id": 0, "chip_page_size": 4, "data": "!!"})),
        );
        assert_eq!(error(bad).kind(), ErrorCode::InvalidParams);
        let beyond = sim.handle(READ_BLOCK, &params(json!({"block_id": 4})));
        assert_eq!(error(beyond).kind(), ErrorCode::InvalidParams);
    }

    #[test]
    fn erase_reports_busy_then_done() {
        let sim = small();
        write(&sim, 0, &[0; 8], None);
        assert_eq!(result(sim.handle(START_ERASE_CHIP, &Params::None)), json!("Chip erase started."));
        assert_eq!(result(sim.handle(ERASE_DONE, &Params::None)), json!(false));
        assert_eq!(result(sim.handle(ERASE_DONE, &Params::None)), json!(true));
        assert_eq!(result(sim.handle(ERASE_DONE, &Params::None)), json!(true));
        assert!(sim.snapshot().iter().all(|&b| b == ERASED));
    }

    #[test]
    fn faults_fire_once_each() {
        let sim = small();
        sim.faults().drop_replies(1);
        sim.faults().fail_writes(1);

        assert_eq!(sim.handle(GET_JEDEC_ID, &Params::None), Reply::Silent);
        assert_eq!(result(sim.handle(GET_JEDEC_ID, &Params::None)), json!("ef4016"));
        assert_eq!(error(write(&sim, 0, &[0; 8], None)).kind(), ErrorCode::InternalError);
        result(write(&sim, 0, &[0; 8], None));
        assert_eq!(sim.calls().len(), 4);
    }

    #[test]
    fn unknown_method_is_not_found() {
        let sim = small();
        assert_eq!(
            error(sim.handle("erase_sector", &Params::None)).kind(),
            ErrorCode::MethodNotFound
        );
    }
}
