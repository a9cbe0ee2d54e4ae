//! Additive single-byte checksum.

/// Sum of `payload` modulo 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

/// Append the checksum of `payload` to it.
pub fn append_checksum(payload: &mut Vec<u8>) {
    let sum = checksum(payload);
    payload.push(sum);
}

/// Split a block whose last byte is a checksum.
///
/// Returns the payload and checksum if the checksum matches, `None` if it
/// does not or the block is empty.
pub fn split_checked(block: &[u8]) -> Option<(&[u8], u8)> {
    let (claimed, payload) = block.split_last()?;
    (checksum(payload) == *claimed).then_some((payload, *claimed))
}
