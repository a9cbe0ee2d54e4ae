use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "FR" (0x46 0x52).
pub const MAGIC: [u8; 2] = [0x46, 0x52];

/// Default maximum payload size: 4 MiB.
///
/// Comfortably above a base64-encoded 32 KiB block plus envelope overhead.
pub const DEFAULT_MAX_PAYLOAD: usize = 4 * 1024 * 1024;

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Payload          │
/// │ 0x46 0x52    │ (4B LE)  │ (Length bytes)   │
/// │ "FR"         │          │                  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::Oversized {
            len: payload.len(),
            limit: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame payload from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::BadMagic {
            found: [src[0], src[1]],
        });
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::Oversized {
            len: payload_len,
            limit: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 4 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// `tokio_util` codec over [`encode_frame`]/[`decode_frame`].
///
/// Wrap an `IpcStream` in `Framed::new(stream, FrameCodec::default())` to
/// get a `Stream` of payloads and a `Sink` accepting payloads.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                tracing::debug!(buffered = src.len(), "stream ended mid-frame");
                Err(FrameError::Truncated {
                    buffered: src.len(),
                })
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_payload_size {
            return Err(FrameError::Oversized {
                len: item.len(),
                limit: self.config.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use flashrpc_transport::IpcStream;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{Framed, FramedRead};

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = br#"{"jsonrpc":"2.0","id":1,"result":true}"#;

        encode_frame(payload, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x46, 0x52, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::BadMagic { found: [0x49, 0x50] })
        ));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::Oversized { .. })));
    }

    #[test]
    fn test_multiple_frames_stay_in_order() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn encoder_enforces_configured_limit() {
        let mut codec = FrameCodec::with_config(FrameConfig {
            max_payload_size: 4,
        });
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(b"too long"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::Oversized { len: 8, limit: 4 }));
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_stream_carries_messages_over_pipe() {
        let (host, device) = IpcStream::pair(1024);
        let mut host = Framed::new(host, FrameCodec::default());
        let mut device = Framed::new(device, FrameCodec::default());

        host.send(Bytes::from_static(b"one")).await.unwrap();
        host.send(Bytes::from_static(b"two")).await.unwrap();

        let first = device.next().await.unwrap().unwrap();
        let second = device.next().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"one");
        assert_eq!(second.as_ref(), b"two");
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncated() {
        let (mut host, device) = IpcStream::pair(1024);
        let mut partial = BytesMut::new();
        encode_frame(b"truncated payload", &mut partial).unwrap();
        host.write_all(&partial[..HEADER_SIZE + 3]).await.unwrap();
        drop(host);

        let mut reader = FramedRead::new(device, FrameCodec::default());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { buffered: 9 }));
    }

    #[tokio::test]
    async fn clean_eof_ends_stream() {
        let (host, device) = IpcStream::pair(1024);
        drop(host);

        let mut reader = FramedRead::new(device, FrameCodec::default());
        assert!(reader.next().await.is_none());
    }
}
