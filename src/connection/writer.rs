//! Frame writer: header assembly, client-side masking, one transport write
//! per frame.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{header, mask, OpCode, NORMAL_CLOSURE};

/// A close reason is capped so the control frame stays within 125 bytes.
const MAX_CLOSE_REASON: usize = 123;

pub(crate) struct FrameWriter<W> {
    io: W,
    /// Scratch arena, reset to length zero between frames.
    buf: Vec<u8>,
    /// Clients mask egress; servers do not.
    mask_egress: bool,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub(crate) fn new(io: W, mask_egress: bool, config: &Config) -> Self {
        Self {
            io,
            buf: Vec::with_capacity(config.write_buffer_size),
            mask_egress,
            closed: false,
        }
    }

    /// A fresh cryptographically random masking key, when this side masks.
    fn fresh_key(&self) -> Result<Option<[u8; 4]>> {
        if !self.mask_egress {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        getrandom::getrandom(&mut key).map_err(std::io::Error::from)?;
        Ok(Some(key))
    }

    /// Compose and send one frame. Returns the payload byte count on
    /// success.
    pub(crate) async fn write_frame(
        &mut self,
        payload: &[u8],
        op: OpCode,
        fin: bool,
    ) -> Result<usize> {
        let key = self.fresh_key()?;

        self.buf.clear();
        header::encode_header(op, fin, key, payload.len(), &mut self.buf)?;
        let header_len = self.buf.len();
        self.buf.extend_from_slice(payload);
        if let Some(key) = key {
            mask::apply_mask(&mut self.buf[header_len..], key, 0);
        }

        match self.io.write_all(&self.buf).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WriteZero => {
                return Err(Error::ShortWrite);
            }
            Err(e) => return Err(Error::Io(e)),
        }
        self.io.flush().await?;
        Ok(payload.len())
    }

    /// Send a Close frame carrying `status` (1000 when zero) and `reason`.
    /// Does nothing if the write side already closed.
    pub(crate) async fn close_writer(&mut self, status: u16, reason: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let status = if status == 0 { NORMAL_CLOSURE } else { status };
        let reason = &reason.as_bytes()[..reason.len().min(MAX_CLOSE_REASON)];
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&status.to_be_bytes());
        payload.extend_from_slice(reason);

        debug!(status, "sending close");
        self.write_frame(&payload, OpCode::Close, true).await?;
        Ok(())
    }

    /// Best-effort empty Close frame, then transport shutdown. The shutdown
    /// happens whether or not the frame went out; the first failure wins.
    pub(crate) async fn close(&mut self) -> Result<()> {
        let frame_res = if self.closed {
            Ok(0)
        } else {
            self.closed = true;
            self.write_frame(&[], OpCode::Close, true).await
        };

        let shutdown_res = self.io.shutdown().await;

        frame_res?;
        shutdown_res?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::apply_mask;

    fn writer(mask_egress: bool) -> FrameWriter<Vec<u8>> {
        FrameWriter::new(Vec::new(), mask_egress, &Config::new())
    }

    #[tokio::test]
    async fn test_unmasked_text_frame() {
        let mut w = writer(false);
        let n = w.write_frame(b"Hello", OpCode::Text, true).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(w.io, [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn test_masked_frame_structure() {
        let mut w = writer(true);
        w.write_frame(b"Hello", OpCode::Text, true).await.unwrap();

        let wire = &w.io;
        assert_eq!(wire.len(), 11);
        assert_eq!(wire[0], 0x81);
        assert_eq!(wire[1], 0x85);

        let key = [wire[2], wire[3], wire[4], wire[5]];
        let mut payload = wire[6..].to_vec();
        apply_mask(&mut payload, key, 0);
        assert_eq!(payload, b"Hello");
    }

    #[tokio::test]
    async fn test_keys_vary_between_frames() {
        let mut w = writer(true);
        let mut keys = std::collections::HashSet::new();
        for _ in 0..8 {
            w.io.clear();
            w.write_frame(b"x", OpCode::Text, true).await.unwrap();
            keys.insert([w.io[2], w.io[3], w.io[4], w.io[5]]);
        }
        assert!(keys.len() > 1, "mask keys should not repeat every frame");
    }

    #[tokio::test]
    async fn test_extended_length_forms() {
        let mut w = writer(false);
        w.write_frame(&vec![0xab; 200], OpCode::Binary, true)
            .await
            .unwrap();
        assert_eq!(&w.io[..4], [0x82, 0x7e, 0x00, 0xc8]);
        assert_eq!(w.io.len(), 204);

        w.io.clear();
        w.write_frame(&vec![0xcd; 70000], OpCode::Binary, true)
            .await
            .unwrap();
        assert_eq!(&w.io[..2], [0x82, 0x7f]);
        assert_eq!(w.io[2..10], 70000u64.to_be_bytes());
        assert_eq!(w.io.len(), 70010);
    }

    #[tokio::test]
    async fn test_fragment_headers() {
        let mut w = writer(false);
        w.write_frame(b"abc", OpCode::Text, false).await.unwrap();
        w.write_frame(b"de", OpCode::Continuation, true)
            .await
            .unwrap();
        assert_eq!(
            w.io,
            [0x01, 0x03, b'a', b'b', b'c', 0x80, 0x02, b'd', b'e']
        );
    }

    #[tokio::test]
    async fn test_close_writer_wire() {
        let mut w = writer(false);
        w.close_writer(1001, "bye").await.unwrap();
        assert_eq!(w.io, [0x88, 0x05, 0x03, 0xe9, b'b', b'y', b'e']);
    }

    #[tokio::test]
    async fn test_close_writer_defaults_to_normal() {
        let mut w = writer(false);
        w.close_writer(0, "").await.unwrap();
        assert_eq!(w.io, [0x88, 0x02, 0x03, 0xe8]);
    }

    #[tokio::test]
    async fn test_close_writer_idempotent() {
        let mut w = writer(false);
        w.close_writer(1000, "").await.unwrap();
        let len = w.io.len();
        w.close_writer(1000, "").await.unwrap();
        assert_eq!(w.io.len(), len);
    }

    #[tokio::test]
    async fn test_close_writer_truncates_reason() {
        let mut w = writer(false);
        let reason = "r".repeat(200);
        w.close_writer(1001, &reason).await.unwrap();
        // 2 header + 2 status + 123 reason
        assert_eq!(w.io.len(), 2 + 2 + MAX_CLOSE_REASON);
        assert_eq!(w.io[1] as usize, 2 + MAX_CLOSE_REASON);
    }

    #[tokio::test]
    async fn test_close_sends_empty_close_frame() {
        let mut w = writer(false);
        w.close().await.unwrap();
        assert_eq!(w.io, [0x88, 0x00]);
    }

    #[tokio::test]
    async fn test_close_after_close_writer_sends_nothing() {
        let mut w = writer(false);
        w.close_writer(1000, "").await.unwrap();
        let len = w.io.len();
        w.close().await.unwrap();
        assert_eq!(w.io.len(), len);
    }

    #[tokio::test]
    async fn test_scratch_reuse() {
        let mut w = writer(false);
        w.write_frame(&[0u8; 256], OpCode::Binary, true)
            .await
            .unwrap();
        let cap = w.buf.capacity();
        w.write_frame(&[0u8; 128], OpCode::Binary, true)
            .await
            .unwrap();
        assert_eq!(w.buf.capacity(), cap, "scratch should be reused");
    }
}
