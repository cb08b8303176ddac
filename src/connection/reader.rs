//! Incremental frame reader: a sliding window over the transport plus the
//! frame cursor state machine.
//!
//! The window is a single contiguous buffer. Four cursors track it: `st` is
//! the offset of the current frame header, `i` the next unread byte, `end`
//! the high-water mark of filled bytes, and `start` the virtual offset of
//! the first payload byte of the current frame. `i - start` is the number of
//! payload bytes already delivered, which is exactly the mask phase to
//! resume unmasking at. Compaction shifts all four together, so the phase
//! survives even though the header bytes themselves are discarded; `start`
//! may end up below zero, which is why it is signed.

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::Config;
use crate::connection::cancel::read_or_cancelled;
use crate::error::{Error, Result};
use crate::protocol::{header, mask, HeaderBits, OpCode, NORMAL_CLOSURE};

/// Payload requests at least this close to the window size bypass the
/// window and read straight into the caller's buffer.
const DIRECT_READ_SLACK: usize = 16;

/// How much of a close payload is consumed for the status and reason.
const CLOSE_PAYLOAD_CAP: usize = 128;

pub(crate) struct FrameReader<R> {
    io: R,
    buf: Vec<u8>,

    /// Offset of the current frame header.
    st: usize,
    /// Next unread byte.
    i: usize,
    /// High-water mark of filled bytes.
    end: usize,
    /// Virtual offset of the first payload byte of the current frame.
    start: isize,

    header: HeaderBits,
    key: [u8; 4],
    /// Payload bytes of the current frame not yet consumed.
    more: usize,

    closed: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Build a reader whose window starts out holding `trailing`, bytes a
    /// buffered handshake read pulled past the upgrade head.
    pub(crate) fn with_buffered(io: R, config: &Config, trailing: &[u8]) -> Self {
        let size = config.effective_read_buffer().max(trailing.len());
        let mut buf = vec![0; size];
        buf[..trailing.len()].copy_from_slice(trailing);
        Self {
            io,
            buf,
            st: 0,
            i: 0,
            end: trailing.len(),
            start: 0,
            header: HeaderBits::default(),
            key: [0; 4],
            more: 0,
            closed: false,
        }
    }

    /// Undelivered payload bytes of the current frame.
    pub(crate) fn remaining(&self) -> usize {
        self.more
    }

    /// Slide the unread tail down once the window is at least half consumed.
    fn compact(&mut self) {
        if self.i < self.end / 2 {
            return;
        }
        let off = self.i;
        if off == 0 {
            return;
        }
        self.buf.copy_within(off..self.end, 0);
        self.st = self.st.saturating_sub(off);
        self.i -= off;
        self.end -= off;
        self.start -= off as isize;
    }

    /// One transport read into the free tail of the window.
    async fn read_once(&mut self, cancel: Option<&CancellationToken>) -> Result<usize> {
        self.compact();
        assert!(
            self.end < self.buf.len(),
            "read buffer too small for frame header"
        );
        let n = read_or_cancelled(&mut self.io, &mut self.buf[self.end..], cancel).await?;
        self.end += n;
        Ok(n)
    }

    /// Parse the next frame header, reading more bytes as needed. Any
    /// unconsumed payload of the previous frame is skipped first.
    ///
    /// Latches the header bits, masking key, payload count, and the frame
    /// origin for mask-phase tracking.
    pub(crate) async fn read_frame_header(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<(OpCode, usize, bool)> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.more != 0 {
            self.discard_payload(cancel).await?;
        }
        self.st = self.i;

        loop {
            if let Some((bits, len, next)) = self.try_parse_header()? {
                let op = OpCode::from_u8(bits.opcode_raw())?;
                self.header = bits;
                self.start = next as isize;
                self.more = len;
                self.i = next;
                trace!(opcode = %op, len, fin = bits.fin(), "frame header");
                return Ok((op, len, bits.fin()));
            }
            let n = self.read_once(cancel).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Run the pure header codec against the buffered bytes at `st`.
    /// `None` means the header is not fully buffered yet.
    fn try_parse_header(&mut self) -> Result<Option<(HeaderBits, usize, usize)>> {
        let buf = &self.buf[..self.end];
        let Some((bits, i)) = header::parse_header(buf, self.st) else {
            return Ok(None);
        };
        let Some((len, i)) = header::parse_length(bits, buf, i)? else {
            return Ok(None);
        };
        let i = if bits.masked() {
            match header::read_mask(buf, i, &mut self.key) {
                Some(i) => i,
                None => return Ok(None),
            }
        } else {
            i
        };
        Ok(Some((bits, len, i)))
    }

    /// Drop the rest of the current frame's payload without delivering it.
    async fn discard_payload(&mut self, cancel: Option<&CancellationToken>) -> Result<()> {
        while self.more != 0 {
            if self.i < self.end {
                let m = (self.end - self.i).min(self.more);
                self.i += m;
                self.more -= m;
            } else {
                let n = self.read_once(cancel).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
        }
        Ok(())
    }

    /// Deliver up to `min(out.len(), remaining)` payload bytes of the
    /// current frame into `out`, unmasked. Returns the delivered count;
    /// zero once the frame payload is exhausted.
    ///
    /// Buffered bytes are served first. A request close to the window size
    /// finding the window empty reads straight from the transport into
    /// `out`. An end of stream observed in the same call as delivered bytes
    /// is swallowed; the next call surfaces it.
    pub(crate) async fn read_payload(
        &mut self,
        out: &mut [u8],
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        let want = out.len().min(self.more);
        let mut n = 0;

        while n < want {
            let phase = (self.i as isize - self.start) as usize;
            let m;
            if self.i < self.end {
                m = (self.end - self.i).min(want - n);
                out[n..n + m].copy_from_slice(&self.buf[self.i..self.i + m]);
                self.i += m;
            } else if want - n >= self.buf.len() - DIRECT_READ_SLACK {
                m = read_or_cancelled(&mut self.io, &mut out[n..want], cancel).await?;
                if m == 0 {
                    if n > 0 {
                        return Ok(n);
                    }
                    return Err(Error::ConnectionClosed);
                }
                // the bytes never entered the window; shift the frame origin
                // instead of the cursor to advance the phase
                self.start -= m as isize;
            } else {
                let k = self.read_once(cancel).await?;
                if k == 0 {
                    if n > 0 {
                        return Ok(n);
                    }
                    return Err(Error::ConnectionClosed);
                }
                continue;
            }

            if self.header.masked() {
                mask::apply_mask(&mut out[n..n + m], self.key, phase);
            }
            n += m;
            self.more -= m;
        }

        Ok(n)
    }

    /// Append up to `min(limit, remaining)` payload bytes to `out`.
    pub(crate) async fn append_payload(
        &mut self,
        out: &mut Vec<u8>,
        limit: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        let want = limit.min(self.more);
        let base = out.len();
        out.resize(base + want, 0);
        let res = self.read_payload(&mut out[base..], cancel).await;
        match res {
            Ok(n) => out.truncate(base + n),
            Err(_) => out.truncate(base),
        }
        res
    }

    /// Consume a Close frame's payload and turn it into the error ending
    /// the read side: a clean end of stream for status 1000 or no status, a
    /// typed close error otherwise.
    pub(crate) async fn process_close(&mut self, cancel: Option<&CancellationToken>) -> Error {
        self.closed = true;

        let mut payload = Vec::new();
        if let Err(e) = self
            .append_payload(&mut payload, CLOSE_PAYLOAD_CAP, cancel)
            .await
        {
            if !matches!(e, Error::ConnectionClosed) {
                return e;
            }
        }

        debug!(len = payload.len(), "close frame received");
        match payload.len() {
            0 => Error::ConnectionClosed,
            1 => Error::MalformedClose(payload[0]),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if payload.len() == 2 && code == NORMAL_CLOSURE {
                    Error::ConnectionClosed
                } else {
                    Error::CloseStatus {
                        code,
                        reason: String::from_utf8_lossy(&payload[2..]).into_owned(),
                    }
                }
            }
        }
    }
}
