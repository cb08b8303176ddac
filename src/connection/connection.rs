//! The connection facade: one reader and one writer over a split transport,
//! each behind its own lock.
//!
//! A read and a write may run in parallel; concurrent reads serialize on the
//! read lock, concurrent writes on the write lock. Replying to a ping takes
//! the write lock while the read lock is held; read-then-write is the only
//! nesting order anywhere, so the pair cannot deadlock.

use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::reader::FrameReader;
use crate::connection::writer::FrameWriter;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// A framed WebSocket endpoint over a byte-stream transport.
///
/// The handshake is not performed here; [`crate::upgrade::accept`] and
/// [`crate::upgrade::connect`] produce connections from raw streams, or use
/// [`Connection::new`] with a stream that already completed its upgrade.
///
/// All methods take `&self`: the connection can be shared (for example in an
/// `Arc`) between a reading and a writing task.
pub struct Connection<T> {
    reader: Mutex<FrameReader<ReadHalf<T>>>,
    writer: Mutex<FrameWriter<WriteHalf<T>>>,
    role: Role,
}

/// Header of a frame obtained from [`Connection::next_frame`] or
/// [`Connection::next_raw_frame`], with streaming access to its payload.
///
/// The handle borrows the connection; it never owns a share of it. Reads
/// through the handle consume the connection's current frame, so a handle
/// kept across a later `next_frame` call reads the later frame's bytes.
pub struct Frame<'a, T> {
    conn: &'a Connection<T>,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Declared payload length in bytes.
    pub length: usize,
    /// Final-fragment flag.
    pub fin: bool,
}

impl<T: AsyncRead + AsyncWrite> Connection<T> {
    /// Wrap a transport that already completed its handshake.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, &[])
    }

    /// Like [`Connection::new`], seeding the read buffer with bytes a
    /// buffered handshake read pulled past the upgrade head.
    pub fn with_buffered(io: T, role: Role, config: Config, trailing: &[u8]) -> Self {
        let (r, w) = split(io);
        Self {
            reader: Mutex::new(FrameReader::with_buffered(r, &config, trailing)),
            writer: Mutex::new(FrameWriter::new(w, role.masks_egress(), &config)),
            role,
        }
    }

    /// This endpoint's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Read payload bytes from the stream of data frames.
    ///
    /// Control frames arriving between data frames are handled here: pings
    /// are answered, pongs dropped, a close ends the stream. Returns the
    /// number of bytes placed in `buf`; zero means the peer closed cleanly.
    /// A close with a status other than 1000 or with a reason surfaces as
    /// [`Error::CloseStatus`].
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_inner(buf, None).await
    }

    /// [`Connection::read`] bounded by a cancellation token. When the token
    /// fires, a blocked read unblocks and returns [`Error::Cancelled`].
    pub async fn read_with(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        self.read_inner(buf, Some(cancel)).await
    }

    async fn read_inner(
        &self,
        buf: &mut [u8],
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut reader = self.reader.lock().await;
        loop {
            if reader.remaining() == 0 {
                match self.data_frame_header(&mut reader, cancel).await {
                    Ok(_) => {}
                    Err(Error::ConnectionClosed) => return Ok(0),
                    Err(e) => return Err(e),
                }
            }
            let n = reader.read_payload(buf, cancel).await?;
            if n > 0 {
                return Ok(n);
            }
            // a zero-length data frame; only a closed stream reads as zero
        }
    }

    /// The next data frame's header. Control frames are handled
    /// transparently, exactly as in [`Connection::read`].
    pub async fn next_frame(&self) -> Result<Frame<'_, T>> {
        let mut reader = self.reader.lock().await;
        let (opcode, length, fin) = self.data_frame_header(&mut reader, None).await?;
        Ok(Frame {
            conn: self,
            opcode,
            length,
            fin,
        })
    }

    /// The next frame's header of any kind. Control frames are *not*
    /// handled: the caller sees pings, pongs and closes and is responsible
    /// for answering them.
    pub async fn next_raw_frame(&self) -> Result<Frame<'_, T>> {
        let mut reader = self.reader.lock().await;
        let (opcode, length, fin) = reader.read_frame_header(None).await?;
        Ok(Frame {
            conn: self,
            opcode,
            length,
            fin,
        })
    }

    /// Drive the reader to the next data frame header, answering pings and
    /// dropping pongs along the way.
    async fn data_frame_header(
        &self,
        reader: &mut FrameReader<ReadHalf<T>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(OpCode, usize, bool)> {
        loop {
            let (op, len, fin) = reader.read_frame_header(cancel).await?;
            match op {
                OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                    return Ok((op, len, fin));
                }
                OpCode::Ping => {
                    // answer with a fresh frame carrying the unmasked payload
                    let mut payload = Vec::with_capacity(len);
                    reader.append_payload(&mut payload, len, cancel).await?;
                    let mut writer = self.writer.lock().await;
                    writer.write_frame(&payload, OpCode::Pong, true).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => return Err(reader.process_close(cancel).await),
            }
        }
    }

    /// Send one final Binary frame.
    pub async fn write(&self, payload: &[u8]) -> Result<usize> {
        self.write_frame(payload, OpCode::Binary, true).await
    }

    /// Send one frame with the given opcode and FIN flag. The frame goes to
    /// the transport in a single write; concurrent writers never interleave
    /// within a frame.
    pub async fn write_frame(&self, payload: &[u8], op: OpCode, fin: bool) -> Result<usize> {
        self.writer.lock().await.write_frame(payload, op, fin).await
    }

    /// Send a Close frame with `status` (1000 when zero) and `reason`.
    /// Subsequent close calls do nothing.
    pub async fn close_with_status(&self, status: u16, reason: &str) -> Result<()> {
        self.writer.lock().await.close_writer(status, reason).await
    }

    /// Send an empty Close frame best-effort, then shut the transport down.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.close().await
    }
}

impl<T: AsyncRead + AsyncWrite> Frame<'_, T> {
    /// Read the next payload bytes of this frame. Returns zero once the
    /// payload is exhausted.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.conn.reader.lock().await.read_payload(buf, None).await
    }

    /// Append the rest of this frame's payload to `out`.
    pub async fn read_to_end(&self, out: &mut Vec<u8>) -> Result<usize> {
        let mut reader = self.conn.reader.lock().await;
        let mut total = 0;
        while reader.remaining() != 0 {
            total += reader.append_payload(out, usize::MAX, None).await?;
        }
        Ok(total)
    }

    /// Payload bytes of the current frame not yet read.
    pub async fn remaining(&self) -> usize {
        self.conn.reader.lock().await.remaining()
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Debug for Frame<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("opcode", &self.opcode)
            .field("length", &self.length)
            .field("fin", &self.fin)
            .finish_non_exhaustive()
    }
}
