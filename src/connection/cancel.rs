//! Cancellation bridging for blocking transport reads.
//!
//! Every transport read races the caller's [`CancellationToken`]; a fired
//! token unblocks the read within one poll and surfaces as
//! [`Error::Cancelled`]. Transports that enforce their own read deadlines
//! report `TimedOut`/`WouldBlock`; those are relabelled as cancellation iff
//! the token is observed fired, otherwise they pass through untouched.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// One transport read into `buf`, cancellable through `token`.
pub(crate) async fn read_or_cancelled<R>(
    io: &mut R,
    buf: &mut [u8],
    token: Option<&CancellationToken>,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    match token {
        None => io.read(buf).await.map_err(Error::from),
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled),
                res = io.read(buf) => res.map_err(|e| relabel_timeout(e, token)),
            }
        }
    }
}

/// A timeout that coincides with a fired token is the cancellation showing
/// through the transport's deadline machinery.
fn relabel_timeout(err: io::Error, token: &CancellationToken) -> Error {
    if matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) && token.is_cancelled()
    {
        Error::Cancelled
    } else {
        Error::Io(err)
    }
}
