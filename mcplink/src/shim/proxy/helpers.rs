//! Line-level I/O for the proxy loop: bounded stdin reads and stdout writes.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::FramingError;

/// Stop waiting for the end of an oversized line after this long.
const SKIP_TIMEOUT: Duration = Duration::from_secs(30);

/// Read one line (including its `\n`) into `buf`, refusing to buffer more
/// than `max_bytes`.
///
/// Returns the number of bytes appended; 0 means EOF. An oversized line is
/// discarded through its newline so the next call starts on a fresh line,
/// and `buf` is left as it was.
///
/// # Errors
///
/// `FramingError::MessageTooLarge` for an oversized line, carrying how many
/// bytes were discarded. `FramingError::Io` if the reader fails.
pub(super) async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError> {
    let start = buf.len();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(buf.len() - start);
        }

        let (take, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if buf.len() - start + take > max_bytes {
            let kept = buf.len() - start;
            buf.truncate(start);
            let dropped = kept + skip_line(reader).await;
            return Err(FramingError::MessageTooLarge { max_bytes, dropped });
        }

        buf.extend_from_slice(&available[..take]);
        reader.consume(take);
        if complete {
            return Ok(buf.len() - start);
        }
    }
}

/// Discard input up to and including the next newline. Returns the number of
/// bytes skipped, which is short of the full line if stdin stalls or fails.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> usize {
    let mut skipped = 0usize;
    let skip = async {
        loop {
            let available = match reader.fill_buf().await {
                Ok([]) => return,
                Ok(available) => available,
                Err(e) => {
                    warn!(error = %e, skipped, error_type = "io", "stdin failed mid-line");
                    return;
                }
            };
            let (take, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            reader.consume(take);
            skipped += take;
            if complete {
                return;
            }
        }
    };

    if tokio::time::timeout(SKIP_TIMEOUT, skip).await.is_err() {
        warn!(
            skipped,
            error_type = "message_too_large",
            timeout_secs = SKIP_TIMEOUT.as_secs(),
            "no newline after oversized line, resuming read"
        );
    }
    skipped
}

/// Write one payload as an NDJSON line and flush.
///
/// Payloads that are empty after trimming are skipped. Returns whether a
/// line was written.
pub(super) async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &str,
) -> std::io::Result<bool> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(false);
    }

    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(true)
}
