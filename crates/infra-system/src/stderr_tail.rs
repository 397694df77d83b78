// Bounded stderr capture
//
// ffmpeg can print megabytes of progress lines; only the tail is kept.

use ffgate_core::domain::tail_chars;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const READ_CHUNK: usize = 8 * 1024;

/// Worst-case UTF-8 width, so `max_chars` characters always fit
const MAX_UTF8_BYTES: usize = 4;

/// Last `max_chars` characters worth of bytes
#[derive(Debug)]
pub(crate) struct TailBuffer {
    bytes: VecDeque<u8>,
    max_chars: usize,
    max_bytes: usize,
}

impl TailBuffer {
    pub(crate) fn new(max_chars: usize) -> Self {
        let max_bytes = max_chars.saturating_mul(MAX_UTF8_BYTES).max(MAX_UTF8_BYTES);
        Self {
            bytes: VecDeque::with_capacity(max_bytes.min(READ_CHUNK)),
            max_chars,
            max_bytes,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let chunk = if chunk.len() > self.max_bytes {
            &chunk[chunk.len() - self.max_bytes..]
        } else {
            chunk
        };
        self.bytes.extend(chunk);
        let excess = self.bytes.len().saturating_sub(self.max_bytes);
        self.bytes.drain(..excess);
    }

    /// Lossy text of the tail, capped at `max_chars` characters
    pub(crate) fn render(&self) -> String {
        let raw: Vec<u8> = self.bytes.iter().copied().collect();
        let text = String::from_utf8_lossy(&raw);
        // A cut through a multi-byte character leaves a replacement char up front
        let text = text.trim_start_matches('\u{FFFD}');
        tail_chars(text.trim_end(), self.max_chars)
    }
}

/// Copy a pipe into the shared tail until EOF or a read error
pub(crate) async fn drain_into<R>(mut pipe: R, tail: Arc<Mutex<TailBuffer>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => tail
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "stderr read failed, stopping capture");
                break;
            }
        }
    }
}
