//! Incremental header framing.
//!
//! Bytes arrive in whatever chunks the socket hands us. The assembler glues
//! them together until the blank line that ends a header block shows up,
//! then splits the buffer into the header text and whatever payload bytes
//! followed it in the same burst.

use bytes::{Bytes, BytesMut};

use crate::error::{ProxyError, Result};

/// The CR LF CR LF sequence that terminates a header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A complete header block plus any bytes that came after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    /// Everything before the first terminator, terminator excluded.
    pub header: Bytes,
    /// Everything after the terminator. May be empty.
    pub trailing: Bytes,
}

impl HeaderBlock {
    /// Header bytes as text, for target resolution and logging. Bytes that
    /// are not UTF-8 are replaced, so this is never what goes on the wire.
    pub fn header_text(&self) -> String {
        String::from_utf8_lossy(&self.header).into_owned()
    }
}

/// Result of feeding one chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum Assembled {
    NeedMore,
    Complete(HeaderBlock),
}

/// Accumulates chunks until a full header block is buffered.
#[derive(Debug)]
pub struct HeaderAssembler {
    buf: BytesMut,
    /// Offset from which the next terminator search starts.
    scanned: usize,
    max_header_bytes: usize,
    done: bool,
}

impl HeaderAssembler {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_header_bytes,
            done: false,
        }
    }

    /// Append `chunk` and report whether the header is now complete.
    ///
    /// Once `Complete` has been returned the assembler is spent and further
    /// calls return `NeedMore` without buffering.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Assembled> {
        if self.done {
            return Ok(Assembled::NeedMore);
        }
        self.buf.extend_from_slice(chunk);

        // A terminator may straddle the previous chunk boundary.
        let start = self.scanned.saturating_sub(HEADER_TERMINATOR.len() - 1);
        if let Some(pos) = find_terminator(&self.buf[start..]) {
            let header_len = start + pos;
            let mut all = std::mem::take(&mut self.buf);
            let header = all.split_to(header_len).freeze();
            let trailing = all.split_off(HEADER_TERMINATOR.len()).freeze();
            self.done = true;
            self.scanned = 0;
            return Ok(Assembled::Complete(HeaderBlock { header, trailing }));
        }

        if self.buf.len() > self.max_header_bytes {
            return Err(ProxyError::HeaderTooLarge {
                limit: self.max_header_bytes,
            });
        }
        self.scanned = self.buf.len();
        Ok(Assembled::NeedMore)
    }

}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
