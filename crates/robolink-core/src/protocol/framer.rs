//! Stateful byte-stream to text-line decoder.
//!
//! Wire format: plain UTF-8 text, one message per line, terminated by CR, LF,
//! or CRLF.  There are no length prefixes and no checksums.
//!
//! # Why a framer is needed
//!
//! The radio transport is a *stream*: a single read may return half a line,
//! or three lines and the start of a fourth.  The framer accumulates bytes in
//! a pending buffer and emits a line every time it sees a terminator byte.
//!
//! ```text
//! read #1: "AB\r\nC"      -> emits "AB",  pending = "C"
//! read #2: "D\n\nEF"      -> emits "CD",  pending = "EF"
//! ```
//!
//! Any CR or LF byte is a terminator, so CRLF produces one empty run between
//! the CR and the LF.  Empty runs (and runs that are only whitespace) are
//! discarded silently.
//!
//! The framer never blocks and never fails.  Invalid UTF-8 is decoded with
//! replacement characters.  A fresh framer must be used for every session so
//! that a half-received line never leaks into the next connection.

use tracing::trace;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// One terminated run of bytes, before decoding and trimming.
///
/// `bytes` may be empty (e.g. the gap between the CR and the LF of a CRLF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The bytes accumulated before the terminator.
    pub bytes: Vec<u8>,
    /// The terminator byte that closed the run (`\r` or `\n`).
    pub terminator: u8,
}

impl RawFrame {
    /// Decodes the run as UTF-8 (lossy) and trims surrounding whitespace.
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn to_line(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Buffers input and emits a line whenever a CR or LF byte is encountered.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    /// Creates a framer with an empty pending buffer.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(256),
        }
    }

    /// Feeds `bytes` into the framer and returns every completed, non-empty,
    /// trimmed line in arrival order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.feed_raw(bytes)
            .iter()
            .filter_map(RawFrame::to_line)
            .collect()
    }

    /// Feeds `bytes` into the framer and returns every terminated run,
    /// including empty ones, without decoding or trimming.
    ///
    /// Concatenating `bytes + terminator` of every returned frame followed by
    /// [`LineFramer::pending`] reproduces exactly the bytes fed so far.
    pub fn feed_raw(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        for &b in bytes {
            if b == CR || b == LF {
                frames.push(RawFrame {
                    bytes: std::mem::take(&mut self.pending),
                    terminator: b,
                });
            } else {
                self.pending.push(b);
            }
        }
        trace!(
            fed = bytes.len(),
            frames = frames.len(),
            pending = self.pending.len(),
            "framer fed"
        );
        frames
    }

    /// Bytes received since the last terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
