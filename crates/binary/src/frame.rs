//! Incremental frame decoding for byte-stream transports.

use crate::codec::decode_body;
use crate::message::Frame;
use crate::{FrameKind, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_SIZE};
use alloc::format;
use alloc::vec::Vec;
use strata_core::{Error, Result};

/// Splits a byte stream into frames.
///
/// A `MalformedMessage` consumes only the offending frame. A `MalformedFrame`
/// leaves the stream unsynchronized, so every later call fails too.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
    poisoned: bool,
}

impl FrameDecoder {
    /// Creates a decoder accepting frames up to the default maximum length.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a decoder accepting frames up to `max_frame_len` bytes,
    /// excluding the length prefix.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
            poisoned: false,
        }
    }

    /// Appends bytes received from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        if !self.poisoned {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.poisoned {
            return Err(Error::malformed_frame("Stream is no longer synchronized"));
        }
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len == 0 || len > self.max_frame_len {
            return Err(self.poison(format!(
                "Frame length {} outside 1..={}",
                len, self.max_frame_len
            )));
        }
        if self.buf.len() < len + 4 {
            return Ok(None);
        }

        let kind_byte = self.buf[4];
        let Some(kind) = FrameKind::from_u8(kind_byte) else {
            return Err(self.poison(format!("Unknown frame kind: {}", kind_byte)));
        };
        let result = decode_body(kind, &self.buf[FRAME_HEADER_SIZE..len + 4]);
        self.buf.drain(..len + 4);
        result.map(Some)
    }

    /// Returns the number of buffered bytes not yet decoded.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns true after a framing error.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn poison(&mut self, message: alloc::string::String) -> Error {
        self.poisoned = true;
        self.buf.clear();
        Error::malformed_frame(message)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
