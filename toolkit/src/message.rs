//! # Received-Chunk Container
//!
//! One [`AdkMessage`] carries the outcome of one read: either the bytes the
//! accessory delivered or the end-of-stream marker.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ AdkMessage                   │
//! │   Some([u8; n]), 1 <= n <= 255  ── bytes from a single read
//! │   None                       ── end of stream
//! └──────────────────────────────┘
//! ```
//!
//! The payload is stored inline, so producing a message never allocates.

use heapless::Vec;

use crate::error::{AdkError, AdkResult};
use crate::BUFFER_SIZE;

/// Inline storage for one read chunk
pub type Chunk = Vec<u8, BUFFER_SIZE>;

/// Result of a single read from the accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdkMessage {
    payload: Option<Chunk>,
}

impl AdkMessage {
    /// Message carrying a copy of `bytes`
    ///
    /// Fails with [`AdkError::PayloadTooLarge`] if `bytes` does not fit in
    /// one chunk.
    pub fn from_slice(bytes: &[u8]) -> AdkResult<Self> {
        let payload =
            Chunk::from_slice(bytes).map_err(|_| AdkError::PayloadTooLarge(bytes.len()))?;
        Ok(Self {
            payload: Some(payload),
        })
    }

    /// Message marking end of stream
    pub const fn end_of_stream() -> Self {
        Self { payload: None }
    }

    /// Received bytes, or `None` at end of stream
    pub fn bytes(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Consume the message, returning the chunk
    pub fn into_bytes(self) -> Option<Chunk> {
        self.payload
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.payload.is_none()
    }

    /// Number of bytes carried (zero at end of stream)
    pub fn len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload as UTF-8 text, if it is valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        self.bytes().and_then(|b| core::str::from_utf8(b).ok())
    }
}

impl From<Chunk> for AdkMessage {
    fn from(chunk: Chunk) -> Self {
        Self {
            payload: Some(chunk),
        }
    }
}
