//! Inbound buffer management for AGI record framing

use crate::{
    constants::*,
    error::{AgiError, AgiResult},
};
use bytes::{BufMut, BytesMut};

/// Accumulation buffer the framer reads records out of.
///
/// Bytes are appended as they arrive from the socket and consumed from the
/// front as complete records are extracted. Consumption only moves a
/// position marker; call [`compact`](AgiBuffer::compact) after extracting a
/// record to reclaim the consumed prefix.
pub struct AgiBuffer {
    buffer: BytesMut,
    position: usize,
}

impl AgiBuffer {
    /// Create a new buffer with default capacity
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUF_CHUNK),
            position: 0,
        }
    }

    /// Current length of unconsumed data
    pub fn len(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Returns `true` if no unconsumed data remains
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append inbound bytes
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        if self.buffer.remaining_mut() < data.len() {
            self.buffer.reserve(data.len().max(BUF_CHUNK));
        }
        self.buffer.extend_from_slice(data);
    }

    /// Reference to the unconsumed data
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.position..]
    }

    /// Consume bytes from the front of the buffer.
    ///
    /// Returns `Err` if `count` exceeds the available data.
    pub fn advance(&mut self, count: usize) -> AgiResult<()> {
        let available = self.len();
        if count > available {
            return Err(AgiError::protocol(format!(
                "cannot advance {} bytes, only {} available",
                count, available
            )));
        }
        self.position += count;
        Ok(())
    }

    /// Find the position of `pattern` in the unconsumed data
    pub fn find_pattern(&self, pattern: &[u8]) -> Option<usize> {
        let data = self.data();
        if pattern.is_empty() || data.len() < pattern.len() {
            return None;
        }
        (0..=(data.len() - pattern.len())).find(|&i| data[i..i + pattern.len()] == *pattern)
    }

    /// Extract data up to (but not including) `pattern`, consuming the
    /// pattern as well. Returns `None` when the pattern is not present.
    pub fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        if let Some(pos) = self.find_pattern(pattern) {
            let result = self.data()[..pos].to_vec();
            // pos + pattern.len() <= self.len() is guaranteed by find_pattern
            let _ = self.advance(pos + pattern.len());
            Some(result)
        } else {
            None
        }
    }

    /// Compact the buffer by dropping the consumed prefix
    pub fn compact(&mut self) {
        if self.position > 0 {
            let remaining_len = self.len();
            if remaining_len > 0 {
                self.buffer.copy_within(self.position.., 0);
            }
            self.buffer.truncate(remaining_len);
            self.position = 0;

            if self.buffer.capacity() < BUF_CHUNK {
                self.buffer.reserve(BUF_CHUNK);
            }
        }
    }

    /// Error out when the buffer accumulates without ever producing a
    /// complete record. A remote that stops sending newlines would
    /// otherwise grow the buffer without bound.
    pub fn check_size_limits(&self) -> AgiResult<()> {
        if self.buffer.len() > MAX_BUFFER_SIZE {
            tracing::error!(
                "Buffer overflow: {} bytes accumulated (limit {}). Protocol desync.",
                self.buffer.len(),
                MAX_BUFFER_SIZE
            );
            return Err(AgiError::BufferOverflow {
                size: self.buffer.len(),
                limit: MAX_BUFFER_SIZE,
            });
        }
        Ok(())
    }
}

impl Default for AgiBuffer {
    fn default() -> Self {
        Self::new()
    }
}
