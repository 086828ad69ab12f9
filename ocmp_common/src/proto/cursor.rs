//! Bounds-checked payload cursor.
//!
//! Status/config payloads are a dense, schema-ordered concatenation of
//! parameter fields. The cursor hands out non-overlapping byte ranges, one
//! per parameter, and fails closed on overrun: once a request would cross
//! the payload end, that advance and every later one report
//! [`CursorError::Overrun`] without moving the position.

use core::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("payload overrun: {width} bytes at offset {pos} exceed length {len}")]
    Overrun { pos: usize, width: usize, len: usize },
}

/// Cursor over a payload of known length.
#[derive(Debug, Clone)]
pub struct PayloadCursor {
    len: usize,
    pos: usize,
}

impl PayloadCursor {
    pub fn new(len: usize) -> Self {
        Self { len, pos: 0 }
    }

    /// Current offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Claim the next `width` bytes and return their range.
    pub fn advance(&mut self, width: usize) -> Result<Range<usize>, CursorError> {
        let end = self.pos.checked_add(width).ok_or(CursorError::Overrun {
            pos: self.pos,
            width,
            len: self.len,
        })?;
        if end > self.len {
            return Err(CursorError::Overrun {
                pos: self.pos,
                width,
                len: self.len,
            });
        }
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }
}
