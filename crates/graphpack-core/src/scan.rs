// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sequential framing over a partition stream.
//!
//! A partition file carries no header or index: it is records back to back,
//! each starting with its `block_bytes` length. [`BlockScanner`] yields one
//! complete frame (length field included) per call so it can be handed
//! straight to [`crate::read::decode_block`].

use std::io::{self, Read};

use crate::read::ReadError;

/// Initial buffer reservation for a frame; larger frames grow on demand.
const FRAME_RESERVE: usize = 64 * 1024;

/// Reads length-prefixed record frames from a byte stream.
pub struct BlockScanner<R> {
    reader: R,
    offset: u64,
    frames: u64,
}

impl<R: Read> BlockScanner<R> {
    /// Wraps a reader positioned at a record boundary.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            frames: 0,
        }
    }

    /// Byte offset of the next frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` on clean EOF at a record boundary; EOF anywhere else
    /// is [`ReadError::Truncated`].
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < prefix.len() {
            return Err(ReadError::Truncated {
                section: "block_bytes",
                needed: prefix.len(),
                remaining: filled,
            });
        }

        let value = i32::from_le_bytes(prefix);
        let len = usize::try_from(value).map_err(|_| ReadError::NegativeLength {
            section: "block_bytes",
            value,
        })?;

        let mut frame = Vec::with_capacity(prefix.len() + len.min(FRAME_RESERVE));
        frame.extend_from_slice(&prefix);
        let body = self
            .reader
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut frame)?;
        if body < len {
            return Err(ReadError::Truncated {
                section: "record body",
                needed: len,
                remaining: body,
            });
        }

        self.offset += frame.len() as u64;
        self.frames += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for BlockScanner<R> {
    type Item = Result<Vec<u8>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
