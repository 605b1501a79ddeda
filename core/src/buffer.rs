/*
 * buffer.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tunnelwire, a proxy tunnel and WebSocket transport library.
 *
 * Tunnelwire is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tunnelwire is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tunnelwire.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Fixed-capacity byte region with explicit read and write cursors.
//!
//! Each layer owns its regions outright. Storage is allocated once at
//! construction; consumed bytes are reclaimed by compacting in place.

use crate::error::{Result, TunnelError};

/// Bytes in `data[start..end]` are readable; `data[end..]` is spare.
pub struct ByteRegion {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl ByteRegion {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of readable bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Bytes that can still be written (after compaction).
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len()
    }

    pub fn readable(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Mutable view of the readable bytes (used for in-place unmasking).
    pub fn readable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.end]
    }

    /// Advance the read cursor by `n` readable bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len());
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Move readable bytes to the front so all remaining capacity is contiguous.
    pub fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.data.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// Writable region. Call `commit` with the number of bytes actually written.
    pub fn spare(&mut self) -> &mut [u8] {
        self.compact();
        &mut self.data[self.end..]
    }

    /// Advance the write cursor after bytes were written into `spare()`.
    pub fn commit(&mut self, n: usize) {
        self.end = (self.end + n).min(self.data.len());
    }

    /// Append `bytes`, failing without writing anything if they do not fit.
    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(TunnelError::overflow(bytes.len(), self.remaining()));
        }
        let spare = self.spare();
        spare[..bytes.len()].copy_from_slice(bytes);
        self.commit(bytes.len());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl std::fmt::Debug for ByteRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRegion")
            .field("capacity", &self.data.len())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_consume_compact() {
        let mut r = ByteRegion::with_capacity(8);
        r.put(b"abcdef").unwrap();
        r.consume(4);
        assert_eq!(r.readable(), b"ef");
        assert_eq!(r.remaining(), 6);
        r.put(b"ghijkl").unwrap();
        assert_eq!(r.readable(), b"efghijkl");
        assert!(r.put(b"x").is_err());
    }

    #[test]
    fn consume_all_resets_cursors() {
        let mut r = ByteRegion::with_capacity(4);
        r.put(b"abcd").unwrap();
        r.consume(4);
        assert!(r.is_empty());
        assert_eq!(r.spare().len(), 4);
    }

    #[test]
    fn spare_then_commit() {
        let mut r = ByteRegion::with_capacity(4);
        let s = r.spare();
        s[..2].copy_from_slice(b"hi");
        r.commit(2);
        assert_eq!(r.readable(), b"hi");
    }
}
