/*
 * transport.rs
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

//! Duplex transport layer contract.
//!
//! A driver that owns the socket pushes received bytes in at the tail and
//! pulls bytes to send from the head. Layers implement the same trait as the
//! layer they wrap, so they chain: socket → proxy → websocket → engine.
//!
//! Inbound flow: `capacity()` → write into `tail()` → `process(n)`.
//! Outbound flow: `pending()` → `head()` → `pop(n)`.

use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};

/// One layer of a non-blocking duplex byte transport.
pub trait TransportLayer {
    /// Bytes that can be written into `tail()`; `None` once the inbound side is closed.
    fn capacity(&mut self) -> Option<usize>;

    /// Writable inbound region. Write a prefix of it, then call `process` with the count.
    fn tail(&mut self) -> &mut [u8];

    /// Commit `written` bytes from `tail()` and run the layer's state machine.
    fn process(&mut self, written: usize) -> Result<()>;

    /// The peer will send no more bytes.
    fn close_tail(&mut self);

    /// Bytes ready to send; `None` at end of stream. Must precede `head()`.
    fn pending(&mut self) -> Option<usize>;

    /// Bytes to send, as reported by the last `pending()`.
    fn head(&mut self) -> &[u8];

    /// `n` bytes from `head()` were sent.
    fn pop(&mut self, n: usize);

    /// No more bytes can be sent.
    fn close_head(&mut self);

    /// Close/failure hook. Called once with the error that ended a handshake,
    /// or with `None` on orderly shutdown.
    fn closed(&mut self, error: Option<&TunnelError>);
}

/// Default region size for the in-memory endpoint.
pub const DEFAULT_ENDPOINT_CAPACITY: usize = 64 * 1024;

/// In-memory endpoint at the top of a layer stack: collects what arrives,
/// sends what is queued. Stands in for the upper protocol engine.
pub struct BufferTransport {
    received: ByteRegion,
    outgoing: ByteRegion,
    tail_closed: bool,
    head_closed: bool,
    finished: bool,
    failure: Option<String>,
    closed_calls: usize,
}

impl BufferTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ENDPOINT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            received: ByteRegion::with_capacity(capacity),
            outgoing: ByteRegion::with_capacity(capacity),
            tail_closed: false,
            head_closed: false,
            finished: false,
            failure: None,
            closed_calls: 0,
        }
    }

    /// Queue bytes for sending.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.outgoing.put(data)
    }

    /// No more data will be queued; `pending()` reports end of stream once drained.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Everything received so far (leaves the region empty).
    pub fn take_received(&mut self) -> Vec<u8> {
        let out = self.received.readable().to_vec();
        self.received.clear();
        out
    }

    pub fn received(&self) -> &[u8] {
        self.received.readable()
    }

    /// Message of the error passed to `closed`, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Number of times `closed` was called.
    pub fn closed_calls(&self) -> usize {
        self.closed_calls
    }

    pub fn is_tail_closed(&self) -> bool {
        self.tail_closed
    }

    pub fn is_head_closed(&self) -> bool {
        self.head_closed
    }
}

impl Default for BufferTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportLayer for BufferTransport {
    fn capacity(&mut self) -> Option<usize> {
        if self.tail_closed {
            None
        } else {
            Some(self.received.remaining())
        }
    }

    fn tail(&mut self) -> &mut [u8] {
        self.received.spare()
    }

    fn process(&mut self, written: usize) -> Result<()> {
        self.received.commit(written);
        Ok(())
    }

    fn close_tail(&mut self) {
        self.tail_closed = true;
    }

    fn pending(&mut self) -> Option<usize> {
        if self.head_closed || (self.finished && self.outgoing.is_empty()) {
            None
        } else {
            Some(self.outgoing.len())
        }
    }

    fn head(&mut self) -> &[u8] {
        self.outgoing.readable()
    }

    fn pop(&mut self, n: usize) {
        self.outgoing.consume(n);
    }

    fn close_head(&mut self) {
        self.head_closed = true;
    }

    fn closed(&mut self, error: Option<&TunnelError>) {
        self.closed_calls += 1;
        if let Some(e) = error {
            self.failure = Some(e.to_string());
        }
    }
}

/// Copy `data` into `layer` through its tail, as much as capacity allows.
/// Returns the number of bytes accepted.
pub fn feed<T: TransportLayer + ?Sized>(layer: &mut T, data: &[u8]) -> Result<usize> {
    let capacity = match layer.capacity() {
        Some(c) => c,
        None => return Err(TunnelError::Closed("inbound side closed".to_string())),
    };
    let n = capacity.min(data.len());
    let tail = layer.tail();
    let n = n.min(tail.len());
    tail[..n].copy_from_slice(&data[..n]);
    layer.process(n)?;
    Ok(n)
}

/// Drain everything `layer` has ready to send.
pub fn drain<T: TransportLayer + ?Sized>(layer: &mut T) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(n) = layer.pending() {
        if n == 0 {
            break;
        }
        let head = layer.head();
        let n = n.min(head.len());
        if n == 0 {
            break;
        }
        out.extend_from_slice(&head[..n]);
        layer.pop(n);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_collects_and_sends() {
        let mut t = BufferTransport::with_capacity(16);
        assert_eq!(feed(&mut t, b"hello").unwrap(), 5);
        assert_eq!(t.received(), b"hello");
        t.send(b"out").unwrap();
        assert_eq!(drain(&mut t), b"out");
        assert_eq!(t.pending(), Some(0));
        t.finish();
        assert_eq!(t.pending(), None);
    }

    #[test]
    fn feed_respects_capacity() {
        let mut t = BufferTransport::with_capacity(4);
        assert_eq!(feed(&mut t, b"abcdef").unwrap(), 4);
        t.close_tail();
        assert!(feed(&mut t, b"x").is_err());
    }
}
