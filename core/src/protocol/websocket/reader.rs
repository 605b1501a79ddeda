/*
 * reader.rs
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

//! Inbound frame reassembly.
//!
//! Frames may arrive split anywhere, including inside the header. The reader
//! keeps its position across calls: data payload is streamed to a sink as it
//! arrives, ping and close frames are collected whole in a control buffer.

use tracing::debug;

use super::frame::{self, FrameDescriptor, HeaderParse, MessageType, MAX_CONTROL_PAYLOAD, MAX_HEADER_SIZE};
use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};

/// Consecutive header attempts without new bytes before giving up.
pub const MAX_HEADER_STALLS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameReadState {
    /// Between frames.
    InitRead,
    /// Header incomplete; waiting for more bytes.
    ChunkRead,
    HeaderRead,
    /// Header consumed; payload partly delivered.
    ContinuedFrameRead,
    ReadError,
}

/// Receives data frame payload.
pub trait FrameSink {
    /// Bytes the sink can take now.
    fn capacity(&mut self) -> usize;

    /// Deliver payload; `data.len()` never exceeds the last `capacity()`.
    fn payload(&mut self, data: &[u8]) -> Result<()>;
}

impl FrameSink for Vec<u8> {
    fn capacity(&mut self) -> usize {
        usize::MAX
    }

    fn payload(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Why `read` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Input exhausted.
    NeedMore,
    /// Sink full with payload still waiting.
    Blocked,
    /// A ping is complete in `control_frame()`.
    Ping,
    /// A close is complete in `control_frame()`.
    Close,
}

pub struct FrameReader {
    state: FrameReadState,
    descriptor: Option<FrameDescriptor>,
    bytes_read: u64,
    control: ByteRegion,
    stalls: u32,
    last_available: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_control_capacity(MAX_HEADER_SIZE + MAX_CONTROL_PAYLOAD)
    }

    /// `capacity` bounds a whole control frame, header included.
    pub fn with_control_capacity(capacity: usize) -> Self {
        Self {
            state: FrameReadState::InitRead,
            descriptor: None,
            bytes_read: 0,
            control: ByteRegion::with_capacity(capacity),
            stalls: 0,
            last_available: 0,
        }
    }

    pub fn state(&self) -> FrameReadState {
        self.state
    }

    /// Raw bytes (header and payload, as received) of the last ping or close.
    pub fn control_frame(&self) -> &[u8] {
        self.control.readable()
    }

    pub fn clear_control(&mut self) {
        self.control.clear();
    }

    fn error(&mut self, e: TunnelError) -> Result<ReadOutcome> {
        self.state = FrameReadState::ReadError;
        Err(e)
    }

    /// Consume frames from `input` until it is exhausted, the sink blocks,
    /// or a control frame needs answering.
    pub fn read<S: FrameSink + ?Sized>(&mut self, input: &mut ByteRegion, sink: &mut S) -> Result<ReadOutcome> {
        loop {
            match self.state {
                FrameReadState::InitRead => {
                    self.descriptor = None;
                    self.bytes_read = 0;
                    if input.len() < 2 {
                        self.state = FrameReadState::ChunkRead;
                        return Ok(ReadOutcome::NeedMore);
                    }
                    self.state = FrameReadState::HeaderRead;
                }
                FrameReadState::ChunkRead => {
                    if input.len() < 2 {
                        return Ok(ReadOutcome::NeedMore);
                    }
                    self.state = FrameReadState::HeaderRead;
                }
                FrameReadState::HeaderRead => {
                    let parsed = match frame::unwrap_header(input.readable()) {
                        Ok(p) => p,
                        Err(e) => return self.error(e),
                    };
                    match parsed {
                        HeaderParse::Chunk { needed } => {
                            if input.len() == self.last_available {
                                self.stalls += 1;
                            } else {
                                self.stalls = 0;
                                self.last_available = input.len();
                            }
                            if self.stalls >= MAX_HEADER_STALLS {
                                return self.error(TunnelError::InvalidFrameHeader(format!(
                                    "header incomplete after {} attempts ({} of {} bytes)",
                                    self.stalls,
                                    input.len(),
                                    needed
                                )));
                            }
                            self.state = FrameReadState::ChunkRead;
                            return Ok(ReadOutcome::NeedMore);
                        }
                        HeaderParse::Complete(desc) => {
                            self.stalls = 0;
                            self.last_available = 0;
                            if let MessageType::Unknown(op) = desc.message_type {
                                return self.error(TunnelError::InvalidFrameHeader(format!(
                                    "unknown opcode {:#x}",
                                    op
                                )));
                            }
                            if matches!(desc.message_type, MessageType::Ping | MessageType::Close) {
                                self.control.clear();
                                let total = desc.header_length as u64 + desc.payload_length;
                                if total > self.control.capacity() as u64 {
                                    let needed = usize::try_from(total).unwrap_or(usize::MAX);
                                    return self.error(TunnelError::overflow(needed, self.control.capacity()));
                                }
                                self.control.put(&input.readable()[..desc.header_length])?;
                            }
                            debug!(
                                "frame {:?} fin={} length={}",
                                desc.message_type, desc.fin, desc.payload_length
                            );
                            input.consume(desc.header_length);
                            self.descriptor = Some(desc);
                            self.state = FrameReadState::ContinuedFrameRead;
                        }
                    }
                }
                FrameReadState::ContinuedFrameRead => {
                    let desc = match self.descriptor {
                        Some(d) => d,
                        None => {
                            self.state = FrameReadState::InitRead;
                            continue;
                        }
                    };
                    let remaining = desc.payload_length - self.bytes_read;
                    if remaining > 0 {
                        let mut n = usize::try_from(remaining).unwrap_or(usize::MAX).min(input.len());
                        if desc.message_type.is_data() {
                            n = n.min(sink.capacity());
                        }
                        if n == 0 {
                            return Ok(if input.is_empty() {
                                ReadOutcome::NeedMore
                            } else {
                                ReadOutcome::Blocked
                            });
                        }
                        match desc.message_type {
                            MessageType::Ping | MessageType::Close => {
                                self.control.put(&input.readable()[..n])?;
                            }
                            MessageType::Pong => {}
                            _ => {
                                let chunk = &mut input.readable_mut()[..n];
                                if let Some(key) = desc.mask {
                                    frame::apply_mask(chunk, &key, self.bytes_read);
                                }
                                sink.payload(chunk)?;
                            }
                        }
                        input.consume(n);
                        self.bytes_read += n as u64;
                        if self.bytes_read < desc.payload_length {
                            continue;
                        }
                    }
                    self.state = FrameReadState::InitRead;
                    match desc.message_type {
                        MessageType::Ping => return Ok(ReadOutcome::Ping),
                        MessageType::Close => return Ok(ReadOutcome::Close),
                        _ => {}
                    }
                }
                FrameReadState::ReadError => {
                    return Err(TunnelError::InvalidFrameHeader("frame reader failed".to_string()));
                }
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::websocket::frame::{encode_frame, header_size, wrap, OP_BINARY, OP_CLOSE, OP_PING, OP_PONG};

    fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; payload.len() + 10];
        let n = encode_frame(opcode, payload, None, &mut out).unwrap();
        out.truncate(n);
        out
    }

    fn region(bytes: &[u8]) -> ByteRegion {
        let mut r = ByteRegion::with_capacity(bytes.len().max(16));
        r.put(bytes).unwrap();
        r
    }

    /// Sink that takes at most `room` bytes per call.
    struct Tight {
        room: usize,
        got: Vec<u8>,
    }

    impl FrameSink for Tight {
        fn capacity(&mut self) -> usize {
            self.room
        }

        fn payload(&mut self, data: &[u8]) -> Result<()> {
            self.room -= data.len();
            self.got.extend_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn roundtrip_lengths() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut wire = vec![0u8; header_size(len) + len];
            wrap(&payload, &[1, 2, 3, 4], &mut wire).unwrap();
            let mut input = region(&wire);
            let mut out = Vec::new();
            let mut reader = FrameReader::new();
            assert_eq!(reader.read(&mut input, &mut out).unwrap(), ReadOutcome::NeedMore);
            assert_eq!(out, payload, "length {}", len);
            assert_eq!(reader.state(), FrameReadState::ChunkRead);
        }
    }

    #[test]
    fn every_split_point() {
        let mut wire = server_frame(OP_BINARY, &[9u8; 300]);
        wire.extend(server_frame(OP_BINARY, b"tail"));
        for split in 0..=wire.len() {
            let mut reader = FrameReader::new();
            let mut input = ByteRegion::with_capacity(wire.len());
            let mut out = Vec::new();
            input.put(&wire[..split]).unwrap();
            reader.read(&mut input, &mut out).unwrap();
            input.put(&wire[split..]).unwrap();
            reader.read(&mut input, &mut out).unwrap();
            assert_eq!(out.len(), 304, "split {}", split);
            assert_eq!(&out[300..], b"tail");
            assert!(input.is_empty());
        }
    }

    #[test]
    fn split_inside_two_byte_header() {
        let wire = server_frame(OP_BINARY, b"abc");
        let mut reader = FrameReader::new();
        let mut input = ByteRegion::with_capacity(16);
        let mut out = Vec::new();
        input.put(&wire[..1]).unwrap();
        assert_eq!(reader.read(&mut input, &mut out).unwrap(), ReadOutcome::NeedMore);
        assert_eq!(reader.state(), FrameReadState::ChunkRead);
        input.put(&wire[1..]).unwrap();
        reader.read(&mut input, &mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn ping_collected_whole() {
        let ping = server_frame(OP_PING, b"hi");
        let mut wire = ping.clone();
        wire.extend(server_frame(OP_BINARY, b"data"));
        let mut reader = FrameReader::new();
        let mut input = region(&wire);
        let mut out = Vec::new();
        assert_eq!(reader.read(&mut input, &mut out).unwrap(), ReadOutcome::Ping);
        assert_eq!(reader.control_frame(), &ping[..]);
        reader.clear_control();
        assert_eq!(reader.read(&mut input, &mut out).unwrap(), ReadOutcome::NeedMore);
        assert_eq!(out, b"data");
    }

    #[test]
    fn close_and_pong() {
        let mut wire = server_frame(OP_PONG, b"x");
        wire.extend(server_frame(OP_CLOSE, &[0x03, 0xe8]));
        let mut reader = FrameReader::new();
        let mut input = region(&wire);
        let mut out = Vec::new();
        assert_eq!(reader.read(&mut input, &mut out).unwrap(), ReadOutcome::Close);
        assert!(out.is_empty());
        assert_eq!(reader.control_frame(), &[0x88, 0x02, 0x03, 0xe8]);
    }

    #[test]
    fn blocked_sink_resumes() {
        let mut reader = FrameReader::new();
        let mut input = region(&server_frame(OP_BINARY, b"abcdef"));
        let mut sink = Tight { room: 4, got: Vec::new() };
        assert_eq!(reader.read(&mut input, &mut sink).unwrap(), ReadOutcome::Blocked);
        assert_eq!(sink.got, b"abcd");
        sink.room = 0;
        assert_eq!(reader.read(&mut input, &mut sink).unwrap(), ReadOutcome::Blocked);
        sink.room = 10;
        assert_eq!(reader.read(&mut input, &mut sink).unwrap(), ReadOutcome::NeedMore);
        assert_eq!(sink.got, b"abcdef");
    }

    #[test]
    fn unknown_opcode_fails() {
        let mut reader = FrameReader::new();
        let mut input = region(&[0x83, 0x00]);
        let mut out = Vec::new();
        assert!(matches!(
            reader.read(&mut input, &mut out),
            Err(TunnelError::InvalidFrameHeader(_))
        ));
        assert_eq!(reader.state(), FrameReadState::ReadError);
        assert!(reader.read(&mut input, &mut out).is_err());
    }

    #[test]
    fn oversized_control_frame() {
        let mut reader = FrameReader::with_control_capacity(8);
        let mut input = region(&server_frame(OP_PING, b"0123456789"));
        let mut out = Vec::new();
        assert!(matches!(
            reader.read(&mut input, &mut out),
            Err(TunnelError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn stalled_header_gives_up() {
        let mut reader = FrameReader::new();
        let mut input = region(&[0x82, 127, 0, 0]);
        let mut out = Vec::new();
        let mut result = Ok(ReadOutcome::NeedMore);
        for _ in 0..=MAX_HEADER_STALLS {
            result = reader.read(&mut input, &mut out);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(TunnelError::InvalidFrameHeader(_))));
    }
}
