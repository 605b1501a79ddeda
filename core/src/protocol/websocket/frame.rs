/*
 * frame.rs
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

//! WebSocket frame format (RFC 6455 §5.2): masked encoder for send, header
//! parser for receive, pong construction.

use bytes::{Buf, BufMut};

use crate::error::{Result, TunnelError};

// Opcodes
pub const OP_CONTINUATION: u8 = 0;
pub const OP_TEXT: u8 = 1;
pub const OP_BINARY: u8 = 2;
pub const OP_CLOSE: u8 = 8;
pub const OP_PING: u8 = 9;
pub const OP_PONG: u8 = 10;

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;

pub const MASK_KEY_LEN: usize = 4;

/// Largest possible header: 2 + 8 extended length + 4 mask.
pub const MAX_HEADER_SIZE: usize = 14;

/// Control frame payload limit (RFC 6455 §5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// What a frame carries, from its opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Binary data frame: payload for the upper protocol.
    Binary,
    Text,
    Continuation,
    Ping,
    Pong,
    Close,
    Unknown(u8),
}

impl MessageType {
    pub fn from_opcode(opcode: u8) -> Self {
        match opcode {
            OP_BINARY => MessageType::Binary,
            OP_TEXT => MessageType::Text,
            OP_CONTINUATION => MessageType::Continuation,
            OP_PING => MessageType::Ping,
            OP_PONG => MessageType::Pong,
            OP_CLOSE => MessageType::Close,
            other => MessageType::Unknown(other),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, MessageType::Ping | MessageType::Pong | MessageType::Close)
    }

    /// Payload goes to the upper layer.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            MessageType::Binary | MessageType::Text | MessageType::Continuation
        )
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub message_type: MessageType,
    pub fin: bool,
    pub payload_length: u64,
    /// Header bytes, extended length and mask key included.
    pub header_length: usize,
    pub mask: Option<[u8; MASK_KEY_LEN]>,
}

/// Result of parsing a header from the bytes at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    Complete(FrameDescriptor),
    /// Header continues past the available bytes; retry with at least `needed` bytes.
    Chunk { needed: usize },
}

/// Size of the length encoding for a payload of `len` bytes: 2, 4 or 10.
pub fn length_field_size(len: usize) -> usize {
    if len <= 125 {
        2
    } else if len <= 0xffff {
        4
    } else {
        10
    }
}

/// Header size of a masked frame carrying `len` payload bytes.
pub fn header_size(len: usize) -> usize {
    length_field_size(len) + MASK_KEY_LEN
}

/// Encode one masked FIN+binary frame into `out`. Returns bytes written.
pub fn wrap(payload: &[u8], mask_key: &[u8; MASK_KEY_LEN], out: &mut [u8]) -> Result<usize> {
    encode_frame(OP_BINARY, payload, Some(mask_key), out)
}

/// Encode one FIN frame with `opcode`, masked when `mask_key` is given.
pub fn encode_frame(
    opcode: u8,
    payload: &[u8],
    mask_key: Option<&[u8; MASK_KEY_LEN]>,
    out: &mut [u8],
) -> Result<usize> {
    let len = payload.len();
    let mask_len = if mask_key.is_some() { MASK_KEY_LEN } else { 0 };
    let needed = length_field_size(len) + mask_len + len;
    if needed > out.len() {
        return Err(TunnelError::overflow(needed, out.len()));
    }
    let mask_bit = if mask_key.is_some() { MASK } else { 0 };
    let mut dst = &mut out[..needed];
    dst.put_u8(FIN | (opcode & 0x0f));
    if len <= 125 {
        dst.put_u8(mask_bit | (len as u8));
    } else if len <= 0xffff {
        dst.put_u8(mask_bit | 126);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(mask_bit | 127);
        dst.put_u64(len as u64);
    }
    match mask_key {
        Some(key) => {
            dst.put_slice(key);
            for (i, &b) in payload.iter().enumerate() {
                dst.put_u8(b ^ key[i % MASK_KEY_LEN]);
            }
        }
        None => dst.put_slice(payload),
    }
    Ok(needed)
}

/// Parse a frame header from the start of `bytes` without consuming anything.
pub fn unwrap_header(bytes: &[u8]) -> Result<HeaderParse> {
    if bytes.len() < 2 {
        return Ok(HeaderParse::Chunk { needed: 2 });
    }
    let b0 = bytes[0];
    let b1 = bytes[1];
    let masked = (b1 & MASK) != 0;
    let len7 = b1 & 0x7f;
    let ext = match len7 {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let header_length = 2 + ext + if masked { MASK_KEY_LEN } else { 0 };
    if bytes.len() < header_length {
        return Ok(HeaderParse::Chunk { needed: header_length });
    }
    let mut src = &bytes[2..header_length];
    let payload_length = match len7 {
        126 => src.get_u16() as u64,
        127 => {
            let n = src.get_u64();
            if n >> 63 != 0 {
                return Err(TunnelError::InvalidFrameHeader(format!(
                    "64-bit length with high bit set: {:#x}",
                    n
                )));
            }
            n
        }
        n => n as u64,
    };
    let mask = if masked {
        let mut key = [0u8; MASK_KEY_LEN];
        src.copy_to_slice(&mut key);
        Some(key)
    } else {
        None
    };
    Ok(HeaderParse::Complete(FrameDescriptor {
        message_type: MessageType::from_opcode(b0 & 0x0f),
        fin: (b0 & FIN) != 0,
        payload_length,
        header_length,
        mask,
    }))
}

/// XOR `data` with `key`, `offset` being the position of `data[0]` within the payload.
pub fn apply_mask(data: &mut [u8], key: &[u8; MASK_KEY_LEN], offset: u64) {
    let start = (offset % MASK_KEY_LEN as u64) as usize;
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= key[(start + i) % MASK_KEY_LEN];
    }
}

/// Pong for a received ping frame: same bytes, first byte FIN+PONG.
pub fn build_pong(ping_frame: &[u8], out: &mut [u8]) -> Result<usize> {
    if ping_frame.is_empty() {
        return Err(TunnelError::InvalidFrameHeader("empty ping frame".to_string()));
    }
    if ping_frame.len() > out.len() {
        return Err(TunnelError::overflow(ping_frame.len(), out.len()));
    }
    out[..ping_frame.len()].copy_from_slice(ping_frame);
    out[0] = FIN | OP_PONG;
    Ok(ping_frame.len())
}

/// Four random bytes for a masking key.
pub fn random_mask() -> Result<[u8; MASK_KEY_LEN]> {
    let mut key = [0u8; MASK_KEY_LEN];
    getrandom::getrandom(&mut key)
        .map_err(|e| TunnelError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn wrapped(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; header_size(payload.len()) + payload.len()];
        let n = wrap(payload, &KEY, &mut out).unwrap();
        assert_eq!(n, out.len());
        out
    }

    #[test]
    fn header_sizes() {
        assert_eq!(header_size(0), 6);
        assert_eq!(header_size(125), 6);
        assert_eq!(header_size(126), 8);
        assert_eq!(header_size(65535), 8);
        assert_eq!(header_size(65536), 14);
    }

    #[test]
    fn rfc6455_masked_hello() {
        // RFC 6455 §5.7, with the binary opcode
        let out = wrapped(b"Hello");
        assert_eq!(out, [0x82, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn length_branches() {
        assert_eq!(wrapped(&[0u8; 125])[1], 0x80 | 125);
        let out = wrapped(&[0u8; 126]);
        assert_eq!(&out[1..4], &[0x80 | 126, 0x00, 126]);
        let out = wrapped(&vec![0u8; 65536]);
        assert_eq!(&out[1..10], &[0x80 | 127, 0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn overflow_when_out_too_small() {
        let mut out = [0u8; 8];
        assert!(matches!(
            wrap(b"Hello", &KEY, &mut out),
            Err(TunnelError::BufferOverflow { needed: 11, available: 8 })
        ));
    }

    #[test]
    fn parses_header_of_wrapped_frame() {
        let out = wrapped(&[7u8; 300]);
        match unwrap_header(&out).unwrap() {
            HeaderParse::Complete(d) => {
                assert_eq!(d.message_type, MessageType::Binary);
                assert!(d.fin);
                assert_eq!(d.payload_length, 300);
                assert_eq!(d.header_length, 8);
                assert_eq!(d.mask, Some(KEY));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn header_chunk_when_extended_length_missing() {
        assert_eq!(unwrap_header(&[0x82]).unwrap(), HeaderParse::Chunk { needed: 2 });
        assert_eq!(unwrap_header(&[0x82, 126, 0x01]).unwrap(), HeaderParse::Chunk { needed: 4 });
        assert_eq!(unwrap_header(&[0x82, 127, 0, 0]).unwrap(), HeaderParse::Chunk { needed: 10 });
    }

    #[test]
    fn unmasked_server_frame() {
        match unwrap_header(&[0x89, 0x02, b'h', b'i']).unwrap() {
            HeaderParse::Complete(d) => {
                assert_eq!(d.message_type, MessageType::Ping);
                assert_eq!(d.header_length, 2);
                assert_eq!(d.mask, None);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn opcode_mapping() {
        assert_eq!(MessageType::from_opcode(0), MessageType::Continuation);
        assert_eq!(MessageType::from_opcode(8), MessageType::Close);
        assert_eq!(MessageType::from_opcode(3), MessageType::Unknown(3));
    }

    #[test]
    fn pong_copies_ping() {
        let ping = [0x89, 0x02, b'h', b'i'];
        let mut out = [0u8; 8];
        let n = build_pong(&ping, &mut out).unwrap();
        assert_eq!(&out[..n], &[0x8a, 0x02, b'h', b'i']);
        let mut small = [0u8; 2];
        assert!(build_pong(&ping, &mut small).is_err());
    }

    #[test]
    fn mask_with_offset() {
        let mut data = wrapped(b"abcdef")[6..].to_vec();
        apply_mask(&mut data[..3], &KEY, 0);
        apply_mask(&mut data[3..], &KEY, 3);
        assert_eq!(data, b"abcdef");
    }
}
