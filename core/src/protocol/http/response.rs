/*
 * response.rs
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

//! HTTP/1.1 response assembler: status line, headers, Content-Length body.
//!
//! Fed from a byte region across any number of reads. Incomplete lines stay
//! in the region until their terminator arrives.

use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};
use crate::protocol::http::headers::{parse_header_line, Headers};
use crate::protocol::http::status::StatusLine;

/// A complete (or in-progress) HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusLine,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Declared Content-Length (0 when absent).
    pub content_length: usize,
}

impl HttpResponse {
    fn new(status: StatusLine) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            content_length: 0,
        }
    }

    pub fn code(&self) -> u16 {
        self.status.code
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Expecting the status line.
    Init,
    /// Expecting `Name: Value` lines up to a blank line.
    Headers,
    /// Reading Content-Length bytes of body.
    Body,
}

/// Outcome of one `receive` call.
#[derive(Debug, PartialEq, Eq)]
pub enum Assembly {
    Complete(HttpResponse),
    /// Status line or headers not complete yet.
    Incomplete,
    /// Head complete, body bytes outstanding.
    MissingContent { remaining: usize },
}

/// Largest Content-Length accepted by default.
pub const DEFAULT_MAX_BODY: usize = 64 * 1024;

/// Push assembler for HTTP responses. Returns to `Init` after each complete response.
pub struct ResponseAssembler {
    state: AssemblyState,
    response: Option<HttpResponse>,
    content_length: Option<usize>,
    max_body: usize,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY)
    }

    /// Responses declaring a longer body are rejected.
    pub fn with_max_body(max_body: usize) -> Self {
        Self {
            state: AssemblyState::Init,
            response: None,
            content_length: None,
            max_body,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// True while the head is complete but body bytes remain outstanding.
    pub fn is_missing_content(&self) -> bool {
        self.state == AssemblyState::Body
    }

    pub fn reset(&mut self) {
        self.state = AssemblyState::Init;
        self.response = None;
        self.content_length = None;
    }

    /// Consume as much of `input` as belongs to the response. Bytes after a
    /// complete response are left in `input`.
    pub fn receive(&mut self, input: &mut ByteRegion) -> Result<Assembly> {
        loop {
            match self.state {
                AssemblyState::Init => {
                    let line = match take_line(input) {
                        Some(line) => line,
                        None => return Ok(Assembly::Incomplete),
                    };
                    // Tolerate blank lines before the status line (RFC 9112 §2.2)
                    if line.is_empty() {
                        continue;
                    }
                    let text = std::str::from_utf8(&line)
                        .map_err(|_| TunnelError::MalformedStatusLine(lossy(&line)))?;
                    self.response = Some(HttpResponse::new(StatusLine::parse(text)?));
                    self.state = AssemblyState::Headers;
                }
                AssemblyState::Headers => {
                    let line = match take_line(input) {
                        Some(line) => line,
                        None => return Ok(Assembly::Incomplete),
                    };
                    if line.is_empty() {
                        match self.content_length {
                            Some(n) if n > 0 => {
                                if let Some(r) = self.response.as_mut() {
                                    r.content_length = n;
                                }
                                self.state = AssemblyState::Body;
                            }
                            _ => return Ok(self.finish()),
                        }
                        continue;
                    }
                    let text = std::str::from_utf8(&line)
                        .map_err(|_| TunnelError::MalformedHeader(lossy(&line)))?;
                    let (name, value) = parse_header_line(text)?;
                    if name.eq_ignore_ascii_case("Content-Length") && self.content_length.is_none() {
                        let n = value
                            .parse::<usize>()
                            .map_err(|_| TunnelError::MalformedHeader(text.to_string()))?;
                        if n > self.max_body {
                            return Err(TunnelError::MalformedHeader(format!(
                                "{} (limit {})",
                                text, self.max_body
                            )));
                        }
                        self.content_length = Some(n);
                    }
                    if let Some(r) = self.response.as_mut() {
                        r.headers.add(name, value);
                    }
                }
                AssemblyState::Body => {
                    let response = match self.response.as_mut() {
                        Some(r) => r,
                        None => return Ok(self.finish()),
                    };
                    let outstanding = response.content_length - response.body.len();
                    let n = outstanding.min(input.len());
                    response.body.extend_from_slice(&input.readable()[..n]);
                    input.consume(n);
                    if n < outstanding {
                        return Ok(Assembly::MissingContent {
                            remaining: outstanding - n,
                        });
                    }
                    return Ok(self.finish());
                }
            }
        }
    }

    fn finish(&mut self) -> Assembly {
        let response = self.response.take();
        self.reset();
        match response {
            Some(r) => Assembly::Complete(r),
            None => Assembly::Incomplete,
        }
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove one LF-terminated line from `input`, without its CR/LF.
fn take_line(input: &mut ByteRegion) -> Option<Vec<u8>> {
    let bytes = input.readable();
    let lf = bytes.iter().position(|&b| b == b'\n')?;
    let end = if lf > 0 && bytes[lf - 1] == b'\r' { lf - 1 } else { lf };
    let line = bytes[..end].to_vec();
    input.consume(lf + 1);
    Some(line)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &[u8] = b"HTTP/1.1 407 Proxy Authentication Required\r\n\
Proxy-Authenticate: Digest realm=\"proxy\", nonce=\"abc\", qop=\"auth\"\r\n\
Proxy-Authenticate: Basic realm=\"proxy\"\r\n\
Content-Length: 11\r\n\
\r\n\
access deny";

    fn region_with(data: &[u8]) -> ByteRegion {
        let mut r = ByteRegion::with_capacity(1024);
        r.put(data).unwrap();
        r
    }

    fn assemble_whole(data: &[u8]) -> HttpResponse {
        let mut r = region_with(data);
        match ResponseAssembler::new().receive(&mut r).unwrap() {
            Assembly::Complete(resp) => resp,
            other => panic!("expected complete response, got {:?}", other),
        }
    }

    #[test]
    fn whole_response() {
        let resp = assemble_whole(CHALLENGE);
        assert_eq!(resp.code(), 407);
        assert_eq!(resp.headers.get("proxy-authenticate").unwrap().len(), 2);
        assert_eq!(resp.body, b"access deny");
        assert_eq!(resp.content_length, 11);
    }

    #[test]
    fn every_split_matches_whole() {
        let whole = assemble_whole(CHALLENGE);
        for split in 1..CHALLENGE.len() {
            let mut input = ByteRegion::with_capacity(1024);
            let mut assembler = ResponseAssembler::new();
            input.put(&CHALLENGE[..split]).unwrap();
            let first = assembler.receive(&mut input).unwrap();
            assert!(!matches!(first, Assembly::Complete(_)), "split {}", split);
            input.put(&CHALLENGE[split..]).unwrap();
            match assembler.receive(&mut input).unwrap() {
                Assembly::Complete(resp) => assert_eq!(resp, whole, "split {}", split),
                other => panic!("split {}: {:?}", split, other),
            }
        }
    }

    #[test]
    fn byte_at_a_time() {
        let whole = assemble_whole(CHALLENGE);
        let mut input = ByteRegion::with_capacity(128);
        let mut assembler = ResponseAssembler::new();
        let mut result = None;
        for b in CHALLENGE {
            input.put(&[*b]).unwrap();
            if let Assembly::Complete(resp) = assembler.receive(&mut input).unwrap() {
                result = Some(resp);
            }
        }
        assert_eq!(result.unwrap(), whole);
    }

    #[test]
    fn missing_content_while_body_outstanding() {
        let mut input = region_with(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nab");
        let mut assembler = ResponseAssembler::new();
        assert_eq!(
            assembler.receive(&mut input).unwrap(),
            Assembly::MissingContent { remaining: 2 }
        );
        assert!(assembler.is_missing_content());
        input.put(b"cdEXTRA").unwrap();
        match assembler.receive(&mut input).unwrap() {
            Assembly::Complete(resp) => assert_eq!(resp.body, b"abcd"),
            other => panic!("{:?}", other),
        }
        assert_eq!(input.readable(), b"EXTRA");
    }

    #[test]
    fn no_content_length_completes_at_blank_line() {
        let mut input = region_with(b"HTTP/1.1 200 Connection established\n\nTUNNEL");
        match ResponseAssembler::new().receive(&mut input).unwrap() {
            Assembly::Complete(resp) => {
                assert!(resp.is_success());
                assert!(resp.body.is_empty());
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(input.readable(), b"TUNNEL");
    }

    #[test]
    fn zero_content_length_completes_immediately() {
        let resp = assemble_whole(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(resp.content_length, 0);
    }

    #[test]
    fn malformed_header_line() {
        let mut input = region_with(b"HTTP/1.1 200 OK\r\nbogus\r\n\r\n");
        assert!(matches!(
            ResponseAssembler::new().receive(&mut input),
            Err(TunnelError::MalformedHeader(_))
        ));
    }

    #[test]
    fn huge_content_length_rejected() {
        let mut input = region_with(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 18446744073709551615\r\n\r\n");
        assert!(matches!(
            ResponseAssembler::new().receive(&mut input),
            Err(TunnelError::MalformedHeader(_))
        ));
        let mut input = region_with(b"HTTP/1.1 407 Denied\r\nContent-Length: 99999999999999999999999\r\n\r\n");
        assert!(ResponseAssembler::new().receive(&mut input).is_err());
    }

    #[test]
    fn body_limit_is_configurable() {
        let mut input = region_with(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        assert!(ResponseAssembler::with_max_body(4).receive(&mut input).is_err());
        let mut input = region_with(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nhell");
        assert!(matches!(
            ResponseAssembler::with_max_body(4).receive(&mut input).unwrap(),
            Assembly::Complete(_)
        ));
    }

    #[test]
    fn malformed_status_line() {
        let mut input = region_with(b"HTTP/1.1 OK\r\n\r\n");
        assert!(matches!(
            ResponseAssembler::new().receive(&mut input),
            Err(TunnelError::MalformedStatusLine(_))
        ));
    }
}
