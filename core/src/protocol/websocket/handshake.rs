/*
 * handshake.rs
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

//! WebSocket opening handshake (RFC 6455 §4): GET with Upgrade, then check the 101 reply.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use super::WebSocketConfig;
use crate::error::{Result, TunnelError};

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// One upgrade attempt. The key is generated per request and never reused.
#[derive(Debug, Clone)]
pub struct Handshake {
    key: String,
}

impl Handshake {
    /// New handshake with a random 16-byte key.
    pub fn new() -> Result<Self> {
        let mut raw = [0u8; 16];
        getrandom::getrandom(&mut raw)
            .map_err(|e| TunnelError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(Self {
            key: STANDARD.encode(raw),
        })
    }

    pub fn with_key(key: &str) -> Self {
        Self { key: key.to_string() }
    }

    /// Base64 value for Sec-WebSocket-Key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The upgrade request. Host and protocol must be non-empty.
    pub fn request(&self, config: &WebSocketConfig) -> Result<String> {
        if config.host.is_empty() {
            return Err(TunnelError::InvalidParameter("WebSocket host is empty".to_string()));
        }
        if config.protocol.is_empty() {
            return Err(TunnelError::InvalidParameter("WebSocket protocol is empty".to_string()));
        }
        let mut target = String::new();
        if !config.path.starts_with('/') {
            target.push('/');
        }
        target.push_str(&config.path);
        if !config.query.is_empty() {
            target.push('?');
            target.push_str(&config.query);
        }
        let mut req = format!(
            "GET {} HTTP/1.1\r\n\
Connection: Upgrade,Keep-Alive\r\n\
Upgrade: websocket\r\n\
Sec-WebSocket-Version: 13\r\n\
Sec-WebSocket-Key: {}\r\n\
Sec-WebSocket-Protocol: {}\r\n\
Host: {}\r\n",
            target, self.key, config.protocol, config.host
        );
        for (name, value) in &config.headers {
            req.push_str(name);
            req.push_str(": ");
            req.push_str(value);
            req.push_str("\r\n");
        }
        req.push_str("\r\n");
        Ok(req)
    }

    /// Check the reply head (status line and headers). Fails naming the first unmet condition.
    pub fn validate(&self, reply: &str, protocol: &str) -> Result<()> {
        let mut status = false;
        let mut upgrade = false;
        let mut connection = false;
        let mut subprotocol = false;
        let mut accept = false;
        let expected = compute_accept(&self.key);
        for line in reply.lines() {
            let line = line.trim_end_matches('\r');
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("http/") {
                status = lower.contains("101") && lower.contains("switching protocols");
                continue;
            }
            let (name, value) = match line.split_once(':') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => continue,
            };
            if name.eq_ignore_ascii_case("upgrade") {
                upgrade = value.eq_ignore_ascii_case("websocket");
            } else if name.eq_ignore_ascii_case("connection") {
                connection = value.to_ascii_lowercase().contains("upgrade");
            } else if name.eq_ignore_ascii_case("sec-websocket-protocol") {
                subprotocol = value.eq_ignore_ascii_case(protocol);
            } else if name.eq_ignore_ascii_case("sec-websocket-accept") {
                accept = value == expected;
            }
        }
        let unmet = if !status {
            "status is not 101 Switching Protocols"
        } else if !upgrade {
            "Upgrade header is not websocket"
        } else if !connection {
            "Connection header does not contain upgrade"
        } else if !subprotocol {
            "Sec-WebSocket-Protocol does not match"
        } else if !accept {
            "Sec-WebSocket-Accept does not match key"
        } else {
            return Ok(());
        };
        Err(TunnelError::UpgradeValidationFailed(unmet.to_string()))
    }
}

/// Sec-WebSocket-Accept for a Sec-WebSocket-Key: base64(SHA-1(key + magic)).
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    STANDARD.encode(hasher.finalize())
}

/// Offset just past the blank line ending the reply head, if present.
/// Lines may end in CRLF or a bare LF.
pub fn find_head_end(bytes: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(i) = bytes[from..].iter().position(|&b| b == b'\n') {
        let next = from + i + 1;
        match bytes.get(next) {
            Some(b'\n') => return Some(next + 1),
            Some(b'\r') if bytes.get(next + 1) == Some(&b'\n') => return Some(next + 2),
            _ => from = next,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn config() -> WebSocketConfig {
        WebSocketConfig::new("broker.example", "amqp").with_path("/ws").with_query("vhost=a")
    }

    fn reply(accept: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
Sec-WebSocket-Protocol: amqp\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            accept
        )
    }

    #[test]
    fn rfc6455_accept() {
        assert_eq!(compute_accept(KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn random_keys_are_16_bytes() {
        let a = Handshake::new().unwrap();
        let b = Handshake::new().unwrap();
        assert_eq!(STANDARD.decode(a.key()).unwrap().len(), 16);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn request_wire_format() {
        let req = Handshake::with_key(KEY)
            .request(&config().with_header("Origin", "https://example"))
            .unwrap();
        assert_eq!(
            req,
            "GET /ws?vhost=a HTTP/1.1\r\nConnection: Upgrade,Keep-Alive\r\nUpgrade: websocket\r\n\
Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Protocol: amqp\r\nHost: broker.example\r\nOrigin: https://example\r\n\r\n"
        );
    }

    #[test]
    fn request_path_defaults_to_root() {
        let req = Handshake::with_key(KEY)
            .request(&WebSocketConfig::new("h", "amqp").with_path(""))
            .unwrap();
        assert!(req.starts_with("GET / HTTP/1.1\r\n"));
    }

    #[test]
    fn request_rejects_empty_host_or_protocol() {
        let h = Handshake::with_key(KEY);
        assert!(matches!(
            h.request(&WebSocketConfig::new("", "amqp")),
            Err(TunnelError::InvalidParameter(_))
        ));
        assert!(matches!(
            h.request(&WebSocketConfig::new("h", "")),
            Err(TunnelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn validates_good_reply() {
        let h = Handshake::with_key(KEY);
        h.validate(&reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="), "amqp").unwrap();
    }

    #[test]
    fn header_names_case_insensitive() {
        let h = Handshake::with_key(KEY);
        let text = "HTTP/1.1 101 switching protocols\r\nUPGRADE: WebSocket\r\nconnection: keep-alive, Upgrade\r\n\
SEC-WEBSOCKET-PROTOCOL: AMQP\r\nsec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        h.validate(text, "amqp").unwrap();
    }

    #[test]
    fn names_unmet_condition() {
        let h = Handshake::with_key(KEY);
        let err = h.validate(&reply("bogus="), "amqp").unwrap_err();
        assert!(err.to_string().contains("Sec-WebSocket-Accept"));
        let err = h
            .validate(&reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="), "mqtt")
            .unwrap_err();
        assert!(err.to_string().contains("Sec-WebSocket-Protocol"));
        let err = h
            .validate("HTTP/1.1 200 OK\r\n\r\n", "amqp")
            .unwrap_err();
        assert!(err.to_string().contains("101"));
    }

    #[test]
    fn missing_upgrade_header_named() {
        let h = Handshake::with_key(KEY);
        let text = reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").replace("Upgrade: websocket\r\n", "");
        let err = h.validate(&text, "amqp").unwrap_err();
        assert!(matches!(err, TunnelError::UpgradeValidationFailed(_)));
        assert!(err.to_string().contains("Upgrade header"));
        let text = reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").replace("Upgrade: websocket", "Upgrade: h2c");
        assert!(h.validate(&text, "amqp").unwrap_err().to_string().contains("Upgrade header"));
    }

    #[test]
    fn missing_connection_header_named() {
        let h = Handshake::with_key(KEY);
        let text = reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").replace("Connection: Upgrade\r\n", "");
        let err = h.validate(&text, "amqp").unwrap_err();
        assert!(err.to_string().contains("Connection header"));
        let text = reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").replace("Connection: Upgrade", "Connection: close");
        assert!(h.validate(&text, "amqp").unwrap_err().to_string().contains("Connection header"));
    }

    #[test]
    fn bare_lf_reply_validates() {
        let h = Handshake::with_key(KEY);
        let text = reply("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").replace("\r\n", "\n");
        assert_eq!(find_head_end(text.as_bytes()), Some(text.len()));
        h.validate(&text, "amqp").unwrap();
    }

    #[test]
    fn head_end() {
        assert_eq!(find_head_end(b"HTTP/1.1 101 X\r\n\r\nrest"), Some(18));
        assert_eq!(find_head_end(b"HTTP/1.1 101 X\r\n"), None);
        assert_eq!(find_head_end(b"HTTP/1.1 101 X\n\nrest"), Some(16));
        assert_eq!(find_head_end(b"HTTP/1.1 101 X\n\r\nrest"), Some(17));
        assert_eq!(find_head_end(b"HTTP/1.1 101 X\nA: b\r\n"), None);
        assert_eq!(find_head_end(b""), None);
    }
}
