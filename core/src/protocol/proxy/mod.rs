/*
 * mod.rs
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

//! HTTP CONNECT proxy tunnel.
//!
//! State flow:
//! NotStarted → Connecting → (Challenge → ChallengeResponded →) Connected, or Failed.
//! Once Connected the layer is a pass-through to the layer it wraps.

mod layer;
mod negotiator;

pub use layer::ProxyLayer;
pub use negotiator::{Negotiation, ProxyNegotiator};

use crate::auth::AuthScheme;
use crate::protocol::http::HttpResponse;

/// Default size of the handshake input and output regions.
pub const DEFAULT_HANDSHAKE_BUFFER: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    NotStarted,
    Connecting,
    Challenge,
    ChallengeResponded,
    Connected,
    Failed,
}

impl ProxyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProxyState::Connected | ProxyState::Failed)
    }
}

/// Tunnel target and authentication policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// CONNECT target, `host:port`.
    pub host: String,
    /// Scheme the caller requires. `None` expects the proxy to accept without a challenge,
    /// and lets a challenge pick Digest over Basic.
    pub auth_type: Option<AuthScheme>,
    /// Extra request headers, sent on every CONNECT.
    pub headers: Vec<(String, String)>,
    pub buffer_size: usize,
}

impl ProxyConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            auth_type: None,
            headers: Vec::new(),
            buffer_size: DEFAULT_HANDSHAKE_BUFFER,
        }
    }

    pub fn with_auth_type(mut self, auth_type: Option<AuthScheme>) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// Builds the CONNECT request and judges the proxy's reply.
pub trait ProxyHandler {
    fn create_request(&self, host: &str, headers: &[(String, String)]) -> String;

    /// True when the proxy established the tunnel.
    fn validate_response(&self, response: &HttpResponse) -> bool;
}

/// `CONNECT host HTTP/1.1` with Host and Keep-Alive; any 2xx is success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProxyHandler;

impl ProxyHandler for DefaultProxyHandler {
    fn create_request(&self, host: &str, headers: &[(String, String)]) -> String {
        let mut req = format!(
            "CONNECT {} HTTP/1.1\r\nHost: {}\r\nConnection: Keep-Alive\r\n",
            host, host
        );
        for (name, value) in headers {
            req.push_str(name);
            req.push_str(": ");
            req.push_str(value);
            req.push_str("\r\n");
        }
        req.push_str("\r\n");
        req
    }

    fn validate_response(&self, response: &HttpResponse) -> bool {
        response.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_wire_format() {
        let headers = vec![("User-Agent".to_string(), "tunnelwire".to_string())];
        let req = DefaultProxyHandler.create_request("broker.example:5671", &headers);
        assert_eq!(
            req,
            "CONNECT broker.example:5671 HTTP/1.1\r\nHost: broker.example:5671\r\n\
Connection: Keep-Alive\r\nUser-Agent: tunnelwire\r\n\r\n"
        );
    }

    #[test]
    fn connect_request_without_headers() {
        let req = DefaultProxyHandler.create_request("h:1", &[]);
        assert!(req.ends_with("Connection: Keep-Alive\r\n\r\n"));
    }
}
