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

//! WebSocket client transport (RFC 6455).
//!
//! - `Handshake` builds the upgrade GET and checks the 101 reply
//! - `frame` encodes masked binary frames and parses headers
//! - `FrameReader` reassembles inbound frames split across reads
//! - `WebSocketLayer` ties them together as a transport layer
//!
//! State flow: NotStarted → Connecting → ConnectedFlow ⇄ ConnectedPong,
//! ConnectedClosing → Closed, or Failed.

pub mod frame;
mod handshake;
mod layer;
mod reader;

pub use frame::{FrameDescriptor, HeaderParse, MessageType};
pub use handshake::{compute_accept, find_head_end, Handshake};
pub use layer::WebSocketLayer;
pub use reader::{FrameReadState, FrameReader, FrameSink, ReadOutcome, MAX_HEADER_STALLS};

/// Default largest outbound frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketState {
    NotStarted,
    /// Upgrade request sent, reply pending.
    Connecting,
    ConnectedFlow,
    /// A pong is queued ahead of data.
    ConnectedPong,
    /// Peer sent close; echo queued.
    ConnectedClosing,
    Closed,
    Failed,
}

impl WebSocketState {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            WebSocketState::ConnectedFlow | WebSocketState::ConnectedPong | WebSocketState::ConnectedClosing
        )
    }
}

/// Upgrade target and framing limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    pub host: String,
    pub path: String,
    pub query: String,
    /// Required Sec-WebSocket-Protocol, e.g. `amqp`.
    pub protocol: String,
    pub headers: Vec<(String, String)>,
    pub max_frame_size: usize,
}

impl WebSocketConfig {
    pub fn new(host: &str, protocol: &str) -> Self {
        Self {
            host: host.to_string(),
            path: "/".to_string(),
            query: String::new(),
            protocol: protocol.to_string(),
            headers: Vec::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(1);
        self
    }
}
