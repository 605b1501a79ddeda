/*
 * lib.rs
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

//! Tunnelwire core: non-blocking transport layers for reaching a broker
//! through an HTTP CONNECT proxy and/or a WebSocket.
//!
//! Layers stack socket side first, e.g.
//! `ProxyLayer<WebSocketLayer<Engine>>`. Each layer intercepts traffic until
//! its handshake completes, then frames (WebSocket) or passes through (proxy).
//! `Driver` runs a stack over a tokio stream.

pub mod auth;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod transport;

pub use auth::{AuthScheme, CredentialSource, Credentials, FileCredentials, FixedCredentials, KeychainCredentials};
pub use buffer::ByteRegion;
pub use config::TunnelConfig;
pub use driver::Driver;
pub use error::{Result, TunnelError};
pub use protocol::proxy::{ProxyConfig, ProxyLayer, ProxyState};
pub use protocol::websocket::{WebSocketConfig, WebSocketLayer, WebSocketState};
pub use transport::{BufferTransport, TransportLayer};
