/*
 * error.rs
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

//! Tunnel and framing errors.
//!
//! "Need more data" is never an error: parsers report it through their return
//! values and leave their state unchanged.

use thiserror::Error;

/// Errors from the proxy tunnel and WebSocket layers.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Status line did not have protocol/version, numeric code and reason.
    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),

    /// Header line without `:` or with an unusable value (e.g. Content-Length).
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The proxy offered no authentication scheme we accept.
    #[error("unsupported proxy authentication scheme: {0}")]
    UnsupportedAuthScheme(String),

    /// The configured auth type does not match what the proxy asked for.
    #[error("proxy authentication configuration mismatch: {0}")]
    AuthConfigMismatch(String),

    /// No credentials available for the selected scheme.
    #[error("no {scheme} credentials for {host}")]
    MissingCredentials { scheme: String, host: String },

    /// The proxy refused the CONNECT without offering a challenge, or after we answered one.
    #[error("proxy rejected CONNECT: {code} {reason}")]
    ConnectRejected { code: u16, reason: String },

    /// Frame header could not be completed, or carried an unknown opcode.
    #[error("invalid WebSocket frame header: {0}")]
    InvalidFrameHeader(String),

    /// One of the upgrade reply conditions was not met.
    #[error("WebSocket upgrade validation failed: {0}")]
    UpgradeValidationFailed(String),

    /// Destination region smaller than the frame to be written.
    #[error("buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    /// Caller supplied an unusable parameter (empty host, empty protocol, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The inbound or outbound side closed while a handshake was pending.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    pub(crate) fn overflow(needed: usize, available: usize) -> Self {
        TunnelError::BufferOverflow { needed, available }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
