/*
 * status.rs
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

//! HTTP status line: `HTTP/1.1 407 Proxy Authentication Required`.

use std::fmt;

use crate::error::{Result, TunnelError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Protocol name before the `/`, normally `HTTP`.
    pub protocol: String,
    /// Version after the `/`, e.g. `1.1`.
    pub version: String,
    pub code: u16,
    /// Everything after the code; may contain spaces.
    pub reason: String,
}

impl StatusLine {
    /// Parse one status line (without line terminator).
    ///
    /// Only the first two whitespace splits are significant: the remainder,
    /// spaces included, is the reason phrase.
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || TunnelError::MalformedStatusLine(line.to_string());
        let (proto, rest) = split_token(line.trim()).ok_or_else(malformed)?;
        let (code, reason) = split_token(rest).ok_or_else(malformed)?;
        if reason.is_empty() {
            return Err(malformed());
        }
        let (protocol, version) = proto.split_once('/').ok_or_else(malformed)?;
        let code = code.parse::<u16>().map_err(|_| malformed())?;
        Ok(Self {
            protocol: protocol.to_string(),
            version: version.to_string(),
            code,
            reason: reason.to_string(),
        })
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// First whitespace-delimited token and the rest with leading whitespace removed.
fn split_token(s: &str) -> Option<(&str, &str)> {
    let end = s.find(char::is_whitespace)?;
    let token = &s[..end];
    if token.is_empty() {
        return None;
    }
    Some((token, s[end..].trim_start()))
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {} {}", self.protocol, self.version, self.code, self.reason)
    }
}
