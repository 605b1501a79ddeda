/*
 * scheme.rs
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

//! Proxy authentication scheme names.

/// Supported proxy authentication schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// Basic (RFC 7617): base64 username:password.
    Basic,
    /// Digest (RFC 2617): MD5 challenge-response.
    Digest,
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(AuthScheme::Basic),
            "digest" => Some(AuthScheme::Digest),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
