/*
 * basic.rs
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

//! Basic proxy authorization (RFC 7617).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::Credentials;

/// `Basic base64(username:password)`.
pub fn basic_authorization(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.username, credentials.password);
    format!("Basic {}", STANDARD.encode(pair.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_pair() {
        let c = Credentials::new("alice", "secret");
        assert_eq!(basic_authorization(&c), "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn rfc7617_example() {
        let c = Credentials::new("Aladdin", "open sesame");
        assert_eq!(basic_authorization(&c), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }
}
