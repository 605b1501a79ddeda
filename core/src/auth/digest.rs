/*
 * digest.rs
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

//! Digest proxy authorization (RFC 2617).
//!
//! MD5 is what proxies implement for Digest; the hashes below must match
//! theirs exactly.

use md5::{Digest, Md5};

use super::Credentials;
use crate::error::{Result, TunnelError};

/// Method used for A2 on a tunnel request.
pub const CONNECT_METHOD: &str = "CONNECT";

/// Parameters taken from a `Digest` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallengeParams {
    pub realm: String,
    pub nonce: String,
    /// Selected quality of protection (`auth` preferred when several are offered).
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallengeParams {
    /// Parse `Digest realm="…", nonce="…", qop="auth,auth-int", opaque="…"`.
    /// The leading scheme token is optional.
    pub fn parse(challenge: &str) -> Result<Self> {
        let mut rest = challenge.trim();
        if rest.get(..6).map_or(false, |s| s.eq_ignore_ascii_case("digest")) {
            rest = rest[6..].trim_start();
        }
        let mut params = DigestChallengeParams::default();
        let mut realm = None;
        let mut nonce = None;
        for (key, value) in parse_params(rest) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => params.qop = select_qop(&value),
                "opaque" => params.opaque = Some(value),
                "algorithm" => params.algorithm = Some(value),
                _ => {}
            }
        }
        params.realm = realm.ok_or_else(|| {
            TunnelError::MalformedHeader(format!("Digest challenge without realm: {}", challenge))
        })?;
        params.nonce = nonce.ok_or_else(|| {
            TunnelError::MalformedHeader(format!("Digest challenge without nonce: {}", challenge))
        })?;
        if let Some(alg) = &params.algorithm {
            if !alg.eq_ignore_ascii_case("MD5") && !alg.eq_ignore_ascii_case("MD5-sess") {
                return Err(TunnelError::UnsupportedAuthScheme(format!(
                    "Digest algorithm {}",
                    alg
                )));
            }
        }
        Ok(params)
    }

    fn is_session(&self) -> bool {
        self.algorithm
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case("MD5-sess"))
            .unwrap_or(false)
    }
}

/// `auth` if listed, otherwise the first listed option; `None` for an empty list.
fn select_qop(value: &str) -> Option<String> {
    let options: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if options.iter().any(|q| q.eq_ignore_ascii_case("auth")) {
        return Some("auth".to_string());
    }
    options.first().map(|q| q.to_string())
}

/// Comma-separated `key=value` / `key="value"` pairs. Commas inside quotes are kept.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }
        let key = key.trim().to_string();
        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }
        if !key.is_empty() {
            out.push((key, value));
        }
        if chars.peek().is_none() {
            break;
        }
    }
    out
}

/// Computes Digest authorizations for one negotiation. The nonce count
/// persists across exchanges on the same connection.
#[derive(Debug, Default)]
pub struct DigestComputer {
    nonce_count: u32,
}

impl DigestComputer {
    pub fn new() -> Self {
        Self { nonce_count: 0 }
    }

    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    /// `Proxy-Authorization` value for a CONNECT to `uri`, with a fresh random cnonce.
    pub fn authorization(
        &mut self,
        params: &DigestChallengeParams,
        credentials: &Credentials,
        uri: &str,
    ) -> Result<String> {
        let cnonce = generate_cnonce()?;
        Ok(self.authorization_with(params, credentials, CONNECT_METHOD, uri, &cnonce))
    }

    /// Same as `authorization` with explicit method and cnonce.
    pub fn authorization_with(
        &mut self,
        params: &DigestChallengeParams,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        let mut ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, params.realm, credentials.password
        ));
        if params.is_session() {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, params.nonce, cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let mut header = format!(
            "Digest username=\"{}\",realm=\"{}\",nonce=\"{}\",uri=\"{}\",cnonce=\"{}\"",
            credentials.username, params.realm, params.nonce, uri, cnonce
        );
        match params.qop.as_deref().filter(|q| !q.is_empty()) {
            Some(qop) => {
                self.nonce_count = self.nonce_count.wrapping_add(1);
                let nc = format!("{:08X}", self.nonce_count);
                let response = md5_hex(&format!(
                    "{}:{}:{}:{}:{}:{}",
                    ha1, params.nonce, nc, cnonce, qop, ha2
                ));
                header.push_str(&format!(",nc={},response=\"{}\",qop=\"{}\"", nc, response, qop));
            }
            None => {
                let response = md5_hex(&format!("{}:{}:{}", ha1, params.nonce, ha2));
                header.push_str(&format!(",response=\"{}\"", response));
            }
        }
        if let Some(opaque) = &params.opaque {
            header.push_str(&format!(",opaque=\"{}\"", opaque));
        }
        if params.is_session() {
            header.push_str(",algorithm=MD5-sess");
        }
        header
    }
}

/// 16 random bytes, lowercase hex.
fn generate_cnonce() -> Result<String> {
    let mut raw = [0u8; 16];
    getrandom::getrandom(&mut raw)
        .map_err(|e| TunnelError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    Ok(bytes_to_hex(&raw))
}

fn md5_hex(s: &str) -> String {
    bytes_to_hex(&Md5::digest(s.as_bytes()))
}

fn bytes_to_hex(b: &[u8]) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut s = String::with_capacity(b.len() * 2);
    for &x in b {
        s.push(HEX[(x >> 4) as usize] as char);
        s.push(HEX[(x & 15) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const CNONCE: &str = "0123456789abcdef0123456789abcdef";

    fn alice() -> Credentials {
        Credentials::new("alice", "secret")
    }

    fn params(qop: Option<&str>) -> DigestChallengeParams {
        DigestChallengeParams {
            realm: "proxy".to_string(),
            nonce: "abc123".to_string(),
            qop: qop.map(str::to_string),
            opaque: None,
            algorithm: None,
        }
    }

    #[test]
    fn rfc2617_example_vector() {
        let p = DigestChallengeParams {
            realm: "testrealm@host.com".to_string(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string(),
            qop: Some("auth".to_string()),
            opaque: None,
            algorithm: None,
        };
        let mut d = DigestComputer::new();
        let header = d.authorization_with(
            &p,
            &Credentials::new("Mufasa", "Circle Of Life"),
            "GET",
            "/dir/index.html",
            "0a4f113b",
        );
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("nc=00000001"));
    }

    #[test]
    fn response_without_qop() {
        let mut d = DigestComputer::new();
        let header = d.authorization_with(&params(None), &alice(), CONNECT_METHOD, "example.com:443", CNONCE);
        assert_eq!(
            header,
            "Digest username=\"alice\",realm=\"proxy\",nonce=\"abc123\",uri=\"example.com:443\",\
cnonce=\"0123456789abcdef0123456789abcdef\",response=\"9f7ac8c164b89b080cf55c25163840ef\""
        );
        assert_eq!(d.nonce_count(), 0);
    }

    #[test]
    fn response_with_qop_counts_nonces() {
        let mut d = DigestComputer::new();
        let first = d.authorization_with(&params(Some("auth")), &alice(), CONNECT_METHOD, "example.com:443", CNONCE);
        assert_eq!(
            first,
            "Digest username=\"alice\",realm=\"proxy\",nonce=\"abc123\",uri=\"example.com:443\",\
cnonce=\"0123456789abcdef0123456789abcdef\",nc=00000001,\
response=\"1d71a1bd252d7d61474c7d8116ca897c\",qop=\"auth\""
        );
        let second = d.authorization_with(&params(Some("auth")), &alice(), CONNECT_METHOD, "example.com:443", CNONCE);
        assert!(second.contains("nc=00000002"));
        assert!(second.contains("response=\"2cdf16b7f8d99b06da22e4b6d4814de7\""));
    }

    #[test]
    fn nonce_count_is_uppercase_hex() {
        let mut d = DigestComputer { nonce_count: 9 };
        let header = d.authorization_with(&params(Some("auth")), &alice(), CONNECT_METHOD, "h:1", CNONCE);
        assert!(header.contains("nc=0000000A"));
    }

    #[test]
    fn parses_challenge() {
        let p = DigestChallengeParams::parse(
            "Digest realm=\"proxy, inc\", nonce=\"n0\", qop=\"auth-int,auth\", opaque=\"xyz\", stale=false",
        )
        .unwrap();
        assert_eq!(p.realm, "proxy, inc");
        assert_eq!(p.nonce, "n0");
        assert_eq!(p.qop.as_deref(), Some("auth"));
        assert_eq!(p.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn parses_unquoted_and_empty_qop() {
        let p = DigestChallengeParams::parse("digest realm=r,nonce=n,qop=\"\",algorithm=MD5").unwrap();
        assert_eq!(p.realm, "r");
        assert_eq!(p.nonce, "n");
        assert_eq!(p.qop, None);
    }

    #[test]
    fn challenge_without_nonce_fails() {
        assert!(DigestChallengeParams::parse("Digest realm=\"r\"").is_err());
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let err = DigestChallengeParams::parse("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-256").unwrap_err();
        assert!(matches!(err, TunnelError::UnsupportedAuthScheme(_)));
    }

    #[test]
    fn opaque_echoed() {
        let mut p = params(None);
        p.opaque = Some("op".to_string());
        let header = DigestComputer::new().authorization_with(&p, &alice(), CONNECT_METHOD, "h:1", CNONCE);
        assert!(header.ends_with(",opaque=\"op\""));
    }

    #[test]
    fn random_cnonce_is_32_hex_chars() {
        let header = DigestComputer::new()
            .authorization(&params(None), &alice(), "h:1")
            .unwrap();
        let start = header.find("cnonce=\"").unwrap() + 8;
        let cnonce = &header[start..start + 32];
        assert!(cnonce.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
}
