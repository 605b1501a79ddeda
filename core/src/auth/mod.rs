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

//! Proxy authentication: challenge parsing, scheme selection, Basic and Digest responses.
//!
//! - `ProxyChallenge::from_response` collects the schemes a 407 offers
//! - `ChallengeResponder::respond` picks one (caller's choice, else Digest over Basic),
//!   fetches credentials and builds the `Proxy-Authorization` value

mod basic;
mod credentials;
mod digest;
mod scheme;

pub use basic::basic_authorization;
pub use credentials::{CredentialSource, FileCredentials, FixedCredentials, KeychainCredentials, NoCredentials};
pub use digest::{DigestChallengeParams, DigestComputer, CONNECT_METHOD};
pub use scheme::AuthScheme;

use tracing::debug;

use crate::error::{Result, TunnelError};
use crate::protocol::http::HttpResponse;

/// Header carrying proxy challenges.
pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";

/// Header carrying our answer.
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Schemes offered in a 407, each with its challenge text (scheme token included).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyChallenge {
    offers: Vec<(AuthScheme, String)>,
}

impl ProxyChallenge {
    /// Collect challenges from `Proxy-Authenticate` headers, then from any
    /// `Proxy-Authenticate:` lines in the body text.
    pub fn from_response(response: &HttpResponse) -> Self {
        let mut challenge = ProxyChallenge::default();
        if let Some(values) = response.headers.get(PROXY_AUTHENTICATE) {
            for value in values {
                challenge.offer(value);
            }
        }
        challenge.scan_text(&response.body_text());
        challenge
    }

    /// Scan free text for `Proxy-Authenticate:` followed by a scheme name, case-insensitively.
    pub fn from_text(text: &str) -> Self {
        let mut challenge = ProxyChallenge::default();
        challenge.scan_text(text);
        challenge
    }

    fn scan_text(&mut self, text: &str) {
        let marker = PROXY_AUTHENTICATE.to_ascii_lowercase();
        for line in text.lines() {
            let line = line.trim();
            if line.len() > marker.len()
                && line.is_char_boundary(marker.len())
                && line[..marker.len()].eq_ignore_ascii_case(&marker)
            {
                if let Some(value) = line[marker.len()..].trim_start().strip_prefix(':') {
                    self.offer(value);
                }
            }
        }
    }

    /// Record one challenge value if its scheme is one we support.
    fn offer(&mut self, value: &str) {
        let value = value.trim();
        let token = value.split_whitespace().next().unwrap_or("");
        let token = token.trim_end_matches(',');
        if let Some(scheme) = AuthScheme::from_name(token) {
            if !self.offers(scheme) {
                self.offers.push((scheme, value.to_string()));
            }
        }
    }

    pub fn offers(&self, scheme: AuthScheme) -> bool {
        self.offers.iter().any(|(s, _)| *s == scheme)
    }

    pub fn schemes(&self) -> Vec<AuthScheme> {
        self.offers.iter().map(|(s, _)| *s).collect()
    }

    /// Challenge text for `scheme`.
    pub fn challenge(&self, scheme: AuthScheme) -> Option<&str> {
        self.offers
            .iter()
            .find(|(s, _)| *s == scheme)
            .map(|(_, c)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// The caller's scheme if configured and offered; otherwise Digest, then Basic.
    pub fn select(&self, preferred: Option<AuthScheme>) -> Option<AuthScheme> {
        match preferred {
            Some(scheme) => Some(scheme).filter(|s| self.offers(*s)),
            None => [AuthScheme::Digest, AuthScheme::Basic]
                .into_iter()
                .find(|s| self.offers(*s)),
        }
    }
}

/// Builds `Proxy-Authorization` values for one negotiation.
pub struct ChallengeResponder {
    credentials: Box<dyn CredentialSource>,
    preferred: Option<AuthScheme>,
    digest: DigestComputer,
}

impl ChallengeResponder {
    pub fn new(credentials: Box<dyn CredentialSource>, preferred: Option<AuthScheme>) -> Self {
        Self {
            credentials,
            preferred,
            digest: DigestComputer::new(),
        }
    }

    /// Answer `challenge` for a CONNECT to `host`. `Ok(None)` when no offered
    /// scheme is acceptable; the caller must treat that as fatal.
    pub fn respond(
        &mut self,
        challenge: &ProxyChallenge,
        host: &str,
    ) -> Result<Option<(AuthScheme, String)>> {
        let scheme = match challenge.select(self.preferred) {
            Some(s) => s,
            None => return Ok(None),
        };
        debug!("answering proxy challenge for {} with {}", host, scheme);
        let credentials = self
            .credentials
            .credentials(scheme, host)
            .ok_or_else(|| TunnelError::MissingCredentials {
                scheme: scheme.to_string(),
                host: host.to_string(),
            })?;
        let value = match scheme {
            AuthScheme::Basic => basic_authorization(&credentials),
            AuthScheme::Digest => {
                let text = challenge.challenge(scheme).unwrap_or_default();
                let params = DigestChallengeParams::parse(text)?;
                self.digest.authorization(&params, &credentials, host)?
            }
        };
        Ok(Some((scheme, value)))
    }
}
