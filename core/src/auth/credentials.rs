/*
 * credentials.rs
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

//! Credential sources for proxy authentication.
//!
//! The negotiator asks for a username/password pair by scheme and CONNECT target host.
//! Sources: a fixed pair from the caller, the system keychain, or an XML
//! credentials file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use keyring::Entry;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use super::{AuthScheme, Credentials};
use crate::error::{Result, TunnelError};

/// Service name for keyring entries (one entry per CONNECT target host).
const KEYRING_SERVICE: &str = "tunnelwire";

/// Supplies credentials for a proxy challenge.
pub trait CredentialSource {
    fn credentials(&self, scheme: AuthScheme, host: &str) -> Option<Credentials>;
}

/// Caller-supplied pair, used for every scheme and host.
#[derive(Debug, Clone)]
pub struct FixedCredentials(pub Credentials);

impl FixedCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self(Credentials::new(username, password))
    }
}

impl CredentialSource for FixedCredentials {
    fn credentials(&self, _scheme: AuthScheme, _host: &str) -> Option<Credentials> {
        Some(self.0.clone())
    }
}

/// Never has credentials. Used when the caller configured no source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn credentials(&self, _scheme: AuthScheme, _host: &str) -> Option<Credentials> {
        None
    }
}

/// System keychain, one entry per CONNECT target host.
#[derive(Debug, Clone, Default)]
pub struct KeychainCredentials;

impl KeychainCredentials {
    /// Store `credentials` for `host`.
    pub fn store(host: &str, credentials: &Credentials) -> Result<()> {
        let entry = Entry::new(KEYRING_SERVICE, host)
            .map_err(|e| TunnelError::Config(e.to_string()))?;
        entry
            .set_secret(&encode_secret(credentials))
            .map_err(|e| TunnelError::Config(e.to_string()))
    }

    /// Remove the entry for `host`. No-op if the entry does not exist.
    pub fn delete(host: &str) -> Result<()> {
        let entry = Entry::new(KEYRING_SERVICE, host)
            .map_err(|e| TunnelError::Config(e.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TunnelError::Config(e.to_string())),
        }
    }
}

impl CredentialSource for KeychainCredentials {
    fn credentials(&self, scheme: AuthScheme, host: &str) -> Option<Credentials> {
        let entry = Entry::new(KEYRING_SERVICE, host).ok()?;
        let secret = match entry.get_secret() {
            Ok(s) => s,
            Err(e) => {
                debug!("no keychain {} credentials for {}: {}", scheme, host, e);
                return None;
            }
        };
        decode_secret(&secret)
    }
}

/// Encode as: 4-byte LE username length + username UTF-8 + password UTF-8.
fn encode_secret(credentials: &Credentials) -> Vec<u8> {
    let u = credentials.username.as_bytes();
    let p = credentials.password.as_bytes();
    let mut out = Vec::with_capacity(4 + u.len() + p.len());
    out.extend_from_slice(&(u.len() as u32).to_le_bytes());
    out.extend_from_slice(u);
    out.extend_from_slice(p);
    out
}

fn decode_secret(secret: &[u8]) -> Option<Credentials> {
    if secret.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes([secret[0], secret[1], secret[2], secret[3]]) as usize;
    if 4 + len > secret.len() {
        return None;
    }
    let username = std::str::from_utf8(&secret[4..4 + len]).ok()?;
    let password = std::str::from_utf8(&secret[4 + len..]).ok()?;
    Some(Credentials::new(username, password))
}

/// Credentials read from an XML file:
/// `<credentials><credential><host/><username/><password/></credential>…</credentials>`.
#[derive(Debug, Clone, Default)]
pub struct FileCredentials {
    entries: HashMap<String, Credentials>,
}

impl FileCredentials {
    /// Load from `path`. A missing file yields an empty source.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(TunnelError::Io(e)),
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut entries = HashMap::new();
        let mut host = String::new();
        let mut username = String::new();
        let mut password = String::new();
        let mut in_credential = false;
        let mut element_name = Vec::<u8>::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(TunnelError::Config(format!("XML parse error: {}", e))),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    let name = e.name();
                    let name = name.as_ref();
                    if name == b"credential" {
                        in_credential = true;
                        host.clear();
                        username.clear();
                        password.clear();
                    } else if in_credential
                        && (name == b"host" || name == b"username" || name == b"password")
                    {
                        element_name.clear();
                        element_name.extend_from_slice(name);
                    }
                }
                Ok(Event::Text(e)) => {
                    if !in_credential || element_name.is_empty() {
                        continue;
                    }
                    let text = e
                        .unescape()
                        .map_err(|e| TunnelError::Config(e.to_string()))?
                        .trim()
                        .to_string();
                    match element_name.as_slice() {
                        b"host" => host = text,
                        b"username" => username = text,
                        b"password" => password = text,
                        _ => {}
                    }
                    element_name.clear();
                }
                Ok(Event::End(e)) => {
                    if e.name().as_ref() == b"credential" {
                        if !host.is_empty() {
                            entries.insert(
                                std::mem::take(&mut host),
                                Credentials {
                                    username: std::mem::take(&mut username),
                                    password: std::mem::take(&mut password),
                                },
                            );
                        }
                        in_credential = false;
                    }
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialSource for FileCredentials {
    fn credentials(&self, _scheme: AuthScheme, host: &str) -> Option<Credentials> {
        self.entries.get(host).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_roundtrip() {
        let c = Credentials::new("user:name", "pa:ss");
        assert_eq!(decode_secret(&encode_secret(&c)), Some(c));
        assert_eq!(decode_secret(&[1, 0]), None);
        assert_eq!(decode_secret(&[9, 0, 0, 0, b'a']), None);
    }

    #[test]
    fn file_source_by_host() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<credentials>
  <credential>
    <host>broker.example:443</host>
    <username>alice</username>
    <password>s&amp;cret</password>
  </credential>
  <credential>
    <host>other:8080</host>
    <username>bob</username>
    <password>pw</password>
  </credential>
</credentials>"#;
        let source = FileCredentials::parse(xml).unwrap();
        assert_eq!(source.len(), 2);
        let c = source.credentials(AuthScheme::Digest, "broker.example:443").unwrap();
        assert_eq!(c.username, "alice");
        assert_eq!(c.password, "s&cret");
        assert!(source.credentials(AuthScheme::Basic, "unknown:1").is_none());
    }

    #[test]
    fn missing_file_is_empty() {
        let source = FileCredentials::load(Path::new("/nonexistent/tunnelwire/credentials")).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn keychain_delete_without_entry() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeychainCredentials::delete("broker.example:443").unwrap();
        KeychainCredentials::store("broker.example:443", &Credentials::new("alice", "pw")).unwrap();
    }

    #[test]
    fn fixed_and_none() {
        let fixed = FixedCredentials::new("u", "p");
        assert_eq!(fixed.credentials(AuthScheme::Basic, "h").unwrap().username, "u");
        assert!(NoCredentials.credentials(AuthScheme::Basic, "h").is_none());
    }
}
