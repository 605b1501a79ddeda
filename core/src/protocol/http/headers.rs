/*
 * headers.rs
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

//! Response header block: ordered multimap with case-insensitive names.

use crate::error::{Result, TunnelError};

/// Header names in first-seen order; values for a repeated name accumulate in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value.to_string()),
            None => self.entries.push((name.to_string(), vec![value.to_string()])),
        }
    }

    /// All values for `name`, in arrival order.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `Name: Value` into trimmed name and value.
pub fn parse_header_line(line: &str) -> Result<(&str, &str)> {
    let colon = line
        .find(':')
        .ok_or_else(|| TunnelError::MalformedHeader(line.to_string()))?;
    let name = line[..colon].trim();
    if name.is_empty() {
        return Err(TunnelError::MalformedHeader(line.to_string()));
    }
    Ok((name, line[colon + 1..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_accumulate_in_order() {
        let mut h = Headers::new();
        h.add("Proxy-Authenticate", "Digest realm=\"r\"");
        h.add("Content-Length", "0");
        h.add("proxy-authenticate", "Basic realm=\"r\"");
        assert_eq!(h.len(), 2);
        assert_eq!(
            h.get("PROXY-AUTHENTICATE").unwrap(),
            &["Digest realm=\"r\"".to_string(), "Basic realm=\"r\"".to_string()]
        );
        assert_eq!(h.first("content-length"), Some("0"));
    }

    #[test]
    fn header_line_split() {
        assert_eq!(parse_header_line("Host:  a:443 ").unwrap(), ("Host", "a:443"));
        assert!(matches!(
            parse_header_line("no colon here"),
            Err(TunnelError::MalformedHeader(_))
        ));
        assert!(parse_header_line(": value").is_err());
    }
}
