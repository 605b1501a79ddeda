/*
 * config.rs
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

//! Tunnel configuration file.
//!
//! ```xml
//! <tunnel>
//!   <proxy host="broker:443" auth="digest">
//!     <header name="User-Agent" value="tunnelwire"/>
//!   </proxy>
//!   <websocket host="broker" path="/ws" query="" protocol="amqp" max-frame-size="65536"/>
//! </tunnel>
//! ```
//!
//! All XML read/write uses the quick_xml parser/writer.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::auth::AuthScheme;
use crate::error::{Result, TunnelError};
use crate::protocol::proxy::ProxyConfig;
use crate::protocol::websocket::WebSocketConfig;

/// Which layers to stack, and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfig {
    pub proxy: Option<ProxyConfig>,
    pub websocket: Option<WebSocketConfig>,
}

fn config_error<E: std::fmt::Display>(e: E) -> TunnelError {
    TunnelError::Config(e.to_string())
}

/// Section currently open, for routing `<header>` elements.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Proxy,
    WebSocket,
}

/// Attributes of `e` as (name, unescaped value) pairs.
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(config_error)?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(config_error)?.into_owned();
        out.push((name, value));
    }
    Ok(out)
}

fn parse_size(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| TunnelError::Config(format!("{}: not a number: {}", name, value)))
}

fn proxy_from(attrs: &[(String, String)]) -> Result<ProxyConfig> {
    let mut config = ProxyConfig::new("");
    for (name, value) in attrs {
        match name.as_str() {
            "host" => config.host = value.clone(),
            "auth" => {
                let scheme = AuthScheme::from_name(value)
                    .ok_or_else(|| TunnelError::Config(format!("unknown auth type: {}", value)))?;
                config.auth_type = Some(scheme);
            }
            "buffer-size" => config.buffer_size = parse_size(name, value)?,
            _ => {}
        }
    }
    if config.host.is_empty() {
        return Err(TunnelError::Config("proxy host missing".to_string()));
    }
    Ok(config)
}

fn websocket_from(attrs: &[(String, String)]) -> Result<WebSocketConfig> {
    let mut config = WebSocketConfig::new("", "");
    for (name, value) in attrs {
        match name.as_str() {
            "host" => config.host = value.clone(),
            "path" => config.path = value.clone(),
            "query" => config.query = value.clone(),
            "protocol" => config.protocol = value.clone(),
            "max-frame-size" => config = config.with_max_frame_size(parse_size(name, value)?),
            _ => {}
        }
    }
    Ok(config)
}

fn header_from(attrs: &[(String, String)]) -> Result<(String, String)> {
    let find = |key: &str| attrs.iter().find(|(n, _)| n == key).map(|(_, v)| v.clone());
    match (find("name"), find("value")) {
        (Some(name), Some(value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(TunnelError::Config("header needs name and value".to_string())),
    }
}

impl TunnelConfig {
    /// Load from `path`. A missing file gives an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(TunnelConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut config = TunnelConfig::default();
        let mut section = Section::None;

        loop {
            match reader.read_event_into(&mut buf).map_err(config_error)? {
                Event::Eof => break,
                Event::Start(e) => section = config.element(&e, section, false)?,
                Event::Empty(e) => section = config.element(&e, section, true)?,
                Event::End(e) => {
                    if matches!(e.name().as_ref(), b"proxy" | b"websocket") {
                        section = Section::None;
                    }
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(config)
    }

    /// Apply one opening or empty element; returns the section now open.
    fn element(&mut self, e: &BytesStart<'_>, section: Section, empty: bool) -> Result<Section> {
        let attrs = attributes(e)?;
        let opened = match e.name().as_ref() {
            b"proxy" => {
                self.proxy = Some(proxy_from(&attrs)?);
                Section::Proxy
            }
            b"websocket" => {
                self.websocket = Some(websocket_from(&attrs)?);
                Section::WebSocket
            }
            b"header" => {
                let header = header_from(&attrs)?;
                let headers = match section {
                    Section::Proxy => self.proxy.as_mut().map(|p| &mut p.headers),
                    Section::WebSocket => self.websocket.as_mut().map(|w| &mut w.headers),
                    Section::None => None,
                };
                match headers {
                    Some(h) => h.push(header),
                    None => return Err(TunnelError::Config("header outside proxy or websocket".to_string())),
                }
                return Ok(section);
            }
            _ => return Ok(section),
        };
        Ok(if empty { Section::None } else { opened })
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(config_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("tunnel")))
            .map_err(config_error)?;
        if let Some(p) = &self.proxy {
            let mut start = BytesStart::new("proxy");
            start.push_attribute(("host", p.host.as_str()));
            if let Some(scheme) = p.auth_type {
                start.push_attribute(("auth", scheme.name()));
            }
            let size = p.buffer_size.to_string();
            start.push_attribute(("buffer-size", size.as_str()));
            write_section(&mut writer, start, "proxy", &p.headers)?;
        }
        if let Some(w) = &self.websocket {
            let mut start = BytesStart::new("websocket");
            start.push_attribute(("host", w.host.as_str()));
            start.push_attribute(("path", w.path.as_str()));
            start.push_attribute(("query", w.query.as_str()));
            start.push_attribute(("protocol", w.protocol.as_str()));
            let size = w.max_frame_size.to_string();
            start.push_attribute(("max-frame-size", size.as_str()));
            write_section(&mut writer, start, "websocket", &w.headers)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("tunnel")))
            .map_err(config_error)?;
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, xml)?;
        Ok(())
    }
}

fn write_section<W: std::io::Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    name: &str,
    headers: &[(String, String)],
) -> Result<()> {
    if headers.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(config_error);
    }
    writer.write_event(Event::Start(start)).map_err(config_error)?;
    for (n, v) in headers {
        let mut header = BytesStart::new("header");
        header.push_attribute(("name", n.as_str()));
        header.push_attribute(("value", v.as_str()));
        writer.write_event(Event::Empty(header)).map_err(config_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(config_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tunnel>
  <proxy host="broker.example:443" auth="digest">
    <header name="User-Agent" value="tunnelwire"/>
  </proxy>
  <websocket host="broker.example" path="/ws" query="vhost=a&amp;b" protocol="amqp" max-frame-size="4096">
    <header name="Origin" value="https://example"/>
  </websocket>
</tunnel>"#;

    #[test]
    fn parses_sample() {
        let c = TunnelConfig::parse(SAMPLE).unwrap();
        let p = c.proxy.unwrap();
        assert_eq!(p.host, "broker.example:443");
        assert_eq!(p.auth_type, Some(AuthScheme::Digest));
        assert_eq!(p.headers, vec![("User-Agent".to_string(), "tunnelwire".to_string())]);
        let w = c.websocket.unwrap();
        assert_eq!(w.path, "/ws");
        assert_eq!(w.query, "vhost=a&b");
        assert_eq!(w.protocol, "amqp");
        assert_eq!(w.max_frame_size, 4096);
        assert_eq!(w.headers.len(), 1);
    }

    #[test]
    fn websocket_only() {
        let c = TunnelConfig::parse(r#"<tunnel><websocket host="h" protocol="amqp"/></tunnel>"#).unwrap();
        assert!(c.proxy.is_none());
        assert_eq!(c.websocket.unwrap().path, "/");
    }

    #[test]
    fn unknown_auth_rejected() {
        let err = TunnelConfig::parse(r#"<tunnel><proxy host="h:1" auth="ntlm"/></tunnel>"#).unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
    }

    #[test]
    fn bad_size_rejected() {
        let err = TunnelConfig::parse(r#"<tunnel><websocket host="h" protocol="p" max-frame-size="big"/></tunnel>"#)
            .unwrap_err();
        assert!(err.to_string().contains("max-frame-size"));
    }

    #[test]
    fn stray_header_rejected() {
        assert!(TunnelConfig::parse(r#"<tunnel><header name="a" value="b"/></tunnel>"#).is_err());
    }

    #[test]
    fn save_then_load() {
        let c = TunnelConfig::parse(SAMPLE).unwrap();
        let dir = std::env::temp_dir().join(format!("tunnelwire-config-{}", std::process::id()));
        let path = dir.join("tunnel.xml");
        c.save(&path).unwrap();
        assert_eq!(TunnelConfig::load(&path).unwrap(), c);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_empty() {
        let c = TunnelConfig::load(Path::new("/nonexistent/tunnelwire.xml")).unwrap();
        assert_eq!(c, TunnelConfig::default());
    }
}
