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

//! Minimal HTTP/1.1 response handling for handshakes.
//!
//! Only what the CONNECT and Upgrade exchanges need: status line, header
//! block, and a Content-Length body. No chunked encoding, no requests beyond
//! the two handshake writers in `proxy` and `websocket`.

mod headers;
mod response;
mod status;

pub use headers::{parse_header_line, Headers};
pub use response::{Assembly, AssemblyState, HttpResponse, ResponseAssembler, DEFAULT_MAX_BODY};
pub use status::StatusLine;
