/*
 * layer.rs
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

//! Proxy tunnel as a transport layer: intercepts both directions until the
//! tunnel is up, then delegates everything to the wrapped layer.

use tracing::{info, warn};

use super::{DefaultProxyHandler, Negotiation, ProxyConfig, ProxyHandler, ProxyNegotiator, ProxyState};
use crate::auth::{CredentialSource, NoCredentials};
use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};
use crate::transport::{self, TransportLayer};

/// CONNECT tunnel in front of `inner`.
pub struct ProxyLayer<T: TransportLayer> {
    negotiator: ProxyNegotiator,
    input: ByteRegion,
    output: ByteRegion,
    inner: T,
}

impl<T: TransportLayer> ProxyLayer<T> {
    /// Tunnel with the default handler and no credentials.
    pub fn new(config: ProxyConfig, inner: T) -> Self {
        Self::with_handler(config, Box::new(DefaultProxyHandler), Box::new(NoCredentials), inner)
    }

    pub fn with_credentials(config: ProxyConfig, credentials: Box<dyn CredentialSource>, inner: T) -> Self {
        Self::with_handler(config, Box::new(DefaultProxyHandler), credentials, inner)
    }

    pub fn with_handler(
        config: ProxyConfig,
        handler: Box<dyn ProxyHandler>,
        credentials: Box<dyn CredentialSource>,
        inner: T,
    ) -> Self {
        let size = config.buffer_size;
        Self {
            negotiator: ProxyNegotiator::new(config, handler, credentials),
            input: ByteRegion::with_capacity(size),
            output: ByteRegion::with_capacity(size),
            inner,
        }
    }

    pub fn state(&self) -> ProxyState {
        self.negotiator.state()
    }

    pub fn negotiator(&self) -> &ProxyNegotiator {
        &self.negotiator
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn connected(&self) -> bool {
        self.negotiator.state() == ProxyState::Connected
    }

    /// Pass bytes that followed the proxy's response on to the wrapped layer.
    fn forward_leftover(&mut self) -> Result<()> {
        while !self.input.is_empty() {
            let n = transport::feed(&mut self.inner, self.input.readable())?;
            if n == 0 {
                break;
            }
            self.input.consume(n);
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        match self.negotiator.receive(&mut self.input) {
            Ok(Negotiation::Connected) => {
                info!("proxy tunnel to {} established", self.negotiator.config().host);
                self.forward_leftover()
            }
            Ok(_) => {
                let awaiting = matches!(
                    self.negotiator.state(),
                    ProxyState::Connecting | ProxyState::ChallengeResponded
                );
                if awaiting && self.input.remaining() == 0 {
                    let capacity = self.input.capacity();
                    if let Some(e) = self.negotiator.abort(TunnelError::overflow(capacity + 1, capacity)) {
                        warn!("proxy response line exceeds {} bytes", capacity);
                        self.inner.closed(Some(&e));
                        return Err(e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!("proxy tunnel to {} failed: {}", self.negotiator.config().host, e);
                self.inner.closed(Some(&e));
                Err(e)
            }
        }
    }

    fn cancel(&mut self, reason: &str) {
        if let Some(e) = self.negotiator.cancel(reason) {
            warn!("proxy tunnel to {} failed: {}", self.negotiator.config().host, e);
            self.inner.closed(Some(&e));
        }
    }
}

impl<T: TransportLayer> TransportLayer for ProxyLayer<T> {
    fn capacity(&mut self) -> Option<usize> {
        match self.negotiator.state() {
            ProxyState::Connected => {
                if !self.input.is_empty() {
                    if self.forward_leftover().is_err() || !self.input.is_empty() {
                        return Some(0);
                    }
                }
                self.inner.capacity()
            }
            ProxyState::Failed => None,
            _ => Some(self.input.remaining()),
        }
    }

    fn tail(&mut self) -> &mut [u8] {
        if self.connected() {
            if self.input.is_empty() {
                self.inner.tail()
            } else {
                &mut []
            }
        } else {
            self.input.spare()
        }
    }

    fn process(&mut self, written: usize) -> Result<()> {
        match self.negotiator.state() {
            ProxyState::Connected => {
                self.forward_leftover()?;
                self.inner.process(written)
            }
            ProxyState::Failed => Err(TunnelError::Closed("proxy tunnel failed".to_string())),
            _ => {
                self.input.commit(written);
                self.advance()
            }
        }
    }

    fn close_tail(&mut self) {
        self.cancel("inbound closed during proxy handshake");
        self.inner.close_tail();
    }

    fn pending(&mut self) -> Option<usize> {
        if !self.output.is_empty() {
            return Some(self.output.len());
        }
        match self.negotiator.state() {
            ProxyState::Connected => self.inner.pending(),
            ProxyState::Failed => None,
            _ => {
                if let Some(request) = self.negotiator.poll_request() {
                    if let Err(e) = self.output.put(request.as_bytes()) {
                        self.cancel("CONNECT request larger than output buffer");
                        warn!("{}", e);
                        return None;
                    }
                }
                Some(self.output.len())
            }
        }
    }

    fn head(&mut self) -> &[u8] {
        if self.connected() && self.output.is_empty() {
            self.inner.head()
        } else {
            self.output.readable()
        }
    }

    fn pop(&mut self, n: usize) {
        if self.connected() && self.output.is_empty() {
            self.inner.pop(n);
        } else {
            self.output.consume(n);
        }
    }

    fn close_head(&mut self) {
        self.cancel("outbound closed during proxy handshake");
        self.inner.close_head();
    }

    fn closed(&mut self, error: Option<&TunnelError>) {
        self.inner.closed(error);
    }
}
