/*
 * driver.rs
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

//! Moves bytes between a tokio stream and a layer stack.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, TunnelError};
use crate::transport::TransportLayer;

pub struct Driver<S, L> {
    stream: S,
    layer: L,
    eof: bool,
    shutdown: bool,
}

impl<S, L> Driver<S, L>
where
    S: AsyncRead + AsyncWrite + Unpin,
    L: TransportLayer,
{
    pub fn new(stream: S, layer: L) -> Self {
        Self {
            stream,
            layer,
            eof: false,
            shutdown: false,
        }
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut L {
        &mut self.layer
    }

    /// True once the peer closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn into_parts(self) -> (S, L) {
        (self.stream, self.layer)
    }

    /// Write everything the stack has ready. Shuts down the write half when
    /// the stack reports end of output.
    pub async fn flush(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            let n = match self.layer.pending() {
                Some(n) => n,
                None => {
                    if !self.shutdown {
                        self.shutdown = true;
                        debug!("output ended; shutting down write half");
                        self.stream.shutdown().await?;
                    }
                    break;
                }
            };
            let head = self.layer.head();
            let n = n.min(head.len());
            if n == 0 {
                break;
            }
            self.stream.write_all(&head[..n]).await?;
            self.layer.pop(n);
            total += n;
        }
        if !self.shutdown {
            self.stream.flush().await?;
        }
        Ok(total)
    }

    /// One read from the stream into the stack. Returns bytes read: 0 at end of
    /// stream (the stack's tail is closed) or when the stack has no room.
    pub async fn read(&mut self) -> Result<usize> {
        let capacity = match self.layer.capacity() {
            Some(c) => c,
            None => return Err(TunnelError::Closed("stack accepts no more input".to_string())),
        };
        let tail = self.layer.tail();
        let n = capacity.min(tail.len());
        if n == 0 {
            return Ok(0);
        }
        let read = self.stream.read(&mut tail[..n]).await?;
        if read == 0 {
            self.eof = true;
            self.layer.close_tail();
            return Ok(0);
        }
        self.layer.process(read)?;
        Ok(read)
    }

    /// Alternate flush and read until `done` holds for the stack.
    pub async fn run_until<F>(&mut self, mut done: F) -> Result<()>
    where
        F: FnMut(&L) -> bool,
    {
        loop {
            self.flush().await?;
            if done(&self.layer) {
                return Ok(());
            }
            if self.eof {
                return Err(TunnelError::Closed("peer closed before condition was met".to_string()));
            }
            if self.read().await? == 0 && !self.eof {
                let available = self.layer.capacity().unwrap_or(0);
                return Err(TunnelError::overflow(1, available));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BufferTransport;

    #[tokio::test]
    async fn flush_and_read_endpoint() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut endpoint = BufferTransport::new();
        endpoint.send(b"ping").unwrap();
        let mut driver = Driver::new(client, endpoint);
        assert_eq!(driver.flush().await.unwrap(), 4);
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.write_all(b"pong").await.unwrap();
        assert_eq!(driver.read().await.unwrap(), 4);
        assert_eq!(driver.layer().received(), b"pong");
    }

    #[tokio::test]
    async fn eof_closes_tail() {
        let (client, server) = tokio::io::duplex(64);
        let mut driver = Driver::new(client, BufferTransport::new());
        drop(server);
        assert_eq!(driver.read().await.unwrap(), 0);
        assert!(driver.is_eof());
        assert!(driver.layer().is_tail_closed());
        assert!(driver.run_until(|_| false).await.is_err());
    }
}
