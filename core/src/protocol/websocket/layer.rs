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

//! WebSocket as a transport layer: upgrade handshake, then binary frames
//! around whatever the wrapped layer sends and receives.

use tracing::{debug, info, warn};

use super::frame::{self, MAX_HEADER_SIZE};
use super::{
    find_head_end, FrameReadState, FrameReader, FrameSink, Handshake, ReadOutcome, WebSocketConfig, WebSocketState,
};
use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};
use crate::transport::TransportLayer;

/// Smallest region; the upgrade request and reply must fit.
const MIN_BUFFER: usize = 4096;

/// Delivers unwrapped payload into the wrapped layer's tail.
struct InnerSink<'a, T: TransportLayer> {
    inner: &'a mut T,
}

impl<T: TransportLayer> FrameSink for InnerSink<'_, T> {
    fn capacity(&mut self) -> usize {
        self.inner.capacity().unwrap_or(0)
    }

    fn payload(&mut self, data: &[u8]) -> Result<()> {
        let tail = self.inner.tail();
        if data.len() > tail.len() {
            return Err(TunnelError::overflow(data.len(), tail.len()));
        }
        tail[..data.len()].copy_from_slice(data);
        self.inner.process(data.len())
    }
}

/// WebSocket client framing in front of `inner`.
pub struct WebSocketLayer<T: TransportLayer> {
    config: WebSocketConfig,
    state: WebSocketState,
    handshake: Option<Handshake>,
    reader: FrameReader,
    input: ByteRegion,
    output: ByteRegion,
    /// Pong or close echo waiting to go out.
    control: ByteRegion,
    inner: T,
}

impl<T: TransportLayer> WebSocketLayer<T> {
    pub fn new(config: WebSocketConfig, inner: T) -> Self {
        let size = (config.max_frame_size + MAX_HEADER_SIZE).max(MIN_BUFFER);
        Self {
            config,
            state: WebSocketState::NotStarted,
            handshake: None,
            reader: FrameReader::new(),
            input: ByteRegion::with_capacity(size),
            output: ByteRegion::with_capacity(size),
            control: ByteRegion::with_capacity(MAX_HEADER_SIZE + frame::MAX_CONTROL_PAYLOAD),
            inner,
        }
    }

    pub fn state(&self) -> WebSocketState {
        self.state
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
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

    fn transition(&mut self, next: WebSocketState) {
        if self.state != next {
            debug!("websocket {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, e: TunnelError) -> TunnelError {
        warn!("websocket to {} failed: {}", self.config.host, e);
        self.transition(WebSocketState::Failed);
        self.output.clear();
        self.inner.closed(Some(&e));
        e
    }

    /// Queue the upgrade request.
    fn start(&mut self) -> Result<()> {
        let handshake = Handshake::new()?;
        let request = handshake.request(&self.config)?;
        self.output.put(request.as_bytes())?;
        self.handshake = Some(handshake);
        self.transition(WebSocketState::Connecting);
        Ok(())
    }

    /// Look for the complete reply head and validate it.
    fn check_upgrade(&mut self) -> Result<()> {
        let end = match find_head_end(self.input.readable()) {
            Some(end) => end,
            None => {
                if self.input.remaining() == 0 {
                    return Err(TunnelError::UpgradeValidationFailed(format!(
                        "reply head exceeds {} bytes",
                        self.input.capacity()
                    )));
                }
                return Ok(());
            }
        };
        let reply = String::from_utf8_lossy(&self.input.readable()[..end]).into_owned();
        match &self.handshake {
            Some(h) => h.validate(&reply, &self.config.protocol)?,
            None => {
                return Err(TunnelError::UpgradeValidationFailed(
                    "reply before upgrade request".to_string(),
                ))
            }
        }
        self.input.consume(end);
        self.handshake = None;
        self.transition(WebSocketState::ConnectedFlow);
        info!("websocket to {}{} established", self.config.host, self.config.path);
        self.read_frames()
    }

    /// Unwrap buffered frames into the wrapped layer, answering control frames.
    fn read_frames(&mut self) -> Result<()> {
        loop {
            let outcome = {
                let mut sink = InnerSink { inner: &mut self.inner };
                self.reader.read(&mut self.input, &mut sink)?
            };
            match outcome {
                ReadOutcome::Ping => {
                    // Only the latest ping is answered.
                    self.control.clear();
                    let n = frame::build_pong(self.reader.control_frame(), self.control.spare())?;
                    self.control.commit(n);
                    self.reader.clear_control();
                    self.transition(WebSocketState::ConnectedPong);
                }
                ReadOutcome::Close => {
                    self.control.clear();
                    self.control.put(self.reader.control_frame())?;
                    self.reader.clear_control();
                    self.input.clear();
                    self.transition(WebSocketState::ConnectedClosing);
                    self.inner.close_tail();
                    return Ok(());
                }
                ReadOutcome::NeedMore | ReadOutcome::Blocked => return Ok(()),
            }
        }
    }

    /// Frame up to `max_frame_size` bytes of the wrapped layer's output.
    fn wrap_pending(&mut self) -> Result<Option<usize>> {
        let n = match self.inner.pending() {
            None => return Ok(None),
            Some(0) => return Ok(Some(0)),
            Some(n) => n,
        };
        let mask = frame::random_mask()?;
        let payload = self.inner.head();
        let take = n.min(payload.len()).min(self.config.max_frame_size);
        let written = frame::wrap(&payload[..take], &mask, self.output.spare())?;
        self.output.commit(written);
        self.inner.pop(take);
        Ok(Some(self.output.len()))
    }

    /// Move the queued pong or close echo into the output.
    fn flush_control(&mut self) -> Result<()> {
        self.output.put(self.control.readable())?;
        self.control.clear();
        Ok(())
    }

    fn try_pending(&mut self) -> Result<Option<usize>> {
        match self.state {
            WebSocketState::NotStarted => {
                self.start()?;
                if !self.input.is_empty() {
                    self.check_upgrade()?;
                }
                Ok(Some(self.output.len()))
            }
            WebSocketState::Connecting => Ok(Some(0)),
            WebSocketState::ConnectedFlow => self.wrap_pending(),
            WebSocketState::ConnectedPong => {
                self.flush_control()?;
                self.transition(WebSocketState::ConnectedFlow);
                Ok(Some(self.output.len()))
            }
            WebSocketState::ConnectedClosing => {
                self.flush_control()?;
                self.transition(WebSocketState::Closed);
                Ok(Some(self.output.len()))
            }
            WebSocketState::Closed | WebSocketState::Failed => Ok(None),
        }
    }
}

impl<T: TransportLayer> TransportLayer for WebSocketLayer<T> {
    fn capacity(&mut self) -> Option<usize> {
        match self.state {
            WebSocketState::Closed | WebSocketState::Failed | WebSocketState::ConnectedClosing => None,
            WebSocketState::ConnectedFlow | WebSocketState::ConnectedPong => {
                // Give a previously blocked upper layer another chance first.
                // A partial header only moves forward on new bytes.
                if self.reader.state() == FrameReadState::ContinuedFrameRead && !self.input.is_empty() {
                    if let Err(e) = self.read_frames() {
                        self.fail(e);
                        return None;
                    }
                    if !self.state.is_connected() || self.state == WebSocketState::ConnectedClosing {
                        return None;
                    }
                }
                Some(self.input.remaining())
            }
            _ => Some(self.input.remaining()),
        }
    }

    fn tail(&mut self) -> &mut [u8] {
        self.input.spare()
    }

    fn process(&mut self, written: usize) -> Result<()> {
        match self.state {
            WebSocketState::Closed | WebSocketState::Failed => {
                return Err(TunnelError::Closed("websocket closed".to_string()))
            }
            // Peer already closed; anything after its close frame is dropped.
            WebSocketState::ConnectedClosing => return Ok(()),
            _ => self.input.commit(written),
        }
        let result = match self.state {
            WebSocketState::Connecting => self.check_upgrade(),
            WebSocketState::ConnectedFlow | WebSocketState::ConnectedPong => self.read_frames(),
            _ => Ok(()),
        };
        result.map_err(|e| self.fail(e))
    }

    fn close_tail(&mut self) {
        match self.state {
            WebSocketState::NotStarted | WebSocketState::Connecting => {
                self.fail(TunnelError::Closed("inbound closed during WebSocket handshake".to_string()));
            }
            WebSocketState::Failed => {}
            _ => self.transition(WebSocketState::Closed),
        }
        self.inner.close_tail();
    }

    fn pending(&mut self) -> Option<usize> {
        if !self.output.is_empty() {
            return Some(self.output.len());
        }
        match self.try_pending() {
            Ok(n) => n,
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn head(&mut self) -> &[u8] {
        self.output.readable()
    }

    fn pop(&mut self, n: usize) {
        self.output.consume(n);
    }

    fn close_head(&mut self) {
        match self.state {
            WebSocketState::NotStarted | WebSocketState::Connecting => {
                self.fail(TunnelError::Closed("outbound closed during WebSocket handshake".to_string()));
            }
            WebSocketState::Failed => {}
            _ => self.transition(WebSocketState::Closed),
        }
        self.inner.close_head();
    }

    fn closed(&mut self, error: Option<&TunnelError>) {
        self.inner.closed(error);
    }
}
