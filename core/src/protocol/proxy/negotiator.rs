/*
 * negotiator.rs
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

//! CONNECT handshake state machine, independent of buffering and I/O.

use tracing::{debug, trace};

use super::{ProxyConfig, ProxyHandler, ProxyState};
use crate::auth::{ChallengeResponder, CredentialSource, ProxyChallenge, PROXY_AUTHORIZATION};
use crate::buffer::ByteRegion;
use crate::error::{Result, TunnelError};
use crate::protocol::http::{Assembly, HttpResponse, ResponseAssembler};

/// Internal state; `Challenge` carries the authorization to send.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Connecting,
    Challenge { authorization: String },
    ChallengeResponded,
    Connected,
    Failed,
}

impl Phase {
    fn state(&self) -> ProxyState {
        match self {
            Phase::NotStarted => ProxyState::NotStarted,
            Phase::Connecting => ProxyState::Connecting,
            Phase::Challenge { .. } => ProxyState::Challenge,
            Phase::ChallengeResponded => ProxyState::ChallengeResponded,
            Phase::Connected => ProxyState::Connected,
            Phase::Failed => ProxyState::Failed,
        }
    }
}

/// Result of feeding response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Response incomplete (or none expected yet); feed more bytes later.
    NeedMore,
    /// 407 answered; the next outbound poll sends the authorized CONNECT.
    Challenged,
    Connected,
}

/// Drives one CONNECT negotiation.
pub struct ProxyNegotiator {
    phase: Phase,
    config: ProxyConfig,
    handler: Box<dyn ProxyHandler>,
    responder: ChallengeResponder,
    assembler: ResponseAssembler,
    last_response: Option<HttpResponse>,
}

impl ProxyNegotiator {
    pub fn new(
        config: ProxyConfig,
        handler: Box<dyn ProxyHandler>,
        credentials: Box<dyn CredentialSource>,
    ) -> Self {
        let responder = ChallengeResponder::new(credentials, config.auth_type);
        Self {
            phase: Phase::NotStarted,
            config,
            handler,
            responder,
            assembler: ResponseAssembler::new(),
            last_response: None,
        }
    }

    pub fn state(&self) -> ProxyState {
        self.phase.state()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Last complete response from the proxy.
    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.last_response.as_ref()
    }

    /// Outbound poll: the request to write now, if the state calls for one.
    pub fn poll_request(&mut self) -> Option<String> {
        let (request, next) = match &self.phase {
            Phase::NotStarted => (
                self.handler.create_request(&self.config.host, &self.config.headers),
                Phase::Connecting,
            ),
            Phase::Challenge { authorization } => {
                let mut headers = self.config.headers.clone();
                headers.push((PROXY_AUTHORIZATION.to_string(), authorization.clone()));
                (
                    self.handler.create_request(&self.config.host, &headers),
                    Phase::ChallengeResponded,
                )
            }
            _ => return None,
        };
        self.transition(next);
        Some(request)
    }

    /// Feed bytes from the proxy. Bytes after a complete response stay in `input`.
    /// On error the state is Failed.
    pub fn receive(&mut self, input: &mut ByteRegion) -> Result<Negotiation> {
        if !matches!(self.phase, Phase::Connecting | Phase::ChallengeResponded) {
            return Ok(Negotiation::NeedMore);
        }
        let response = match self.assembler.receive(input) {
            Ok(Assembly::Complete(r)) => r,
            Ok(Assembly::Incomplete) | Ok(Assembly::MissingContent { .. }) => {
                trace!("proxy response incomplete, {} bytes buffered", input.len());
                return Ok(Negotiation::NeedMore);
            }
            Err(e) => return Err(self.fail_with(e)),
        };
        debug!("proxy response: {}", response.status);
        let next = self.on_response(&response);
        self.last_response = Some(response);
        match next {
            Ok(phase) => {
                let outcome = match phase {
                    Phase::Connected => Negotiation::Connected,
                    Phase::Challenge { .. } => Negotiation::Challenged,
                    _ => Negotiation::NeedMore,
                };
                self.transition(phase);
                Ok(outcome)
            }
            Err(e) => Err(self.fail_with(e)),
        }
    }

    /// Next phase for a complete response in the current phase.
    fn on_response(&mut self, response: &HttpResponse) -> Result<Phase> {
        let accepted = self.handler.validate_response(response);
        match self.phase {
            Phase::Connecting if accepted => match self.config.auth_type {
                None => Ok(Phase::Connected),
                Some(scheme) => Err(TunnelError::AuthConfigMismatch(format!(
                    "{} authentication configured but proxy did not challenge",
                    scheme
                ))),
            },
            Phase::Connecting => {
                let challenge = ProxyChallenge::from_response(response);
                if challenge.is_empty() {
                    return Err(rejected(response));
                }
                if let Some(scheme) = self.config.auth_type {
                    if !challenge.offers(scheme) {
                        return Err(TunnelError::AuthConfigMismatch(format!(
                            "{} authentication configured but proxy offered {:?}",
                            scheme,
                            challenge.schemes()
                        )));
                    }
                }
                match self.responder.respond(&challenge, &self.config.host)? {
                    Some((_, authorization)) => Ok(Phase::Challenge { authorization }),
                    None => Err(TunnelError::UnsupportedAuthScheme(format!(
                        "{:?}",
                        challenge.schemes()
                    ))),
                }
            }
            Phase::ChallengeResponded if accepted => Ok(Phase::Connected),
            Phase::ChallengeResponded => Err(rejected(response)),
            _ => Ok(self.phase.clone()),
        }
    }

    /// Abort a pending negotiation (e.g. the transport closed). No-op once terminal.
    pub fn cancel(&mut self, reason: &str) -> Option<TunnelError> {
        self.abort(TunnelError::Closed(reason.to_string()))
    }

    /// Fail a pending negotiation with `error`. No-op once terminal.
    pub fn abort(&mut self, error: TunnelError) -> Option<TunnelError> {
        if self.state().is_terminal() {
            return None;
        }
        Some(self.fail_with(error))
    }

    fn fail_with(&mut self, error: TunnelError) -> TunnelError {
        self.transition(Phase::Failed);
        error
    }

    fn transition(&mut self, next: Phase) {
        if next != self.phase {
            debug!(
                "proxy {}: {:?} -> {:?}",
                self.config.host,
                self.phase.state(),
                next.state()
            );
        }
        self.phase = next;
    }
}

fn rejected(response: &HttpResponse) -> TunnelError {
    TunnelError::ConnectRejected {
        code: response.status.code,
        reason: response.status.reason.clone(),
    }
}
