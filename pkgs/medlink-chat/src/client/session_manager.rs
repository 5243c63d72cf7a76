//! Socket session lifecycle
//!
//! Owns the single live transport handle of the client. Every session gets a
//! serial number when it is opened; transport events carry that serial and
//! are ignored unless they belong to the current session. Together with the
//! close-before-open rule in [`ConnectionSessionManager::connect`] this keeps
//! at most one session able to deliver messages at any time.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::events::Inbound;
use crate::models::{SessionKey, SessionState};
use crate::transport::{OutboundFrame, SessionSink, SocketHandle, SocketTransport, TransportEvent};

struct ActiveSession {
    key: SessionKey,
    serial: u64,
    state: SessionState,
    handle: Box<dyn SocketHandle>,
}

/// Session lifecycle manager
pub struct ConnectionSessionManager {
    transport: Arc<dyn SocketTransport>,
    inbox: mpsc::UnboundedSender<Inbound>,
    current: Option<ActiveSession>,
    /// Key and final state of the most recently torn down session
    last: Option<(SessionKey, SessionState)>,
    next_serial: u64,
}

impl ConnectionSessionManager {
    pub(crate) fn new(
        transport: Arc<dyn SocketTransport>,
        inbox: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        Self {
            transport,
            inbox,
            current: None,
            last: None,
            next_serial: 1,
        }
    }

    /// Open a session for `key`.
    ///
    /// No-op when a live session with the same key exists. Otherwise any
    /// existing session is closed before the transport is asked for the new
    /// one. Returns whether a new session was started.
    pub fn connect(&mut self, key: SessionKey) -> Result<bool> {
        if let Some(active) = &self.current {
            if active.key == key && active.state.is_live() {
                debug!("Session {} already live, not reconnecting", key);
                return Ok(false);
            }
        }

        self.close();

        let serial = self.next_serial;
        self.next_serial += 1;

        let sink = SessionSink::new(serial, key.clone(), self.inbox.clone());
        match self.transport.open(&key, sink) {
            Ok(handle) => {
                info!("Opening session {} (serial {})", key, serial);
                self.current = Some(ActiveSession {
                    key,
                    serial,
                    state: SessionState::Connecting,
                    handle,
                });
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to open session {}: {}", key, e);
                self.last = Some((key, SessionState::Closed));
                Err(e)
            }
        }
    }

    /// Close the current session, if any. Returns the key that was closed.
    pub fn close(&mut self) -> Option<SessionKey> {
        let mut active = self.current.take()?;
        active.handle.close();
        info!("Closed session {} (serial {})", active.key, active.serial);
        self.last = Some((active.key.clone(), SessionState::Closed));
        Some(active.key)
    }

    /// Apply a transport event.
    ///
    /// Returns the event back when it belongs to the current session, `None`
    /// when it came from a session that has already been replaced or closed.
    pub fn handle_event(&mut self, serial: u64, event: TransportEvent) -> Option<TransportEvent> {
        let Some(active) = self.current.as_mut().filter(|a| a.serial == serial) else {
            debug!("Dropping event from stale session serial {}", serial);
            return None;
        };

        match &event {
            TransportEvent::Opened => {
                if active.state == SessionState::Connecting {
                    active.state = SessionState::Open;
                    info!("Session {} open", active.key);
                }
            }
            TransportEvent::Frame(_) => {
                if active.state != SessionState::Open {
                    debug!("Frame on session {} before open event", active.key);
                    active.state = SessionState::Open;
                }
            }
            TransportEvent::Closed | TransportEvent::Error(_) => {
                // no automatic reconnect; a fresh connect() is required
                if let Some(mut ended) = self.current.take() {
                    ended.handle.close();
                    info!("Session {} ended", ended.key);
                    self.last = Some((ended.key, SessionState::Closed));
                }
            }
        }
        Some(event)
    }

    /// Send a frame over the current session
    pub fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        match self.current.as_mut() {
            Some(active) if active.state == SessionState::Open => active.handle.send(frame),
            Some(active) => Err(ChatError::Transport(format!(
                "session {} is not open yet",
                active.key
            ))),
            None => Err(ChatError::Transport("no session".to_string())),
        }
    }

    pub fn key(&self) -> Option<&SessionKey> {
        self.current.as_ref().map(|a| &a.key)
    }

    pub fn state(&self) -> SessionState {
        match (&self.current, &self.last) {
            (Some(active), _) => active.state,
            (None, Some((_, state))) => *state,
            (None, None) => SessionState::Disconnected,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Number of sessions in connecting/open state (never more than one)
    pub fn live_sessions(&self) -> usize {
        self.current
            .iter()
            .filter(|a| a.state.is_live())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn current_serial(&self) -> Option<u64> {
        self.current.as_ref().map(|a| a.serial)
    }
}
