//! Socket transport seam
//!
//! A transport opens one logical connection per [`SessionKey`]. Opening must
//! not block: the transport hands back a [`SocketHandle`] immediately and
//! reports progress (open, inbound frames, close, errors) through the
//! [`SessionSink`] it was given. The sink stamps every report with the
//! session's serial so that reports from a session that has since been
//! replaced are recognised and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::Inbound;
use crate::models::{RoomId, SessionKey, UserId};

/// Structured message object received over a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub sender: UserId,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Structured message object sent over a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    pub sender: UserId,
    pub receiver: UserId,
    pub text: String,
}

/// Lifecycle and data events produced by a transport session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(InboundFrame),
    Closed,
    Error(String),
}

/// Where a transport session reports its events
#[derive(Debug, Clone)]
pub struct SessionSink {
    serial: u64,
    key: SessionKey,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl SessionSink {
    pub(crate) fn new(serial: u64, key: SessionKey, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { serial, key, tx }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Report an event. Returns false once the receiving side is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Inbound::Session {
                serial: self.serial,
                event,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn frame(&self, frame: InboundFrame) -> bool {
        self.emit(TransportEvent::Frame(frame))
    }

    pub fn closed(&self) -> bool {
        self.emit(TransportEvent::Closed)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }
}

/// Factory for socket sessions
pub trait SocketTransport: Send + Sync {
    /// Begin opening a session for `key`; must return without waiting for the connection.
    fn open(&self, key: &SessionKey, sink: SessionSink) -> Result<Box<dyn SocketHandle>>;
}

/// Owned handle to one open (or opening) session
pub trait SocketHandle: Send {
    fn send(&mut self, frame: OutboundFrame) -> Result<()>;

    /// Tear the session down. Must be safe to call more than once.
    fn close(&mut self);
}
