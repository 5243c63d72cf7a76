//! Domain data structures shared by every component

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RoomId = String;
pub type UserId = String;
pub type DoctorId = String;
pub type RequestId = String;

/// Which side of the care relationship a conversation's counterpart is on.
///
/// Doubles as the directory tab selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A counterpart thread shown in the conversation list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: RoomId,
    pub counterpart_id: UserId,
    pub name: String,
    pub role: Role,
    pub last_message: Option<String>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub unread: bool,
}

/// Where a timeline entry came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageOrigin {
    History,
    LiveInbound,
    LiveOutbound,
}

/// Persistence state of a timeline entry.
///
/// Only outbound entries ever leave `Confirmed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed,
}

/// Timeline entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Server id for history and inbound entries, `local-*` for optimistic ones
    pub id: String,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub origin: MessageOrigin,
    pub delivery: DeliveryState,
    /// Server-assigned id learned from the send acknowledgment
    pub server_id: Option<String>,
}

impl Message {
    pub fn is_local(&self) -> bool {
        self.origin == MessageOrigin::LiveOutbound
    }
}

/// Doctor summary as returned by search and pending-request listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoctorSummary {
    pub id: DoctorId,
    pub full_name: String,
    pub specialization: Option<String>,
}

/// Connection request status; both non-pending states are terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

/// Doctor-to-doctor relationship request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionRequest {
    pub id: RequestId,
    /// The other doctor: the requester for incoming requests, the target for outgoing ones
    pub doctor: DoctorSummary,
    pub direction: RequestDirection,
    pub status: RequestStatus,
}

/// Search hit with the per-session "already requested" marker
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorSearchResult {
    pub doctor: DoctorSummary,
    pub(crate) request_sent: bool,
}

impl DoctorSearchResult {
    pub(crate) fn new(doctor: DoctorSummary) -> Self {
        Self {
            doctor,
            request_sent: false,
        }
    }

    pub fn request_sent(&self) -> bool {
        self.request_sent
    }
}

/// Key of a socket session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    Room(RoomId),
    User(UserId),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Room(id) => write!(f, "room:{}", id),
            SessionKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}

/// Top-level view mode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Empty,
    PeerChat(RoomId),
    AiOverlay,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Empty => "empty",
            Mode::PeerChat(_) => "peer chat",
            Mode::AiOverlay => "AI overlay",
        }
    }

    pub fn active_room(&self) -> Option<&RoomId> {
        match self {
            Mode::PeerChat(room) => Some(room),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssistantRole {
    User,
    Assistant,
}

/// One entry of the AI overlay thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantTurn {
    pub role: AssistantRole,
    pub text: String,
}
