use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ConversationId = u64;
pub type MessageId = u64;
pub type RequestId = u64;

/// Sender id carried by server-generated messages (recall notices).
pub const SYSTEM_SENDER: UserId = 0;

/// Lifecycle of a message. TEXT and FILE may become RECALLED exactly once;
/// SYSTEM never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Text,
    File,
    System,
    Recalled,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::File => "FILE",
            Self::System => "SYSTEM",
            Self::Recalled => "RECALLED",
        }
    }

    pub fn can_recall(&self) -> bool {
        matches!(self, Self::Text | Self::File)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "FILE" => Ok(Self::File),
            "SYSTEM" => Ok(Self::System),
            "RECALLED" => Ok(Self::Recalled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Friend request state machine: `Pending` moves to one of the three
/// terminal states and never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "canceled" => Ok(Self::Canceled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Per-user soft-delete state of a conversation or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden { since: DateTime<Utc> },
}

impl Visibility {
    pub fn from_hidden_since(since: Option<DateTime<Utc>>) -> Self {
        match since {
            Some(since) => Self::Hidden { since },
            None => Self::Visible,
        }
    }

    pub fn hidden_since(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Visible => None,
            Self::Hidden { since } => Some(*since),
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_url: String,
    pub file_size: u64,
    pub file_type: String,
}

/// Displayable payload of a message, selected by its status.
/// Recalled messages have no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    File(FileInfo),
    SystemNotice { text: String },
}
