//! Database row types. These map directly to SQLite rows and stay separate
//! from the parley-types API bodies.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

use parley_types::models::{
    ConversationId, FileInfo, MessageBody, MessageId, MessageStatus, RequestId, RequestStatus,
    UserId, Visibility,
};

pub struct UserRow {
    pub id: UserId,
    pub uid: String,
    pub name: String,
    pub phone: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

/// What any signed-in user may see about another.
#[derive(Debug)]
pub struct StrangerRow {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug)]
pub struct FriendRow {
    pub friend_id: UserId,
    pub remark: String,
    pub name: String,
    pub uid: String,
}

pub struct FriendRequestRow {
    pub id: RequestId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub receiver_id: UserId,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A user's own view of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub remark: String,
    pub unread_count: u32,
    pub last_message_id: Option<MessageId>,
    pub is_pinned: bool,
    pub visibility: Visibility,
    pub updated_at: DateTime<Utc>,
}

/// Parse an enum stored as TEXT, reporting failures as a column conversion error.
pub(crate) fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Payload columns joined from `texts` and `files` for one message.
pub(crate) struct PayloadColumns {
    pub text: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
}

impl PayloadColumns {
    /// Project the joined payload columns into the body for `status`.
    /// Recalled messages, and rows missing the payload their status
    /// requires, project to `None`.
    pub fn into_body(self, status: MessageStatus) -> Option<MessageBody> {
        match status {
            MessageStatus::Text => self.text.map(|text| MessageBody::Text { text }),
            MessageStatus::System => self.text.map(|text| MessageBody::SystemNotice { text }),
            MessageStatus::File => Some(MessageBody::File(FileInfo {
                file_name: self.file_name?,
                file_url: self.file_url?,
                file_size: self.file_size?,
                file_type: self.file_type?,
            })),
            MessageStatus::Recalled => None,
        }
    }
}
