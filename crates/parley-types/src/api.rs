use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ConversationId, MessageBody, MessageId, MessageStatus, RequestId, RequestStatus, UserId,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UidLoginRequest {
    pub uid: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub uid: String,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviseUidRequest {
    pub uid: String,
}

/// Public view of another user.
#[derive(Debug, Serialize, Deserialize)]
pub struct StrangerResponse {
    pub id: UserId,
    pub name: String,
}

// -- Friendships --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    pub receiver_id: UserId,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestCreated {
    pub request_id: RequestId,
}

/// The private conversation that accepting opened for both sides.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptFriendRequestResponse {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendRequestResponse {
    pub request_id: RequestId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub receiver_id: UserId,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendResponse {
    pub friend_id: UserId,
    pub remark: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviseRemarkRequest {
    pub remark: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub friend_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartConversationResponse {
    pub conversation_id: ConversationId,
}

/// One row of the caller's conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub remark: String,
    pub unread_count: u32,
    pub is_pinned: bool,
    pub last_message_id: Option<MessageId>,
    pub last_message: Option<MessageBody>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPinnedRequest {
    pub pinned: bool,
}

// -- Messages --

/// One visible message in a conversation's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub sender_id: UserId,
    /// `None` for system notices.
    pub sender_name: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendTextRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFileResponse {
    pub message_id: MessageId,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecallResponse {
    pub system_message_id: MessageId,
}

/// Caller's last visible message after the delete, if any is left.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteMessageResponse {
    pub last_message_id: Option<MessageId>,
}
