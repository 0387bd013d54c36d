use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// Events pushed to a user's live gateway connection.
/// Serialized as `{ "type": ..., "data": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// Someone asked the receiving user to become friends
    NewFriendRequest {
        sender_id: UserId,
        sender_name: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_request_event_shape() {
        let event = PushEvent::NewFriendRequest {
            sender_id: 7,
            sender_name: "Alice".into(),
            message: "hi, it's alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "new_friend_request",
                "data": { "sender_id": 7, "sender_name": "Alice", "message": "hi, it's alice" }
            })
        );
    }
}
