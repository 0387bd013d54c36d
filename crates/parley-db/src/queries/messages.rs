use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use parley_types::models::{
    ConversationId, FileInfo, MessageId, MessageStatus, SYSTEM_SENDER, UserId,
};

use crate::error::{Error, Result};
use crate::models::parse_column;
use crate::queries::conversations::is_member;
use crate::queries::users::user_name;
use crate::Database;

impl Database {
    pub fn is_member(&self, user_id: UserId, conversation_id: ConversationId) -> Result<bool> {
        self.with_conn(|conn| is_member(conn, user_id, conversation_id))
    }

    /// Append a text message. The id is allocated while the write lock is
    /// held, so id order matches commit order.
    pub fn send_text(&self, sender_id: UserId, conversation_id: ConversationId, content: &str) -> Result<MessageId> {
        self.with_tx(|tx| {
            require_member(tx, sender_id, conversation_id)?;

            let id = self.next_id();
            let now = Utc::now();
            insert_message(tx, id, sender_id, conversation_id, MessageStatus::Text, now)?;
            tx.execute("INSERT INTO texts (message_id, text) VALUES (?1, ?2)", (id, content))?;

            advance_last_message(tx, conversation_id, id, now)?;
            bump_unread(tx, sender_id, conversation_id)?;
            Ok(id)
        })
    }

    /// Record a file message whose bytes were already stored under
    /// `file.file_url`, using the id that storage key was derived from.
    pub fn send_file(
        &self,
        sender_id: UserId,
        conversation_id: ConversationId,
        message_id: MessageId,
        file: &FileInfo,
    ) -> Result<()> {
        self.with_tx(|tx| {
            require_member(tx, sender_id, conversation_id)?;

            let now = Utc::now();
            insert_message(tx, message_id, sender_id, conversation_id, MessageStatus::File, now)?;
            tx.execute(
                "INSERT INTO files (message_id, file_name, file_url, file_size, file_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (message_id, &file.file_name, &file.file_url, file.file_size, &file.file_type),
            )?;

            advance_last_message(tx, conversation_id, message_id, now)?;
            bump_unread(tx, sender_id, conversation_id)?;
            Ok(())
        })
    }

    /// Storage details of a file message the user may download. A missing
    /// message, a non-file message and a conversation the user is not part
    /// of all come back as the same `NotFound`.
    pub fn file_for_download(&self, user_id: UserId, message_id: MessageId) -> Result<FileInfo> {
        self.with_conn(|conn| {
            let file = conn
                .query_row(
                    "SELECT f.file_name, f.file_url, f.file_size, f.file_type
                     FROM files f
                     JOIN messages m ON m.id = f.message_id
                     JOIN conversation_users cu
                       ON cu.conversation_id = m.conversation_id AND cu.user_id = ?2
                     WHERE f.message_id = ?1 AND m.status = 'FILE'",
                    (message_id, user_id),
                    |row| {
                        Ok(FileInfo {
                            file_name: row.get(0)?,
                            file_url: row.get(1)?,
                            file_size: row.get(2)?,
                            file_type: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            file.ok_or(Error::NotFound)
        })
    }

    /// Recall one of the caller's own messages and announce it with a system
    /// message, which becomes the conversation's last message.
    pub fn recall_message(&self, user_id: UserId, message_id: MessageId) -> Result<MessageId> {
        self.with_tx(|tx| {
            let (sender_id, conversation_id, status) = message_header(tx, message_id)?;
            if sender_id != user_id {
                return Err(Error::Forbidden);
            }
            if status == MessageStatus::Recalled {
                return Err(Error::Conflict("message already recalled"));
            }
            if !status.can_recall() {
                return Err(Error::Forbidden);
            }

            let now = Utc::now();
            tx.execute(
                "UPDATE messages SET status = 'RECALLED', updated_at = ?2 WHERE id = ?1",
                (message_id, now),
            )?;

            let notice = format!("{} recalled a message", user_name(tx, sender_id)?);
            let notice_id = self.next_id();
            insert_message(tx, notice_id, SYSTEM_SENDER, conversation_id, MessageStatus::System, now)?;
            tx.execute("INSERT INTO texts (message_id, text) VALUES (?1, ?2)", (notice_id, &notice))?;

            advance_last_message(tx, conversation_id, notice_id, now)?;

            debug!("Message {} recalled, notice {}", message_id, notice_id);
            Ok(notice_id)
        })
    }

    /// Hide a message from the caller's history only, then point the
    /// caller's last message at the newest message they can still see.
    /// The conversation keeps its place in the caller's list.
    /// Returns the new pointer, `None` once nothing visible is left.
    pub fn delete_message(&self, user_id: UserId, message_id: MessageId) -> Result<Option<MessageId>> {
        self.with_tx(|tx| {
            let (_, conversation_id, _) = message_header(tx, message_id)?;
            if !is_member(tx, user_id, conversation_id)? {
                return Err(Error::Forbidden);
            }

            let now = Utc::now();
            let hidden = tx.execute(
                "INSERT INTO message_users (user_id, message_id, hidden_since) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, message_id) DO UPDATE SET hidden_since = excluded.hidden_since
                 WHERE message_users.hidden_since IS NULL",
                (user_id, message_id, now),
            )?;
            if hidden == 0 {
                return Err(Error::NotFound);
            }

            let last: Option<MessageId> = tx
                .query_row(
                    "SELECT m.id FROM messages m
                     LEFT JOIN message_users mu ON mu.message_id = m.id AND mu.user_id = ?1
                     WHERE m.conversation_id = ?2
                       AND m.status != 'RECALLED'
                       AND mu.hidden_since IS NULL
                     ORDER BY m.id DESC
                     LIMIT 1",
                    (user_id, conversation_id),
                    |row| row.get(0),
                )
                .optional()?;

            // Only the pointer moves. Recency stays with the last real activity.
            tx.execute(
                "UPDATE conversation_users SET last_message_id = ?3
                 WHERE user_id = ?1 AND conversation_id = ?2",
                (user_id, conversation_id, last),
            )?;
            Ok(last)
        })
    }
}

fn require_member(conn: &Connection, user_id: UserId, conversation_id: ConversationId) -> Result<()> {
    if is_member(conn, user_id, conversation_id)? {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// `(sender_id, conversation_id, status)` of a message.
fn message_header(conn: &Connection, message_id: MessageId) -> Result<(UserId, ConversationId, MessageStatus)> {
    conn.query_row(
        "SELECT sender_id, conversation_id, status FROM messages WHERE id = ?1",
        [message_id],
        |row| Ok((row.get(0)?, row.get(1)?, parse_column(2, row.get(2)?)?)),
    )
    .optional()?
    .ok_or(Error::NotFound)
}

fn insert_message(
    conn: &Connection,
    id: MessageId,
    sender_id: UserId,
    conversation_id: ConversationId,
    status: MessageStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, conversation_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        (id, sender_id, conversation_id, status.as_str(), now),
    )?;
    Ok(())
}

/// Point every participant at `message_id`. The pointer only moves forward,
/// so a file message whose id was allocated before a later text message
/// commits cannot pull it back.
fn advance_last_message(
    conn: &Connection,
    conversation_id: ConversationId,
    message_id: MessageId,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE conversation_users SET last_message_id = ?2, updated_at = ?3
         WHERE conversation_id = ?1 AND (last_message_id IS NULL OR last_message_id < ?2)",
        (conversation_id, message_id, now),
    )?;
    Ok(())
}

fn bump_unread(conn: &Connection, sender_id: UserId, conversation_id: ConversationId) -> Result<()> {
    conn.execute(
        "UPDATE conversation_users SET unread_count = unread_count + 1
         WHERE conversation_id = ?1 AND user_id != ?2",
        (conversation_id, sender_id),
    )?;
    Ok(())
}
