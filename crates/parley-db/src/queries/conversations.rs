use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, error};

use parley_types::api::{ConversationSummary, HistoryEntry};
use parley_types::models::{ConversationId, MessageId, MessageStatus, UserId, Visibility};

use crate::error::{Error, Result, is_unique_violation};
use crate::models::{MemberRow, PayloadColumns, parse_column};
use crate::queries::friendships::{are_friends, friend_remark};
use crate::Database;

impl Database {
    // -- Resolver --

    /// Shared private conversation of two friends, created on first use.
    /// Symmetric and idempotent in its arguments.
    pub fn resolve_private_conversation(&self, a: UserId, b: UserId) -> Result<ConversationId> {
        self.with_tx(|tx| self.resolve_in(tx, a, b))
    }

    pub(crate) fn resolve_in(&self, conn: &Connection, a: UserId, b: UserId) -> Result<ConversationId> {
        if !are_friends(conn, a, b)? {
            return Err(Error::Forbidden);
        }

        if let Some(id) = lookup_private(conn, a, b)? {
            return Ok(id);
        }

        let (low, high) = ordered(a, b);
        let id = self.next_id();
        let inserted = conn.execute(
            "INSERT INTO conversation_friends (conversation_id, user_low, user_high) VALUES (?1, ?2, ?3)",
            (id, low, high),
        );

        match inserted {
            Ok(_) => {
                debug!("Created private conversation {} for ({}, {})", id, low, high);
                Ok(id)
            }
            // Someone else created the pair first: use theirs.
            Err(e) if is_unique_violation(&e) => lookup_private(conn, a, b)?.ok_or_else(|| {
                error!("Conversation mapping for ({}, {}) vanished after conflict", low, high);
                Error::Store
            }),
            Err(e) => Err(e.into()),
        }
    }

    // -- Per-user view --

    /// Resolve the conversation with `friend_id` and make sure it is listed
    /// for `user_id` again, even if they hid it earlier.
    pub fn start_private_conversation(&self, user_id: UserId, friend_id: UserId) -> Result<ConversationId> {
        self.with_tx(|tx| {
            let conversation_id = self.resolve_in(tx, user_id, friend_id)?;
            let remark = friend_remark(tx, user_id, friend_id)?.unwrap_or_default();
            materialize_member(tx, user_id, conversation_id, &remark)?;
            Ok(conversation_id)
        })
    }

    pub fn hide_conversation(&self, user_id: UserId, conversation_id: ConversationId) -> Result<()> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE conversation_users SET hidden_since = COALESCE(hidden_since, ?3)
                 WHERE user_id = ?1 AND conversation_id = ?2",
                (user_id, conversation_id, Utc::now()),
            )?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    pub fn mark_read(&self, user_id: UserId, conversation_id: ConversationId) -> Result<()> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE conversation_users SET unread_count = 0
                 WHERE user_id = ?1 AND conversation_id = ?2",
                (user_id, conversation_id),
            )?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_pinned(&self, user_id: UserId, conversation_id: ConversationId, pinned: bool) -> Result<()> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE conversation_users SET is_pinned = ?3
                 WHERE user_id = ?1 AND conversation_id = ?2",
                (user_id, conversation_id, pinned),
            )?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    pub fn conversation_member(&self, user_id: UserId, conversation_id: ConversationId) -> Result<Option<MemberRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT remark, unread_count, last_message_id, is_pinned, hidden_since, updated_at
                     FROM conversation_users WHERE user_id = ?1 AND conversation_id = ?2",
                    (user_id, conversation_id),
                    |row| {
                        Ok(MemberRow {
                            user_id,
                            conversation_id,
                            remark: row.get(0)?,
                            unread_count: row.get(1)?,
                            last_message_id: row.get(2)?,
                            is_pinned: row.get(3)?,
                            visibility: Visibility::from_hidden_since(row.get(4)?),
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Read models --

    /// Visible conversations of `user_id`, pinned first, then most recently updated.
    pub fn conversation_list(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cu.conversation_id, cu.remark, cu.unread_count, cu.is_pinned,
                        cu.last_message_id, cu.updated_at, m.status,
                        t.text, f.file_name, f.file_url, f.file_size, f.file_type
                 FROM conversation_users cu
                 LEFT JOIN messages m ON m.id = cu.last_message_id
                 LEFT JOIN texts t ON t.message_id = m.id
                 LEFT JOIN files f ON f.message_id = m.id
                 WHERE cu.user_id = ?1 AND cu.hidden_since IS NULL
                 ORDER BY cu.is_pinned DESC, cu.updated_at DESC, cu.conversation_id DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    let status: Option<MessageStatus> = row
                        .get::<_, Option<String>>(6)?
                        .map(|raw| parse_column(6, raw))
                        .transpose()?;
                    let payload = PayloadColumns {
                        text: row.get(7)?,
                        file_name: row.get(8)?,
                        file_url: row.get(9)?,
                        file_size: row.get(10)?,
                        file_type: row.get(11)?,
                    };

                    Ok(ConversationSummary {
                        conversation_id: row.get(0)?,
                        remark: row.get(1)?,
                        unread_count: row.get(2)?,
                        is_pinned: row.get(3)?,
                        last_message_id: row.get(4)?,
                        updated_at: row.get(5)?,
                        last_message: status.and_then(|status| payload.into_body(status)),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Newest-first history of a conversation as seen by `user_id`: messages
    /// the user hid and recalled messages are left out.
    pub fn chat_history(&self, user_id: UserId, conversation_id: ConversationId) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            if !is_member(conn, user_id, conversation_id)? {
                return Err(Error::Forbidden);
            }

            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, u.name, m.status, m.created_at, m.updated_at,
                        t.text, f.file_name, f.file_url, f.file_size, f.file_type
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 LEFT JOIN message_users mu ON mu.message_id = m.id AND mu.user_id = ?1
                 LEFT JOIN texts t ON t.message_id = m.id
                 LEFT JOIN files f ON f.message_id = m.id
                 WHERE m.conversation_id = ?2
                   AND m.status != 'RECALLED'
                   AND mu.hidden_since IS NULL
                 ORDER BY m.id DESC",
            )?;

            let rows = stmt
                .query_map((user_id, conversation_id), |row| {
                    let message_id: MessageId = row.get(0)?;
                    let status: MessageStatus = parse_column(3, row.get(3)?)?;
                    let payload = PayloadColumns {
                        text: row.get(6)?,
                        file_name: row.get(7)?,
                        file_url: row.get(8)?,
                        file_size: row.get(9)?,
                        file_type: row.get(10)?,
                    };
                    let Some(body) = payload.into_body(status) else {
                        error!("Message {} ({}) has no payload", message_id, status);
                        return Ok(None);
                    };

                    Ok(Some(HistoryEntry {
                        message_id,
                        sender_id: row.get(1)?,
                        sender_name: row.get(2)?,
                        status,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                        body,
                    }))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().flatten().collect())
        })
    }
}

fn ordered(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub(crate) fn lookup_private(conn: &Connection, a: UserId, b: UserId) -> Result<Option<ConversationId>> {
    let (low, high) = ordered(a, b);
    let id = conn
        .query_row(
            "SELECT conversation_id FROM conversation_friends WHERE user_low = ?1 AND user_high = ?2",
            (low, high),
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub(crate) fn is_member(conn: &Connection, user_id: UserId, conversation_id: ConversationId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM conversation_users WHERE user_id = ?1 AND conversation_id = ?2",
            (user_id, conversation_id),
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Create the user's row for a conversation, or make an existing hidden
/// row visible again and move it to the top of the list. An existing row
/// keeps its remark and counters.
pub(crate) fn materialize_member(
    conn: &Connection,
    user_id: UserId,
    conversation_id: ConversationId,
    remark: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_users (user_id, conversation_id, remark, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, conversation_id)
         DO UPDATE SET hidden_since = NULL, updated_at = excluded.updated_at",
        (user_id, conversation_id, remark, Utc::now()),
    )?;
    Ok(())
}
