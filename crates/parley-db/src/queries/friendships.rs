use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use parley_types::models::{ConversationId, RequestId, RequestStatus, UserId};

use crate::error::{Error, Result, is_unique_violation};
use crate::models::{FriendRequestRow, FriendRow, parse_column};
use crate::queries::conversations::{lookup_private, materialize_member};
use crate::queries::users::user_name;
use crate::Database;

impl Database {
    // -- Requests --

    pub fn send_friend_request(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        message: &str,
        sender_name: &str,
    ) -> Result<RequestId> {
        if sender_id == receiver_id {
            return Err(Error::Conflict("cannot send a friend request to yourself"));
        }

        self.with_tx(|tx| {
            user_name(tx, receiver_id)?;

            if are_friends(tx, sender_id, receiver_id)? {
                return Err(Error::Conflict("already friends"));
            }

            let id = self.next_id();
            let now = Utc::now();
            let inserted = tx.execute(
                "INSERT INTO friendship_requests
                    (id, sender_id, sender_name, receiver_id, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                rusqlite::params![id, sender_id, sender_name, receiver_id, message, now],
            );

            match inserted {
                Ok(_) => Ok(id),
                Err(e) if is_unique_violation(&e) => Err(Error::Conflict("a request is already pending")),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Requests received by `receiver_id`, newest first, in every state.
    pub fn list_friend_requests(&self, receiver_id: UserId) -> Result<Vec<FriendRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, sender_name, receiver_id, message, status, created_at
                 FROM friendship_requests
                 WHERE receiver_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;

            let rows = stmt
                .query_map([receiver_id], |row| {
                    Ok(FriendRequestRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_name: row.get(2)?,
                        receiver_id: row.get(3)?,
                        message: row.get(4)?,
                        status: parse_column(5, row.get(5)?)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Accept a pending request: mark it accepted, create the friendship edge
    /// pair, resolve the private conversation and list it for both users.
    /// Runs as one write transaction; the request row is re-read after the
    /// write lock is taken, so a racing accept or delete sees the outcome.
    pub fn accept_friend_request(&self, request_id: RequestId, receiver_id: UserId) -> Result<ConversationId> {
        self.with_tx(|tx| {
            let (sender_id, _) = lock_pending(tx, request_id, receiver_id)?;
            set_status(tx, request_id, RequestStatus::Accepted)?;

            let sender_name = user_name(tx, sender_id)?;
            let receiver_name = user_name(tx, receiver_id)?;

            insert_edge(tx, sender_id, receiver_id, &receiver_name)?;
            insert_edge(tx, receiver_id, sender_id, &sender_name)?;

            let conversation_id = self.resolve_in(tx, receiver_id, sender_id)?;
            materialize_member(tx, sender_id, conversation_id, &receiver_name)?;
            materialize_member(tx, receiver_id, conversation_id, &sender_name)?;

            info!(
                "Request {} accepted: {} and {} are friends (conversation {})",
                request_id, sender_id, receiver_id, conversation_id
            );
            Ok(conversation_id)
        })
    }

    pub fn reject_friend_request(&self, request_id: RequestId, receiver_id: UserId) -> Result<()> {
        self.with_tx(|tx| {
            lock_pending(tx, request_id, receiver_id)?;
            set_status(tx, request_id, RequestStatus::Rejected)
        })
    }

    /// Remove a request row. Either party may delete it.
    pub fn delete_friend_request(&self, request_id: RequestId, user_id: UserId) -> Result<()> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM friendship_requests
                 WHERE id = ?1 AND (sender_id = ?2 OR receiver_id = ?2)",
                (request_id, user_id),
            )?;
            if removed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    // -- Friendships --

    pub fn list_friends(&self, user_id: UserId) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.friend_id, f.remark, u.name, u.uid
                 FROM friendships f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY f.remark",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FriendRow {
                        friend_id: row.get(0)?,
                        remark: row.get(1)?,
                        name: row.get(2)?,
                        uid: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// One friend as the caller sees them, through the caller's edge.
    pub fn friend_info(&self, user_id: UserId, friend_id: UserId) -> Result<FriendRow> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT f.friend_id, f.remark, u.name, u.uid
                 FROM friendships f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1 AND f.friend_id = ?2",
                (user_id, friend_id),
                |row| {
                    Ok(FriendRow {
                        friend_id: row.get(0)?,
                        remark: row.get(1)?,
                        name: row.get(2)?,
                        uid: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or(Error::NotFound)
        })
    }

    /// Remove both edges of a friendship. The conversation and its history stay.
    pub fn delete_friendship(&self, user_id: UserId, friend_id: UserId) -> Result<()> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                (user_id, friend_id),
            )?;
            if removed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    /// Rename a friend on the caller's side only, including the caller's
    /// entry for their private conversation.
    pub fn revise_remark(&self, user_id: UserId, friend_id: UserId, remark: &str) -> Result<()> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE friendships SET remark = ?3 WHERE user_id = ?1 AND friend_id = ?2",
                (user_id, friend_id, remark),
            )?;
            if changed == 0 {
                return Err(Error::NotFound);
            }

            if let Some(conversation_id) = lookup_private(tx, user_id, friend_id)? {
                tx.execute(
                    "UPDATE conversation_users SET remark = ?3
                     WHERE user_id = ?1 AND conversation_id = ?2",
                    (user_id, conversation_id, remark),
                )?;
            }
            Ok(())
        })
    }
}

/// Read a request addressed to `receiver_id` and insist it is still pending.
/// Returns `(sender_id, receiver_id)`.
fn lock_pending(conn: &Connection, request_id: RequestId, receiver_id: UserId) -> Result<(UserId, UserId)> {
    let row = conn
        .query_row(
            "SELECT sender_id, receiver_id, status FROM friendship_requests WHERE id = ?1",
            [request_id],
            |row| {
                let status: RequestStatus = parse_column(2, row.get(2)?)?;
                Ok((row.get::<_, UserId>(0)?, row.get::<_, UserId>(1)?, status))
            },
        )
        .optional()?;

    let Some((sender_id, owner_id, status)) = row else {
        return Err(Error::NotFound);
    };
    if owner_id != receiver_id {
        return Err(Error::Forbidden);
    }
    if status.is_terminal() {
        return Err(Error::Conflict("request is no longer pending"));
    }
    Ok((sender_id, owner_id))
}

fn set_status(conn: &Connection, request_id: RequestId, status: RequestStatus) -> Result<()> {
    conn.execute(
        "UPDATE friendship_requests SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'pending'",
        (request_id, status.as_str(), Utc::now()),
    )?;
    Ok(())
}

/// Insert one directed edge. An edge left by an earlier accept of the
/// opposite request is kept as-is.
fn insert_edge(conn: &Connection, user_id: UserId, friend_id: UserId, remark: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO friendships (user_id, friend_id, remark, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, friend_id) DO NOTHING",
        (user_id, friend_id, remark, Utc::now()),
    )?;
    Ok(())
}

pub(crate) fn are_friends(conn: &Connection, a: UserId, b: UserId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)
             LIMIT 1",
            (a, b),
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn friend_remark(conn: &Connection, user_id: UserId, friend_id: UserId) -> Result<Option<String>> {
    let remark = conn
        .query_row(
            "SELECT remark FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
            (user_id, friend_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(remark)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use parley_types::models::RequestStatus;

    use crate::testing;
    use crate::Error;

    fn count(db: &crate::Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    #[test]
    fn self_request_is_a_conflict() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let err = db.send_friend_request(alice, alice, "me", "Alice").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn request_to_unknown_user_is_not_found() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let err = db.send_friend_request(alice, alice + 99, "", "Alice").unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn only_one_pending_request_per_direction() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");

        db.send_friend_request(alice, bob, "hi", "Alice").unwrap();
        let err = db.send_friend_request(alice, bob, "hi again", "Alice").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // The opposite direction is a different pair.
        db.send_friend_request(bob, alice, "hey", "Bob").unwrap();
    }

    #[test]
    fn rejected_request_can_be_sent_again() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");

        let first = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();
        db.reject_friend_request(first, bob).unwrap();
        db.send_friend_request(alice, bob, "please", "Alice").unwrap();

        let requests = db.list_friend_requests(bob).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].message, "please");
        assert_eq!(requests[0].status, RequestStatus::Pending);
        assert_eq!(requests[1].status, RequestStatus::Rejected);
    }

    #[test]
    fn accept_creates_edges_and_conversation_rows() {
        let db = testing::db();
        let (alice, bob, conversation) = testing::friends(&db, "Alice", "Bob");

        let alice_friends = db.list_friends(alice).unwrap();
        assert_eq!(alice_friends.len(), 1);
        assert_eq!(alice_friends[0].friend_id, bob);
        assert_eq!(alice_friends[0].remark, "Bob");

        let bob_friends = db.list_friends(bob).unwrap();
        assert_eq!(bob_friends[0].friend_id, alice);
        assert_eq!(bob_friends[0].remark, "Alice");

        let alice_row = db.conversation_member(alice, conversation).unwrap().unwrap();
        assert_eq!(alice_row.remark, "Bob");
        assert_eq!(alice_row.unread_count, 0);
        let bob_row = db.conversation_member(bob, conversation).unwrap().unwrap();
        assert_eq!(bob_row.remark, "Alice");

        let err = db.send_friend_request(bob, alice, "again?", "Bob").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn only_the_receiver_may_accept() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let request = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();

        let err = db.accept_friend_request(request, alice).unwrap_err();
        assert!(matches!(err, Error::Forbidden));
        assert!(db.list_friends(alice).unwrap().is_empty());
    }

    #[test]
    fn terminal_requests_cannot_be_accepted() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let request = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();
        db.reject_friend_request(request, bob).unwrap();

        let err = db.accept_friend_request(request, bob).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(db.list_friends(bob).unwrap().is_empty());

        let err = db.accept_friend_request(request + 1_000, bob).unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn concurrent_accepts_commit_once() {
        let db = Arc::new(testing::db());
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let request = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                thread::spawn(move || db.accept_friend_request(request, bob))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Conflict(_))));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM friendships"), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_users"), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_friends"), 1);
    }

    #[test]
    fn crossed_requests_yield_one_friendship() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let to_bob = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();
        let to_alice = db.send_friend_request(bob, alice, "hi", "Bob").unwrap();

        let first = db.accept_friend_request(to_bob, bob).unwrap();
        let second = db.accept_friend_request(to_alice, alice).unwrap();
        assert_eq!(first, second);

        assert_eq!(count(&db, "SELECT COUNT(*) FROM friendships"), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_users"), 2);
    }

    #[test]
    fn failed_accept_leaves_nothing_behind() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let request = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();

        // Make the conversation_users insert fail halfway through the accept.
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_member BEFORE INSERT ON conversation_users
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.accept_friend_request(request, bob).unwrap_err();
        assert!(matches!(err, Error::Store));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM friendships"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversation_friends"), 0);
        assert_eq!(db.list_friend_requests(bob).unwrap()[0].status, RequestStatus::Pending);
    }

    #[test]
    fn delete_request_reports_missing_rows() {
        let db = testing::db();
        let alice = testing::user(&db, "Alice");
        let bob = testing::user(&db, "Bob");
        let carol = testing::user(&db, "Carol");
        let request = db.send_friend_request(alice, bob, "hi", "Alice").unwrap();

        let err = db.delete_friend_request(request, carol).unwrap_err();
        assert!(matches!(err, Error::NotFound));

        db.delete_friend_request(request, alice).unwrap();
        let err = db.delete_friend_request(request, alice).unwrap_err();
        assert!(matches!(err, Error::NotFound));

        let err = db.accept_friend_request(request, bob).unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn unfriending_removes_both_edges() {
        let db = testing::db();
        let (alice, bob, conversation) = testing::friends(&db, "Alice", "Bob");

        db.delete_friendship(bob, alice).unwrap();
        assert!(db.list_friends(alice).unwrap().is_empty());
        assert!(db.list_friends(bob).unwrap().is_empty());
        assert!(db.conversation_member(alice, conversation).unwrap().is_some());

        let err = db.delete_friendship(alice, bob).unwrap_err();
        assert!(matches!(err, Error::NotFound));
        let err = db.resolve_private_conversation(alice, bob).unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[test]
    fn remark_is_per_side() {
        let db = testing::db();
        let (alice, bob, conversation) = testing::friends(&db, "Alice", "Bob");

        db.revise_remark(alice, bob, "Bobby").unwrap();

        let alice_friends = db.list_friends(alice).unwrap();
        assert_eq!(alice_friends[0].remark, "Bobby");
        assert_eq!(alice_friends[0].name, "Bob");
        assert_eq!(db.conversation_member(alice, conversation).unwrap().unwrap().remark, "Bobby");

        assert_eq!(db.list_friends(bob).unwrap()[0].remark, "Alice");
        assert_eq!(db.conversation_member(bob, conversation).unwrap().unwrap().remark, "Alice");

        let carol = testing::user(&db, "Carol");
        let err = db.revise_remark(alice, carol, "stranger").unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn friend_info_reads_through_the_callers_edge() {
        let db = testing::db();
        let (alice, bob, _) = testing::friends(&db, "Alice", "Bob");
        db.revise_remark(alice, bob, "Bobby").unwrap();
        db.revise_uid(bob, "bob_the_builder").unwrap();

        let info = db.friend_info(alice, bob).unwrap();
        assert_eq!(info.friend_id, bob);
        assert_eq!(info.remark, "Bobby");
        assert_eq!(info.name, "Bob");
        assert_eq!(info.uid, "bob_the_builder");

        assert_eq!(db.friend_info(bob, alice).unwrap().remark, "Alice");

        let carol = testing::user(&db, "Carol");
        assert!(matches!(db.friend_info(alice, carol).unwrap_err(), Error::NotFound));
    }
}
