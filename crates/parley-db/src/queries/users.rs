use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use parley_types::models::UserId;

use crate::error::{Error, Result, is_unique_violation};
use crate::models::{StrangerRow, UserRow};
use crate::Database;

impl Database {
    pub fn create_user(&self, name: &str, phone: &str, password_hash: &str) -> Result<UserId> {
        self.with_tx(|tx| {
            let id = self.next_id();
            let inserted = tx.execute(
                "INSERT INTO users (id, uid, name, phone, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, format!("p{}", id), name, phone, password_hash, Utc::now()],
            );
            match inserted {
                Ok(_) => Ok(id),
                Err(e) if is_unique_violation(&e) => Err(Error::Conflict("phone already registered")),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, uid, name, phone, password, created_at FROM users WHERE id = ?1",
                    [id],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, uid, name, phone, password, created_at FROM users WHERE phone = ?1",
                    [phone],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_uid(&self, uid: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, uid, name, phone, password, created_at FROM users WHERE uid = ?1",
                    [uid],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Change a user's handle. Handles are unique across users.
    pub fn revise_uid(&self, user_id: UserId, uid: &str) -> Result<()> {
        self.with_tx(|tx| {
            let updated = tx.execute("UPDATE users SET uid = ?2 WHERE id = ?1", (user_id, uid));
            match updated {
                Ok(0) => Err(Error::NotFound),
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(Error::Conflict("uid already taken")),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn stranger_info(&self, id: UserId) -> Result<StrangerRow> {
        self.with_conn(|conn| {
            Ok(StrangerRow {
                id,
                name: user_name(conn, id)?,
            })
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Current display name of a user.
pub(crate) fn user_name(conn: &Connection, id: UserId) -> Result<String> {
    conn.query_row("SELECT name FROM users WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or(Error::NotFound)
}
