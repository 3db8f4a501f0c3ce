use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use socialbook_shared::constants::MESSAGE_TTL_HOURS;
use socialbook_shared::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

const MESSAGE_COLUMNS: &str = "id, from_id, to_id, text, read, created_at, expires_at";

impl Database {
    /// Persist a direct message. The message is created unread and expires
    /// [`MESSAGE_TTL_HOURS`] after `now`, whether or not the recipient is
    /// connected.
    pub fn insert_message(
        &self,
        from: UserId,
        to: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            from,
            to,
            text: text.to_string(),
            read: false,
            created_at: now,
            expires_at: now + Duration::hours(MESSAGE_TTL_HOURS),
        };

        self.conn().execute(
            "INSERT INTO messages (id, from_id, to_id, text, read, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
            params![
                message.id.to_string(),
                message.from.to_string(),
                message.to.to_string(),
                message.text,
                ts(&message.created_at),
                ts(&message.expires_at),
            ],
        )?;
        Ok(message)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(StoreError::from_query)
    }

    /// The unexpired thread between `me` and `other`, oldest first.
    pub fn get_thread(&self, me: UserId, other: UserId, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE ((from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1))
               AND expires_at > ?3
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(
            params![me.to_string(), other.to_string(), ts(&now)],
            row_to_message,
        )?;
        Ok(collect_rows(rows)?)
    }

    /// Mark every message from `sender` to `reader` as read. Returns the
    /// number of rows that changed.
    pub fn mark_thread_read(&self, reader: UserId, sender: UserId) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE messages SET read = 1 WHERE to_id = ?1 AND from_id = ?2 AND read = 0",
            params![reader.to_string(), sender.to_string()],
        )?)
    }

    /// Every unexpired message `user` sent or received, newest first. Ties
    /// on `created_at` put the later insert first.
    pub fn messages_involving(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (from_id = ?1 OR to_id = ?1) AND expires_at > ?2
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user.to_string(), ts(&now)], row_to_message)?;
        Ok(collect_rows(rows)?)
    }

    pub fn count_unread_messages(&self, user: UserId, now: DateTime<Utc>) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE to_id = ?1 AND read = 0 AND expires_at > ?2",
            params![user.to_string(), ts(&now)],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Physically remove messages whose `expires_at` has passed.
    pub fn purge_expired_messages(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM messages WHERE expires_at <= ?1",
            params![ts(&now)],
        )?)
    }

    pub fn count_messages(&self) -> Result<u64> {
        self.count_rows("messages")
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let expires_at: String = row.get(6)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id)?),
        from: UserId(parse_uuid(1, &from)?),
        to: UserId(parse_uuid(2, &to)?),
        text: row.get(3)?,
        read: row.get(4)?,
        created_at: parse_ts(5, &created_at)?,
        expires_at: parse_ts(6, &expires_at)?,
    })
}
