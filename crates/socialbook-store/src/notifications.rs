use chrono::{DateTime, Utc};
use rusqlite::params;

use socialbook_shared::{NotificationId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{Notification, NotificationKind};
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

impl Database {
    pub fn create_notification(
        &self,
        user: UserId,
        kind: NotificationKind,
        text: &str,
        link: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: NotificationId::new(),
            user,
            text: text.to_string(),
            kind,
            read: false,
            link: link.map(str::to_string),
            created_at: now,
        };

        self.conn().execute(
            "INSERT INTO notifications (id, user_id, text, kind, read, link, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
            params![
                notification.id.to_string(),
                user.to_string(),
                notification.text,
                kind.as_str(),
                notification.link,
                ts(&now),
            ],
        )?;
        Ok(notification)
    }

    /// Newest `limit` notifications for `user`.
    pub fn list_notifications(&self, user: UserId, limit: u32) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, text, kind, read, link, created_at FROM notifications
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user.to_string(), limit], row_to_notification)?;
        Ok(collect_rows(rows)?)
    }

    pub fn mark_notifications_read(&self, user: UserId) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            params![user.to_string()],
        )?)
    }

    pub fn count_unread_notifications(&self, user: UserId) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id: String = row.get(0)?;
    let user: String = row.get(1)?;
    let kind: String = row.get(3)?;
    let created_at: String = row.get(6)?;

    let kind = NotificationKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown notification kind: {kind}").into(),
        )
    })?;

    Ok(Notification {
        id: NotificationId(parse_uuid(0, &id)?),
        user: UserId(parse_uuid(1, &user)?),
        text: row.get(2)?,
        kind,
        read: row.get(4)?,
        link: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
    })
}
