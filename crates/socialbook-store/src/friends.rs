use chrono::{DateTime, Utc};
use rusqlite::params;

use socialbook_shared::{FriendRequestId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{FriendRequest, FriendRequestStatus, UserSummary};
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

impl Database {
    /// Open a pending request from `from` to `to`. Fails with
    /// [`StoreError::Conflict`] when a pending request already exists in
    /// either direction.
    pub fn create_friend_request(
        &self,
        from: UserId,
        to: UserId,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest> {
        if self.pending_request_between(from, to)? {
            return Err(StoreError::Conflict("a friend request is already pending".into()));
        }

        let request = FriendRequest {
            id: FriendRequestId::new(),
            from,
            to,
            status: FriendRequestStatus::Pending,
            created_at: now,
        };
        self.conn().execute(
            "INSERT INTO friend_requests (id, from_id, to_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.id.to_string(),
                from.to_string(),
                to.to_string(),
                request.status.as_str(),
                ts(&now),
            ],
        )?;
        Ok(request)
    }

    pub fn pending_request_between(&self, a: UserId, b: UserId) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM friend_requests
             WHERE status = 'pending'
               AND ((from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1))",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn get_friend_request(&self, id: FriendRequestId) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                "SELECT id, from_id, to_id, status, created_at FROM friend_requests WHERE id = ?1",
                params![id.to_string()],
                row_to_request,
            )
            .map_err(StoreError::from_query)
    }

    /// Pending requests addressed to `user`, newest first.
    pub fn incoming_friend_requests(&self, user: UserId) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_id, to_id, status, created_at FROM friend_requests
             WHERE to_id = ?1 AND status = 'pending' ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_request)?;
        Ok(collect_rows(rows)?)
    }

    /// Accept a request and record the mutual friendship in one transaction.
    pub fn accept_friend_request(&self, id: FriendRequestId, now: DateTime<Utc>) -> Result<FriendRequest> {
        let mut request = self.get_friend_request(id)?;

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "UPDATE friend_requests SET status = 'accepted' WHERE id = ?1",
            params![id.to_string()],
        )?;
        for (user, friend) in [(request.to, request.from), (request.from, request.to)] {
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user.to_string(), friend.to_string(), ts(&now)],
            )?;
        }
        tx.commit()?;

        request.status = FriendRequestStatus::Accepted;
        Ok(request)
    }

    pub fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Up to `limit` users who are neither `user`, a friend of `user`, nor
    /// party to any request involving `user`.
    pub fn friend_suggestions(&self, user: UserId, limit: u32) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM users u
             WHERE u.id != ?1
               AND u.is_banned = 0
               AND u.id NOT IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
               AND u.id NOT IN (SELECT to_id FROM friend_requests WHERE from_id = ?1)
               AND u.id NOT IN (SELECT from_id FROM friend_requests WHERE to_id = ?1)
             ORDER BY u.created_at DESC
             LIMIT ?2",
        )?;
        let ids = collect_rows(stmt.query_map(params![user.to_string(), limit], |row| {
            let s: String = row.get(0)?;
            Ok(UserId(parse_uuid(0, &s)?))
        })?)?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(summary) = self.user_summary(id)? {
                out.push(summary);
            }
        }
        Ok(out)
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let id: String = row.get(0)?;
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    let status = FriendRequestStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown request status: {status}").into(),
        )
    })?;

    Ok(FriendRequest {
        id: FriendRequestId(parse_uuid(0, &id)?),
        from: UserId(parse_uuid(1, &from)?),
        to: UserId(parse_uuid(2, &to)?),
        status,
        created_at: parse_ts(4, &created_at)?,
    })
}
