//! Accounts, presence flags and the friend graph.

use chrono::{DateTime, Utc};
use rusqlite::params;

use socialbook_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Credentials, NewUser, ProfileUpdate, User, UserSummary};
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

const USER_COLUMNS: &str = "id, first_name, last_name, email, avatar, cover, bio, is_online, \
                            last_seen, is_admin, is_owner, is_banned, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new account. Fails with [`StoreError::Conflict`] when the
    /// email is already registered.
    pub fn create_user(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let id = UserId::new();
        let result = self.conn().execute(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, avatar,
                                last_seen, is_admin, is_owner, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?7)",
            params![
                id.to_string(),
                new.first_name,
                new.last_name,
                new.email,
                new.password_hash,
                new.avatar,
                ts(&now),
                new.is_admin,
                new.is_owner,
            ],
        );

        match result {
            Ok(_) => self.get_user(id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "email {} is already registered",
                    new.email
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        let mut user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)?;
        user.friends = self.friends_of(id)?;
        Ok(user)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn find_credentials(&self, email: &str) -> Result<Credentials> {
        self.conn()
            .query_row(
                "SELECT id, password_hash, is_banned FROM users WHERE email = ?1",
                params![email],
                |row| {
                    let id: String = row.get(0)?;
                    Ok(Credentials {
                        user_id: UserId(parse_uuid(0, &id)?),
                        password_hash: row.get(1)?,
                        is_banned: row.get(2)?,
                    })
                },
            )
            .map_err(StoreError::from_query)
    }

    /// All users except `exclude`, newest account first.
    pub fn list_users_except(&self, exclude: UserId) -> Result<Vec<User>> {
        self.query_users(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY created_at DESC"
            ),
            params![exclude.to_string()],
        )
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.query_users(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"),
            [],
        )
    }

    pub fn user_summary(&self, id: UserId) -> Result<Option<UserSummary>> {
        match self.get_user(id) {
            Ok(user) => Ok(Some(user.summary())),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn count_users(&self) -> Result<u64> {
        self.count_rows("users")
    }

    fn query_users<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(sql)?;
        let mut users = collect_rows(stmt.query_map(params, row_to_user)?)?;
        for user in &mut users {
            user.friends = self.friends_of(user.id)?;
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET
                first_name = COALESCE(?2, first_name),
                last_name  = COALESCE(?3, last_name),
                avatar     = COALESCE(?4, avatar),
                cover      = COALESCE(?5, cover),
                bio        = COALESCE(?6, bio)
             WHERE id = ?1",
            params![
                id.to_string(),
                update.first_name,
                update.last_name,
                update.avatar,
                update.cover,
                update.bio,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    /// Mark the user online. Returns `false` when no such user exists.
    pub fn mark_online(&self, id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Mark the user offline and stamp `last_seen`.
    pub fn mark_offline(&self, id: UserId, last_seen: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = 0, last_seen = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&last_seen)],
        )?;
        Ok(affected > 0)
    }

    /// Clear every online flag. Presence is rebuilt from live connections
    /// after a restart, so flags left over from a previous process are stale.
    pub fn reset_online_flags(&self) -> Result<usize> {
        Ok(self
            .conn()
            .execute("UPDATE users SET is_online = 0 WHERE is_online = 1", [])?)
    }

    pub fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET is_banned = ?2 WHERE id = ?1",
            params![id.to_string(), banned],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Friend graph
    // ------------------------------------------------------------------

    /// Record a mutual friendship. Idempotent.
    pub fn add_friendship(&self, a: UserId, b: UserId, now: DateTime<Utc>) -> Result<()> {
        for (user, friend) in [(a, b), (b, a)] {
            self.conn().execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user.to_string(), friend.to_string(), ts(&now)],
            )?;
        }
        Ok(())
    }

    pub fn friends_of(&self, id: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let s: String = row.get(0)?;
            Ok(UserId(parse_uuid(0, &s)?))
        })?;
        Ok(collect_rows(rows)?)
    }

    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an account. ON DELETE CASCADE removes posts, likes, comments,
    /// messages, requests, notifications, stories, memberships and every
    /// group the user created.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a row selected with `USER_COLUMNS` to a [`User`] (friends left empty).
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let last_seen: String = row.get(8)?;
    let created_at: String = row.get(12)?;

    Ok(User {
        id: UserId(parse_uuid(0, &id)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        avatar: row.get(4)?,
        cover: row.get(5)?,
        bio: row.get(6)?,
        friends: Vec::new(),
        is_online: row.get(7)?,
        last_seen: parse_ts(8, &last_seen)?,
        is_admin: row.get(9)?,
        is_owner: row.get(10)?,
        is_banned: row.get(11)?,
        created_at: parse_ts(12, &created_at)?,
    })
}
