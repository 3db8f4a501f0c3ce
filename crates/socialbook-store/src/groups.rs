//! Group chats: membership, admin roles and the time-bounded message log.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use socialbook_shared::constants::GROUP_MESSAGE_RETENTION_HOURS;
use socialbook_shared::{GroupId, GroupMessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Group, GroupMessage};
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

/// Oldest `created_at` still served at `now`; anything strictly older is
/// hidden on read and removed by the next sweep.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(GROUP_MESSAGE_RETENTION_HOURS)
}

impl Database {
    /// Create a group. The creator is inserted as an admin member; `members`
    /// may or may not contain the creator and duplicates are ignored.
    pub fn create_group(
        &self,
        name: &str,
        creator: UserId,
        members: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<Group> {
        let id = GroupId::new();
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO chat_groups (id, name, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), name, creator.to_string(), ts(&now)],
        )?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, is_admin, joined_at)
             VALUES (?1, ?2, 1, ?3)",
            params![id.to_string(), creator.to_string(), ts(&now)],
        )?;
        for member in members.iter().filter(|m| **m != creator) {
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![id.to_string(), member.to_string(), ts(&now)],
            )?;
        }
        tx.commit()?;

        self.get_group(id)
    }

    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        let mut group = self
            .conn()
            .query_row(
                "SELECT id, name, creator_id, last_message_at, created_at
                 FROM chat_groups WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .map_err(StoreError::from_query)?;
        self.load_members(&mut group)?;
        Ok(group)
    }

    /// Groups `user` belongs to, most recently active first.
    pub fn list_groups_for_member(&self, user: UserId) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT g.id, g.name, g.creator_id, g.last_message_at, g.created_at
             FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1
             ORDER BY COALESCE(g.last_message_at, g.created_at) DESC",
        )?;
        let mut groups = collect_rows(stmt.query_map(params![user.to_string()], row_to_group)?)?;
        for group in &mut groups {
            self.load_members(group)?;
        }
        Ok(groups)
    }

    /// Add `user` as a regular member. Adding an existing member is a no-op.
    pub fn add_group_member(&self, group: GroupId, user: UserId, now: DateTime<Utc>) -> Result<Group> {
        self.conn().execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
             SELECT id, ?2, 0, ?3 FROM chat_groups WHERE id = ?1",
            params![group.to_string(), user.to_string(), ts(&now)],
        )?;
        self.get_group(group)
    }

    /// Remove `user` from the group. The creator can never be removed this
    /// way; deleting the group is the only way to drop them.
    pub fn remove_group_member(&self, group: GroupId, user: UserId) -> Result<Group> {
        let current = self.get_group(group)?;
        if current.creator == user {
            return Err(StoreError::Forbidden("cannot remove the group creator".into()));
        }
        let affected = self.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group.to_string(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_group(group)
    }

    /// Grant admin to an existing member.
    pub fn promote_group_admin(&self, group: GroupId, user: UserId) -> Result<Group> {
        let affected = self.conn().execute(
            "UPDATE group_members SET is_admin = 1 WHERE group_id = ?1 AND user_id = ?2",
            params![group.to_string(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_group(group)
    }

    /// Delete a group with its memberships and message log.
    pub fn delete_group(&self, id: GroupId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM chat_groups WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn count_groups(&self) -> Result<u64> {
        self.count_rows("chat_groups")
    }

    // ------------------------------------------------------------------
    // Message log
    // ------------------------------------------------------------------

    /// Append a message and bump the group's `last_message_at`.
    pub fn insert_group_message(
        &self,
        group: GroupId,
        from: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<GroupMessage> {
        let message = GroupMessage {
            id: GroupMessageId::new(),
            group_id: group,
            from,
            text: text.to_string(),
            created_at: now,
        };

        let tx = self.conn().unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE chat_groups SET last_message_at = ?2 WHERE id = ?1",
            params![group.to_string(), ts(&now)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tx.execute(
            "INSERT INTO group_messages (id, group_id, from_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.to_string(),
                group.to_string(),
                from.to_string(),
                message.text,
                ts(&message.created_at),
            ],
        )?;
        tx.commit()?;

        Ok(message)
    }

    /// Messages still inside the retention window at `now`, oldest first.
    pub fn group_messages(&self, group: GroupId, now: DateTime<Utc>) -> Result<Vec<GroupMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, group_id, from_id, text, created_at FROM group_messages
             WHERE group_id = ?1 AND created_at >= ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(
            params![group.to_string(), ts(&retention_cutoff(now))],
            row_to_group_message,
        )?;
        Ok(collect_rows(rows)?)
    }

    /// Delete every group message created strictly before `cutoff`, across
    /// all groups. Returns the number of rows removed.
    pub fn prune_group_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM group_messages WHERE created_at < ?1",
            params![ts(&cutoff)],
        )?)
    }

    pub fn count_group_messages(&self) -> Result<u64> {
        self.count_rows("group_messages")
    }

    fn load_members(&self, group: &mut Group) -> Result<()> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, is_admin FROM group_members
             WHERE group_id = ?1 ORDER BY joined_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![group.id.to_string()], |row| {
            let s: String = row.get(0)?;
            let is_admin: bool = row.get(1)?;
            Ok((UserId(parse_uuid(0, &s)?), is_admin))
        })?;

        group.members.clear();
        group.admins.clear();
        for (user, is_admin) in collect_rows(rows)? {
            group.members.push(user);
            if is_admin {
                group.admins.push(user);
            }
        }
        Ok(())
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id: String = row.get(0)?;
    let creator: String = row.get(2)?;
    let last_message_at: Option<String> = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(Group {
        id: GroupId(parse_uuid(0, &id)?),
        name: row.get(1)?,
        creator: UserId(parse_uuid(2, &creator)?),
        admins: Vec::new(),
        members: Vec::new(),
        last_message_at: last_message_at
            .map(|s| parse_ts(3, &s))
            .transpose()?,
        created_at: parse_ts(4, &created_at)?,
    })
}

fn row_to_group_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessage> {
    let id: String = row.get(0)?;
    let group_id: String = row.get(1)?;
    let from: String = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(GroupMessage {
        id: GroupMessageId(parse_uuid(0, &id)?),
        group_id: GroupId(parse_uuid(1, &group_id)?),
        from: UserId(parse_uuid(2, &from)?),
        text: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::new_user;

    #[test]
    fn test_creator_is_admin_member() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");

        let group = db
            .create_group("crew", alice.id, &[bob.id, alice.id, bob.id], Utc::now())
            .unwrap();
        assert_eq!(group.members, vec![alice.id, bob.id]);
        assert_eq!(group.admins, vec![alice.id]);
        assert!(group.last_message_at.is_none());
    }

    #[test]
    fn test_creator_cannot_be_removed() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        assert!(matches!(
            db.remove_group_member(group.id, alice.id),
            Err(StoreError::Forbidden(_))
        ));
        let group = db.remove_group_member(group.id, bob.id).unwrap();
        assert_eq!(group.members, vec![alice.id]);
    }

    #[test]
    fn test_removing_non_member_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        db.remove_group_member(group.id, bob.id).unwrap();
        assert!(matches!(
            db.remove_group_member(group.id, bob.id),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.remove_group_member(group.id, UserId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_promote_requires_membership() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let carol = new_user(&db, "Carol");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        let group = db.promote_group_admin(group.id, bob.id).unwrap();
        assert!(group.is_admin(&bob.id));
        assert!(matches!(
            db.promote_group_admin(group.id, carol.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_messages_bump_last_message_at() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        let now = Utc::now();
        db.insert_group_message(group.id, bob.id, "hey", now).unwrap();

        let group = db.get_group(group.id).unwrap();
        assert_eq!(
            group.last_message_at.map(|t| t.timestamp_micros()),
            Some(now.timestamp_micros())
        );
        assert_eq!(db.group_messages(group.id, now).unwrap().len(), 1);
        assert_eq!(db.list_groups_for_member(bob.id).unwrap().len(), 1);
    }

    #[test]
    fn test_prune_cutoff_is_strict() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        let now = Utc::now();
        let cutoff = retention_cutoff(now);
        db.insert_group_message(group.id, alice.id, "stale", cutoff - Duration::seconds(1))
            .unwrap();
        db.insert_group_message(group.id, alice.id, "fresh", cutoff + Duration::seconds(1))
            .unwrap();

        assert_eq!(db.prune_group_messages_before(cutoff).unwrap(), 1);
        let remaining = db.group_messages(group.id, now).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "fresh");

        assert_eq!(db.prune_group_messages_before(cutoff).unwrap(), 0);
    }

    #[test]
    fn test_deleting_creator_deletes_group() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group("crew", alice.id, &[bob.id], Utc::now()).unwrap();

        assert!(db.delete_user(alice.id).unwrap());
        assert!(matches!(db.get_group(group.id), Err(StoreError::NotFound)));
    }
}
