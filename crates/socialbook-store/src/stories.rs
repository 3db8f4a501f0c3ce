use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use socialbook_shared::constants::STORY_TTL_HOURS;
use socialbook_shared::{StoryId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Story;
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

impl Database {
    /// Publish a story that expires [`STORY_TTL_HOURS`] after `now`.
    pub fn create_story(&self, author: UserId, image: &str, now: DateTime<Utc>) -> Result<Story> {
        let story = Story {
            id: StoryId::new(),
            author,
            image: image.to_string(),
            viewers: Vec::new(),
            created_at: now,
            expires_at: now + Duration::hours(STORY_TTL_HOURS),
        };

        self.conn().execute(
            "INSERT INTO stories (id, author_id, image, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                story.id.to_string(),
                author.to_string(),
                story.image,
                ts(&story.created_at),
                ts(&story.expires_at),
            ],
        )?;
        Ok(story)
    }

    pub fn get_story(&self, id: StoryId) -> Result<Story> {
        let mut story = self
            .conn()
            .query_row(
                "SELECT id, author_id, image, created_at, expires_at FROM stories WHERE id = ?1",
                params![id.to_string()],
                row_to_story,
            )
            .map_err(StoreError::from_query)?;
        story.viewers = self.story_viewers(id)?;
        Ok(story)
    }

    /// Stories that have not expired at `now`, newest first.
    pub fn active_stories(&self, now: DateTime<Utc>) -> Result<Vec<Story>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, author_id, image, created_at, expires_at FROM stories
             WHERE expires_at > ?1 ORDER BY created_at DESC",
        )?;
        let mut stories = collect_rows(stmt.query_map(params![ts(&now)], row_to_story)?)?;
        for story in &mut stories {
            story.viewers = self.story_viewers(story.id)?;
        }
        Ok(stories)
    }

    /// Record that `viewer` has seen the story. Repeated views count once.
    pub fn mark_story_viewed(&self, id: StoryId, viewer: UserId, now: DateTime<Utc>) -> Result<Story> {
        self.conn().execute(
            "INSERT OR IGNORE INTO story_views (story_id, user_id, viewed_at)
             SELECT id, ?2, ?3 FROM stories WHERE id = ?1",
            params![id.to_string(), viewer.to_string(), ts(&now)],
        )?;
        self.get_story(id)
    }

    pub fn delete_story(&self, id: StoryId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM stories WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Physically remove stories whose `expires_at` has passed.
    pub fn purge_expired_stories(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM stories WHERE expires_at <= ?1",
            params![ts(&now)],
        )?)
    }

    pub fn count_stories(&self) -> Result<u64> {
        self.count_rows("stories")
    }

    fn story_viewers(&self, id: StoryId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM story_views WHERE story_id = ?1 ORDER BY viewed_at ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let s: String = row.get(0)?;
            Ok(UserId(parse_uuid(0, &s)?))
        })?;
        Ok(collect_rows(rows)?)
    }
}

fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<Story> {
    let id: String = row.get(0)?;
    let author: String = row.get(1)?;
    let created_at: String = row.get(3)?;
    let expires_at: String = row.get(4)?;

    Ok(Story {
        id: StoryId(parse_uuid(0, &id)?),
        author: UserId(parse_uuid(1, &author)?),
        image: row.get(2)?,
        viewers: Vec::new(),
        created_at: parse_ts(3, &created_at)?,
        expires_at: parse_ts(4, &expires_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::new_user;

    #[test]
    fn test_story_expires_after_a_day() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let t0 = Utc::now();

        let story = db.create_story(alice.id, "img.png", t0).unwrap();
        assert_eq!(story.expires_at - story.created_at, Duration::hours(24));

        assert_eq!(db.active_stories(t0 + Duration::hours(23)).unwrap().len(), 1);
        assert!(db.active_stories(t0 + Duration::hours(24)).unwrap().is_empty());

        assert_eq!(db.purge_expired_stories(t0 + Duration::hours(24)).unwrap(), 1);
        assert_eq!(db.count_stories().unwrap(), 0);
    }

    #[test]
    fn test_views_are_deduplicated() {
        let db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let story = db.create_story(alice.id, "img.png", Utc::now()).unwrap();

        db.mark_story_viewed(story.id, bob.id, Utc::now()).unwrap();
        let story = db.mark_story_viewed(story.id, bob.id, Utc::now()).unwrap();
        assert_eq!(story.viewers, vec![bob.id]);
    }

    #[test]
    fn test_view_of_missing_story() {
        let db = Database::open_in_memory().unwrap();
        let bob = new_user(&db, "Bob");
        assert!(matches!(
            db.mark_story_viewed(StoryId::new(), bob.id, Utc::now()),
            Err(StoreError::NotFound)
        ));
    }
}
