//! Feed posts with their likes and comments.
//!
//! Likes and comments are child tables rather than arrays on the post row.
//! Likes are capped at [`MAX_REACTIONS_PER_POST`]; comments are unbounded
//! but cost one insert each.

use chrono::{DateTime, Utc};
use rusqlite::params;

use socialbook_shared::constants::MAX_REACTIONS_PER_POST;
use socialbook_shared::{CommentId, PostId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Comment, Post};
use crate::sql::{collect_rows, parse_ts, parse_uuid, ts};

const POST_COLUMNS: &str = "id, author_id, content, image, created_at, updated_at";

impl Database {
    pub fn create_post(
        &self,
        author: UserId,
        content: Option<&str>,
        image: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Post> {
        let id = PostId::new();
        self.conn().execute(
            "INSERT INTO posts (id, author_id, content, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id.to_string(), author.to_string(), content, image, ts(&now)],
        )?;
        self.get_post(id)
    }

    pub fn get_post(&self, id: PostId) -> Result<Post> {
        let mut post = self
            .conn()
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id.to_string()],
                row_to_post,
            )
            .map_err(StoreError::from_query)?;
        self.load_children(&mut post)?;
        Ok(post)
    }

    /// The global feed, newest first.
    pub fn list_posts(&self) -> Result<Vec<Post>> {
        self.query_posts(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC"),
            [],
        )
    }

    pub fn list_posts_by(&self, author: UserId) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE author_id = ?1 ORDER BY created_at DESC"
            ),
            params![author.to_string()],
        )
    }

    pub fn delete_post(&self, id: PostId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM posts WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    pub fn count_posts(&self) -> Result<u64> {
        self.count_rows("posts")
    }

    /// Like or unlike. Returns the updated post and whether `user` now likes
    /// it. A new like on a post already at the cap is rejected with
    /// [`StoreError::Conflict`]; unliking always succeeds.
    pub fn toggle_like(&self, id: PostId, user: UserId, now: DateTime<Utc>) -> Result<(Post, bool)> {
        let post = self.get_post(id)?;

        let liked = if post.likes.contains(&user) {
            self.conn().execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                params![id.to_string(), user.to_string()],
            )?;
            false
        } else {
            if post.likes.len() >= MAX_REACTIONS_PER_POST {
                return Err(StoreError::Conflict(format!(
                    "post already has {MAX_REACTIONS_PER_POST} likes"
                )));
            }
            self.conn().execute(
                "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), user.to_string(), ts(&now)],
            )?;
            true
        };

        self.touch_post(id, now)?;
        Ok((self.get_post(id)?, liked))
    }

    pub fn add_comment(&self, id: PostId, author: UserId, text: &str, now: DateTime<Utc>) -> Result<Post> {
        let affected = self.conn().execute(
            "INSERT INTO post_comments (id, post_id, author_id, text, created_at)
             SELECT ?1, id, ?3, ?4, ?5 FROM posts WHERE id = ?2",
            params![
                CommentId::new().to_string(),
                id.to_string(),
                author.to_string(),
                text,
                ts(&now),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.touch_post(id, now)?;
        self.get_post(id)
    }

    fn touch_post(&self, id: PostId, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE posts SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&now)],
        )?;
        Ok(())
    }

    fn query_posts<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Post>> {
        let mut stmt = self.conn().prepare(sql)?;
        let mut posts = collect_rows(stmt.query_map(params, row_to_post)?)?;
        for post in &mut posts {
            self.load_children(post)?;
        }
        Ok(posts)
    }

    fn load_children(&self, post: &mut Post) -> Result<()> {
        let mut likes = self.conn().prepare(
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at ASC",
        )?;
        post.likes = collect_rows(likes.query_map(params![post.id.to_string()], |row| {
            let s: String = row.get(0)?;
            Ok(UserId(parse_uuid(0, &s)?))
        })?)?;

        let mut comments = self.conn().prepare(
            "SELECT id, post_id, author_id, text, created_at FROM post_comments
             WHERE post_id = ?1 ORDER BY created_at ASC",
        )?;
        post.comments = collect_rows(
            comments.query_map(params![post.id.to_string()], row_to_comment)?,
        )?;
        Ok(())
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let id: String = row.get(0)?;
    let author: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Post {
        id: PostId(parse_uuid(0, &id)?),
        author: UserId(parse_uuid(1, &author)?),
        content: row.get(2)?,
        image: row.get(3)?,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let id: String = row.get(0)?;
    let post_id: String = row.get(1)?;
    let author: String = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(Comment {
        id: CommentId(parse_uuid(0, &id)?),
        post_id: PostId(parse_uuid(1, &post_id)?),
        author: UserId(parse_uuid(2, &author)?),
        text: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}
