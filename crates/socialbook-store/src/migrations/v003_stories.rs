use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    author_id  TEXT NOT NULL,
    image      TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,               -- created_at + 24h

    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_stories_expiry ON stories(expires_at);

CREATE TABLE IF NOT EXISTS story_views (
    story_id  TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    viewed_at TEXT NOT NULL,

    PRIMARY KEY (story_id, user_id),
    FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id)  REFERENCES users(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
