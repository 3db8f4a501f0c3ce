use rusqlite::Connection;

// Group messages live in their own table rather than inside the group row,
// so the retention sweep is a single DELETE instead of a document rewrite.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_groups (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name            TEXT NOT NULL,
    creator_id      TEXT NOT NULL,               -- always a member and an admin
    last_message_at TEXT,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (creator_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id  TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    is_admin  INTEGER NOT NULL DEFAULT 0,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id)  REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

CREATE TABLE IF NOT EXISTS group_messages (
    id         TEXT PRIMARY KEY NOT NULL,
    group_id   TEXT NOT NULL,
    from_id    TEXT NOT NULL,
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (group_id) REFERENCES chat_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (from_id)  REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_messages_group ON group_messages(group_id, created_at);
CREATE INDEX IF NOT EXISTS idx_group_messages_age   ON group_messages(created_at);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
