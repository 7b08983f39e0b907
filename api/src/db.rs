use rusqlite::Connection;
use serde::Deserialize;

use crate::{error::ApiError, DbPool};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    /// `(page, limit)` with page >= 1 and limit clamped to 1..=MAX_PAGE_SIZE.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

pub const MIGRATIONS: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        subject     TEXT UNIQUE NOT NULL,
        username    TEXT NOT NULL,
        avatar_url  TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS models (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_public   INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_models_public ON models(is_public, created_at);

    CREATE TABLE IF NOT EXISTS comments (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        model_id    INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
        author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        parent_id   INTEGER REFERENCES comments(id) ON DELETE CASCADE,
        content     TEXT NOT NULL,
        is_edited   INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_comments_model ON comments(model_id, parent_id);
    CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);

    CREATE TABLE IF NOT EXISTS comment_likes (
        user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        comment_id  INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (user_id, comment_id)
    );
";

/// Per-connection setup; cascades only fire with foreign keys enabled.
pub fn configure(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(MIGRATIONS)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;
    migrate(&conn)?;
    Ok(())
}

/// Runs blocking database work off the async executor.
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}


#[cfg(test)]
pub mod testing {
    use rusqlite::{params, Connection};

    pub fn setup_conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        super::configure(&mut conn).expect("pragmas");
        super::migrate(&conn).expect("migrations");
        conn
    }

    pub fn seed_user(conn: &Connection, subject: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (subject, username) VALUES (?1, ?1)",
            [subject],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn seed_model(conn: &Connection, author_id: i64, is_public: bool) -> i64 {
        conn.execute(
            "INSERT INTO models (author_id, title, is_public) VALUES (?1, 'Smile set', ?2)",
            params![author_id, is_public],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn seed_comment(
        conn: &Connection,
        model_id: i64,
        author_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> i64 {
        conn.execute(
            "INSERT INTO comments (model_id, author_id, parent_id, content) VALUES (?1, ?2, ?3, ?4)",
            params![model_id, author_id, parent_id, content],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}
