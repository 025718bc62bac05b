use std::{path::Path, time::Duration};

use {
    sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    tokio::sync::{Mutex, MutexGuard},
    tracing::info,
};

use crate::Result;

/// SQLite-backed message log and user table.
///
/// All mutations take `write_lock` first, so id assignment happens one insert
/// at a time no matter how many connections the pool holds. Reads go straight
/// to the pool and may run alongside a write.
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema must already exist (see [`Self::init`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open (or create) the database file and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;

        info!(path = %path.display(), "message store opened");
        Ok(Self::new(pool))
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create the `users` and `messages` tables if they don't exist.
    ///
    /// `AUTOINCREMENT` keeps ids from ever being handed out twice, even after
    /// the newest row is deleted. User ids start at 1, leaving 0 to the admin.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                name         TEXT NOT NULL,
                company      TEXT NOT NULL,
                cover_letter TEXT
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL,
                user_id     INTEGER NOT NULL,
                sender_role TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        // Migrations for columns added after initial release.
        sqlx::query("ALTER TABLE messages ADD COLUMN receiver_id INTEGER")
            .execute(pool)
            .await
            .ok(); // ignore if column already exists

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_user ON messages (user_id, id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
