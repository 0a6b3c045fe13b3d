use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::models::{NewPaste, Paste};

const CREATE_PASTES: &str = "CREATE TABLE IF NOT EXISTS pastes (
    name TEXT NOT NULL PRIMARY KEY,
    content TEXT NOT NULL,
    mime TEXT NOT NULL,
    expires INTEGER,
    deleteToken TEXT NOT NULL UNIQUE
)";

const CREATE_EXPIRES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS pastes_expires ON pastes (expires) WHERE expires IS NOT NULL";

/// How a delete request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// A live paste exists under that name but the token did not match.
    TokenMismatch,
    NotFound,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a database by URL, creating it and its schema if needed.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(CREATE_PASTES).execute(&pool).await?;
        sqlx::query(CREATE_EXPIRES_INDEX).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Get a live paste by name.
    pub async fn get_paste(&self, name: &str, now: i64) -> crate::ApiResult<Paste> {
        let mut conn = self.pool.acquire().await?;
        let paste = sqlx::query_as::<_, Paste>(
            "SELECT name, content, mime, expires FROM pastes WHERE name = ? AND (expires IS \
             NULL OR expires > ?)",
        )
        .bind(name)
        .bind(now)
        .fetch_one(&mut conn)
        .await?;
        Ok(paste)
    }

    /// Insert a paste. Fails with `DuplicateIdentifier` if the name or token is taken.
    pub async fn insert_paste(&self, paste: &NewPaste) -> crate::ApiResult<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            "INSERT INTO pastes (name, content, mime, expires, deleteToken) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&paste.name)
        .bind(&paste.content)
        .bind(&paste.mime)
        .bind(paste.expires)
        .bind(&paste.delete_token)
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Delete a live paste if `token` is its delete token.
    pub async fn delete_paste(
        &self,
        name: &str,
        token: &str,
        now: i64,
    ) -> crate::ApiResult<DeleteOutcome> {
        let mut conn = self.pool.acquire().await?;
        let deleted = sqlx::query(
            "DELETE FROM pastes WHERE name = ? AND deleteToken = ? AND (expires IS NULL OR \
             expires > ?)",
        )
        .bind(name)
        .bind(token)
        .bind(now)
        .execute(&mut conn)
        .await?
        .rows_affected();

        if deleted > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pastes WHERE name = ? AND (expires IS NULL OR expires > ?)",
        )
        .bind(name)
        .bind(now)
        .fetch_one(&mut conn)
        .await?;

        if live > 0 {
            Ok(DeleteOutcome::TokenMismatch)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    /// Remove every paste that expired at or before `now`. Returns the number removed.
    pub async fn purge_expired(&self, now: i64) -> crate::ApiResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("DELETE FROM pastes WHERE expires IS NOT NULL AND expires <= ?")
            .bind(now)
            .execute(&mut conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored rows, expired or not.
    #[cfg(test)]
    pub async fn count_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM pastes")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
