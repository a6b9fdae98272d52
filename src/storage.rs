//! Relational storage over SQLite (sqlx).
//!
//! Every statement binds its values as parameters. Update/delete methods
//! return whether any row was affected so callers can tell "not found" apart
//! from success.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

use crate::models::{Project, ProjectFields, TestCase, TestFields, TestStatus, User};

const MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_PROJECT_STATUS: &str = "active";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone, Debug)] // Clone shares the pool across handlers
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database at `url` and run migrations.
    #[instrument]
    pub async fn open(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        // One connection that never expires: each connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // --- Users ---

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert the user, or replace the password hash if the username exists.
    pub async fn upsert_user(&self, username: &str, password_hash: &str) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (username, password_hash) VALUES (?, ?)
             ON CONFLICT(username) DO UPDATE SET password_hash = excluded.password_hash
             RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    // --- Projects ---

    pub async fn list_projects(&self) -> Result<Vec<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            "SELECT id, name, description, status, created_at, updated_at FROM projects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
    }

    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create_project(&self, fields: &ProjectFields, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO projects (name, description, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&fields.name)
        .bind(fields.description.as_deref().unwrap_or(""))
        .bind(fields.status.as_deref().unwrap_or(DEFAULT_PROJECT_STATUS))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Omitted optional fields keep their stored values.
    pub async fn update_project(
        &self,
        id: i64,
        fields: &ProjectFields,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects
             SET name = ?, description = COALESCE(?, description), status = COALESCE(?, status), updated_at = ?
             WHERE id = ?",
        )
        .bind(&fields.name)
        .bind(fields.description.as_deref())
        .bind(fields.status.as_deref())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_project(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Tests ---

    pub async fn list_tests(&self) -> Result<Vec<TestCase>, sqlx::Error> {
        sqlx::query_as::<_, TestCase>(
            "SELECT id, name, status, project_id, user_id, created_at, updated_at FROM tests ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
    }

    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create_test(&self, fields: &TestFields, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let status = fields.status.unwrap_or(TestStatus::Pending);
        let result = sqlx::query(
            "INSERT INTO tests (name, status, project_id, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&fields.name)
        .bind(status.as_str())
        .bind(fields.project_id.flatten())
        .bind(fields.user_id.flatten())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Omitted optional fields keep their stored values; a reference set to
    /// `Some(None)` is cleared.
    pub async fn update_test(&self, id: i64, fields: &TestFields, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tests
             SET name = ?, status = COALESCE(?, status),
                 project_id = CASE WHEN ? THEN ? ELSE project_id END,
                 user_id = CASE WHEN ? THEN ? ELSE user_id END,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&fields.name)
        .bind(fields.status.map(|s| s.as_str()))
        .bind(fields.project_id.is_some())
        .bind(fields.project_id.flatten())
        .bind(fields.user_id.is_some())
        .bind(fields.user_id.flatten())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_test(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
