use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePool, Sqlite};

use crate::{
    error::AppError,
    models::{normalize_email, CreateUser, User},
};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            tracing::info!("Creating database {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;

        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Row-level user storage with a unique constraint on email.
///
/// `create` returns [`AppError::DuplicateUser`] when the email is already
/// taken so callers can tell a lost creation race from a broken store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn create(&self, user: CreateUser) -> Result<User, AppError>;
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, firstname, lastname, password, provider, created_at
             FROM users
             WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: CreateUser) -> Result<User, AppError> {
        let email = normalize_email(&user.email);
        let now = chrono::Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (email, firstname, lastname, password, provider, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&email)
        .bind(&user.firstname)
        .bind(&user.lastname)
        .bind(&user.password_hash)
        .bind(user.provider.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                AppError::DuplicateUser(email.clone())
            }
            other => AppError::Database(other),
        })?;

        let created_user = sqlx::query_as::<_, User>(
            "SELECT id, email, firstname, lastname, password, provider, created_at
             FROM users
             WHERE id = ?",
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;

        Ok(created_user)
    }
}
