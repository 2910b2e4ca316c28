//! Reader accounts

use sqlx::SqlitePool;
use tracing::info;

use crate::domain::User;
use crate::error::{Error, Result};

pub const DEFAULT_USER_ID: i64 = 1;
pub const DEFAULT_USERNAME: &str = "testuser";

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the user unless the id already exists. Returns the stored user
    /// and whether this call created it.
    pub async fn ensure_user(&self, id: i64, username: &str) -> Result<(User, bool)> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput("Username must not be empty".to_string()));
        }

        let created: Option<User> = sqlx::query_as(
            "INSERT INTO users (id, username) VALUES (?, ?)
             ON CONFLICT DO NOTHING
             RETURNING id, username",
        )
        .bind(id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = created {
            info!(user_id = user.id, username = %user.username, "Created user");
            return Ok((user, true));
        }

        match self.find(id).await? {
            Some(user) => Ok((user, false)),
            None => Err(Error::DuplicateEntry(format!(
                "username '{}' belongs to another user",
                username
            ))),
        }
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }

    async fn find(&self, id: i64) -> Result<Option<User>> {
        Ok(sqlx::query_as("SELECT id, username FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
