use {
    async_trait::async_trait,
    hotline_protocol::UserId,
    serde::{Deserialize, Serialize},
    tracing::info,
};

use crate::{Error, Result, SqliteStore};

/// Registered chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub company: String,
    pub cover_letter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub company: String,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

/// Id and display name, as listed for the admin's conversation picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

/// Read-only name lookup used to label notifications.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display name of `user_id`, or [`Error::UnknownUser`].
    async fn lookup_name(&self, user_id: UserId) -> Result<String>;
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn lookup_name(&self, user_id: UserId) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::UnknownUser(user_id))
    }
}

// ── Admin CRUD ───────────────────────────────────────────────────────────────

impl SqliteStore {
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let name = new.name.trim();
        let company = new.company.trim();
        if name.is_empty() {
            return Err(Error::InvalidUser("name must not be empty"));
        }
        if company.is_empty() {
            return Err(Error::InvalidUser("company must not be empty"));
        }

        let _writer = self.writer().await;
        let result =
            sqlx::query("INSERT INTO users (name, company, cover_letter) VALUES (?, ?, ?)")
                .bind(name)
                .bind(company)
                .bind(&new.cover_letter)
                .execute(&self.pool)
                .await?;

        let user = User {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            company: company.to_string(),
            cover_letter: new.cover_letter,
        };
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, name, company, cover_letter FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        Ok(
            sqlx::query_as::<_, UserSummary>("SELECT id, name FROM users ORDER BY name ASC, id ASC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Match a name + company login pair. Surrounding whitespace is ignored.
    pub async fn find_login(&self, name: &str, company: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, name, company, cover_letter FROM users WHERE name = ? AND company = ?",
        )
        .bind(name.trim())
        .bind(company.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Delete a user together with their conversation. Returns whether the
    /// user existed.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let _writer = self.writer().await;
        let mut tx = self.pool.begin().await?;
        let messages = sqlx::query("DELETE FROM messages WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let users = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        if users > 0 {
            info!(user_id, messages, "user deleted");
        }
        Ok(users > 0)
    }
}
