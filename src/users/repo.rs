use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::AppResult,
    query::{self, Collection, Column, ColumnKind, ListQuery},
    users::repo_types::{NewUser, ProfilePatch, User},
};

const USER_COLUMNS: &str = r#"
    id, name, email, photo, role, password_hash, password_changed_at,
    password_reset_token_hash, password_reset_expires_at,
    login_attempts, blocked, block_expires_at, active, created_at
"#;

/// Public projection of the users table. Credential columns are never listed.
pub const USERS: Collection = Collection {
    table: "users",
    columns: &[
        Column::new("id", "id", ColumnKind::Uuid),
        Column::new("name", "name", ColumnKind::Text),
        Column::new("email", "email", ColumnKind::Text),
        Column::new("photo", "photo", ColumnKind::Text),
        Column::new("role", "role", ColumnKind::Text),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ],
    base_conditions: &["active = TRUE"],
};

/// Persisted user records. Lookups only ever see active users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, new: NewUser) -> AppResult<User>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Active user whose reset token hash matches and has not expired at `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>>;

    /// Writes password, reset token and lockout state. Last writer wins.
    async fn save_credentials(&self, user: &User) -> AppResult<()>;

    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> AppResult<Option<User>>;

    /// Soft delete. Returns false when no active user matched.
    async fn deactivate(&self, id: Uuid) -> AppResult<bool>;

    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new: NewUser) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active = TRUE"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE password_reset_token_hash = $1
              AND password_reset_expires_at > $2
              AND active = TRUE
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn save_credentials(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_token_hash = $4,
                   password_reset_expires_at = $5,
                   login_attempts = $6,
                   blocked = $7,
                   block_expires_at = $8
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token_hash)
        .bind(user.password_reset_expires_at)
        .bind(user.login_attempts)
        .bind(user.blocked)
        .bind(user.block_expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   photo = COALESCE($4, photo),
                   role = COALESCE($5, role)
             WHERE id = $1 AND active = TRUE
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.photo)
        .bind(patch.role.map(|r| r.as_str()))
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active = TRUE")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// Admin listing through the query builder.
pub async fn list(db: &PgPool, q: &ListQuery) -> AppResult<Vec<Value>> {
    query::fetch_documents(db, &USERS, q).await
}
