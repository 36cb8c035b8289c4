use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::post::PostType;
use crate::domain::privacy::{resolve_privacy, PrivacyDefaults, PrivacyOverride};
use crate::domain::user::User;
use crate::infra::db::Db;

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, display_name, privacy_defaults, created_at";

pub(crate) fn user_from_row(row: &PgRow) -> User {
    let defaults: Json<PrivacyDefaults> = row.get("privacy_defaults");
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        privacy_defaults: defaults.0,
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn privacy_defaults(&self, user_id: Uuid) -> Result<Option<PrivacyDefaults>> {
        let defaults: Option<Json<PrivacyDefaults>> =
            sqlx::query_scalar("SELECT privacy_defaults FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(defaults.map(|defaults| defaults.0))
    }

    /// Replaces the default privacy for one post type. A request that does
    /// not name a valid mode leaves the stored default as it was.
    pub async fn update_privacy_default(
        &self,
        user_id: Uuid,
        post_type: PostType,
        requested: &PrivacyOverride,
    ) -> Result<Option<PrivacyDefaults>> {
        let mut tx = self.db.pool().begin().await?;

        let current: Option<Json<PrivacyDefaults>> =
            sqlx::query_scalar("SELECT privacy_defaults FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(Json(mut defaults)) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        let resolved = resolve_privacy(defaults.for_post_type(post_type), Some(requested));
        defaults.set(post_type, resolved);

        sqlx::query("UPDATE users SET privacy_defaults = $2 WHERE id = $1")
            .bind(user_id)
            .bind(Json(&defaults))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(defaults))
    }
}
