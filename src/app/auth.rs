use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::users::{user_from_row, USER_COLUMNS};
use crate::domain::privacy::PrivacyDefaults;
use crate::domain::user::User;
use crate::infra::db::Db;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    token_ttl_hours: u64,
}

impl AuthService {
    pub fn new(db: Db, token_ttl_hours: u64) -> Self {
        Self {
            db,
            token_ttl_hours,
        }
    }

    /// Creates an account whose post privacy defaults to public for every
    /// post type.
    pub async fn signup(
        &self,
        username: String,
        email: String,
        display_name: String,
        password: String,
    ) -> Result<User> {
        let password_hash = hash_password(&password)?;
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, display_name, password_hash, privacy_defaults) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .bind(Json(PrivacyDefaults::default()))
        .fetch_one(self.db.pool())
        .await?;

        Ok(user_from_row(&row))
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<Option<AccessToken>> {
        let row = sqlx::query(
            "SELECT id, password_hash \
             FROM users WHERE email = $1 OR username = $1",
        )
        .bind(identifier)
        .fetch_optional(self.db.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: Uuid = row.get("id");
        let password_hash: String = row.get("password_hash");
        if password_hash.is_empty() {
            return Ok(None);
        }

        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let token = self.issue_token(user_id).await?;
        Ok(Some(token))
    }

    pub async fn issue_token(&self, user_id: Uuid) -> Result<AccessToken> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(self.token_ttl_hours as i64);

        sqlx::query(
            "INSERT INTO user_tokens (user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;

        Ok(AccessToken { token, expires_at })
    }

    pub async fn authenticate(&self, token: &str) -> Result<Option<AuthSession>> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM user_tokens \
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > now()",
        )
        .bind(hash_token(token))
        .fetch_optional(self.db.pool())
        .await?;

        Ok(user_id.map(|user_id| AuthSession { user_id }))
    }

    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_tokens SET revoked_at = now() \
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(hash_token(token))
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
