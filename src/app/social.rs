use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::app::notifications::NotificationService;
use crate::app::privacy::RelationshipOracle;
use crate::domain::notification::NotificationKind;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct SocialService {
    db: Db,
}

#[derive(Debug, Clone, Copy)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

impl SocialService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Returns false when the edge already existed or the user tried to
    /// follow themselves.
    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query(
            "INSERT INTO follows (follower_id, followee_id) \
             SELECT $1, $2 \
             WHERE $1 <> $2 \
             ON CONFLICT DO NOTHING",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&mut *tx)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            NotificationService::create_with_tx(
                &mut tx,
                followee_id,
                NotificationKind::Follow,
                follower_id,
                None,
            )
            .await?;
        }

        tx.commit().await?;

        Ok(created)
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(exists)
    }

    pub async fn counts(&self, user_id: Uuid) -> Result<FollowCounts> {
        let row = sqlx::query(
            "SELECT \
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1) AS followers, \
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(FollowCounts {
            followers: row.get("followers"),
            following: row.get("following"),
        })
    }
}

#[async_trait]
impl RelationshipOracle for SocialService {
    async fn follows(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        self.is_following(follower_id, followee_id).await
    }
}
