use anyhow::{anyhow, Result};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::user::PublicUser;
use crate::infra::db::Db;

const DEFAULT_COUNT: i64 = 25;
const MIN_COUNT: i64 = 5;
const MAX_COUNT: i64 = 100;

/// Page window for list endpoints. Out-of-range values fall back to the
/// defaults instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub count: i64,
    pub offset: i64,
}

impl ListParams {
    pub fn from_query(count: Option<&str>, offset: Option<&str>) -> Self {
        let count = count
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|count| (MIN_COUNT..=MAX_COUNT).contains(count))
            .unwrap_or(DEFAULT_COUNT);
        let offset = offset
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|offset| *offset >= 0)
            .unwrap_or(0);

        Self { count, offset }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    Marked,
    AlreadyRead,
    NotFound,
    NotOwner,
}

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
}

impl NotificationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub(crate) async fn create_with_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: Uuid,
        kind: NotificationKind,
        user_action_id: Uuid,
        post_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO notifications (user_id, kind, user_action_id, post_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(user_id)
        .bind(kind.as_db())
        .bind(user_action_id)
        .bind(post_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    pub async fn list(&self, user_id: Uuid, params: ListParams) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT n.id, n.user_id, n.kind, n.user_action_id, n.post_id, n.read, n.created_at, \
                    u.username AS actor_username, u.display_name AS actor_display_name, \
                    u.created_at AS actor_created_at \
             FROM notifications n \
             LEFT JOIN users u ON u.id = n.user_action_id \
             WHERE n.user_id = $1 \
             ORDER BY n.created_at DESC, n.id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(params.count)
        .bind(params.offset)
        .fetch_all(self.db.pool())
        .await?;

        let mut notifications = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("kind");
            let kind = NotificationKind::from_db(&kind)
                .ok_or_else(|| anyhow!("unknown notification kind: {}", kind))?;
            let user_action_id: Option<Uuid> = row.get("user_action_id");
            let actor_username: Option<String> = row.get("actor_username");

            let user_action = match (user_action_id, actor_username) {
                (Some(id), Some(username)) => Some(PublicUser {
                    id,
                    username,
                    display_name: row.get("actor_display_name"),
                    created_at: row.get("actor_created_at"),
                    followers_count: 0,
                    following_count: 0,
                }),
                _ => None,
            };

            notifications.push(Notification {
                id: row.get("id"),
                user_id: row.get("user_id"),
                kind,
                user_action_id,
                user_action,
                post_id: row.get("post_id"),
                read: row.get("read"),
                created_at: row.get("created_at"),
            });
        }

        Ok(notifications)
    }

    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<MarkReadOutcome> {
        let row = sqlx::query("SELECT user_id, read FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(self.db.pool())
            .await?;

        let Some(row) = row else {
            return Ok(MarkReadOutcome::NotFound);
        };

        let owner_id: Uuid = row.get("user_id");
        if owner_id != user_id {
            return Ok(MarkReadOutcome::NotOwner);
        }

        let read: bool = row.get("read");
        if read {
            return Ok(MarkReadOutcome::AlreadyRead);
        }

        sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(MarkReadOutcome::Marked)
    }
}
