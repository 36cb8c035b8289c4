use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::app::notifications::{ListParams, NotificationService};
use crate::app::privacy::PrivacyEvaluator;
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::notification::NotificationKind;
use crate::domain::post::{Post, PostContent, PostType, VideoService};
use crate::domain::privacy::{
    resolve_default_privacy, resolve_privacy, PrivacyOverride, PrivacySettings, PrivacyType,
};
use crate::domain::user::UserRef;
use crate::infra::db::Db;

const POST_SELECT: &str = "SELECT p.id, p.user_id, p.created_at, p.post_type, p.likes, \
        p.comments_num, p.reported, p.privacy_type, p.privacy_users, p.text, \
        p.video_service, p.video_id, p.title, p.media_id, p.photo_url, p.thumbnail, \
        p.caption, p.link_url, \
        EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = $1) AS liked \
     FROM posts p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
    NotFound,
}

#[derive(Clone)]
pub struct PostService {
    db: Db,
    evaluator: PrivacyEvaluator<SocialService>,
}

impl PostService {
    pub fn new(db: Db, lookup_timeout: Duration) -> Self {
        let evaluator = PrivacyEvaluator::new(SocialService::new(db.clone()), lookup_timeout);
        Self { db, evaluator }
    }

    /// Stores a new post. Privacy comes from `requested` when it names a
    /// valid mode, otherwise from the author's defaults for this post type.
    /// Returns `None` when a photo post references media the author does
    /// not own.
    pub async fn create_post(
        &self,
        author_id: Uuid,
        content: PostContent,
        requested: Option<&PrivacyOverride>,
    ) -> Result<Option<Post>> {
        let defaults = UserService::new(self.db.clone())
            .privacy_defaults(author_id)
            .await?
            .ok_or_else(|| anyhow!("author {} not found", author_id))?;

        let post_type = content.post_type();
        let privacy = resolve_default_privacy(post_type, &defaults, requested);

        let mut post = Post {
            id: Uuid::new_v4(),
            user_id: author_id,
            created_at: time::OffsetDateTime::now_utc(),
            post_type,
            likes: 0,
            comments_num: 0,
            reported: 0,
            privacy,
            text: None,
            video_service: None,
            video_id: None,
            title: None,
            media_id: None,
            photo_url: None,
            thumbnail: None,
            caption: None,
            link_url: None,
            liked: false,
        };

        match content {
            PostContent::Status { text } => post.text = Some(text),
            PostContent::Video {
                text,
                service,
                video_id,
            } => {
                post.text = text;
                post.video_service = Some(service);
                post.video_id = Some(video_id);
            }
            PostContent::Link { text, url, title } => {
                post.text = text;
                post.link_url = Some(url);
                post.title = Some(title);
            }
            PostContent::Photo { media_id, caption } => {
                let media = sqlx::query("SELECT owner_id, url, thumbnail_url FROM media WHERE id = $1")
                    .bind(media_id)
                    .fetch_optional(self.db.pool())
                    .await?;

                match media {
                    Some(row) if row.get::<Uuid, _>("owner_id") == author_id => {
                        post.media_id = Some(media_id);
                        post.photo_url = Some(row.get("url"));
                        post.thumbnail = Some(row.get("thumbnail_url"));
                        post.caption = caption;
                    }
                    _ => return Ok(None),
                }
            }
        }

        let created_at: time::OffsetDateTime = sqlx::query_scalar(
            "INSERT INTO posts (id, user_id, post_type, privacy_type, privacy_users, text, \
                                video_service, video_id, title, media_id, photo_url, thumbnail, \
                                caption, link_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING created_at",
        )
        .bind(post.id)
        .bind(post.user_id)
        .bind(post.post_type.as_db())
        .bind(post.privacy.privacy_type.code())
        .bind(&post.privacy.users)
        .bind(&post.text)
        .bind(post.video_service.map(|service| service.as_db()))
        .bind(&post.video_id)
        .bind(&post.title)
        .bind(post.media_id)
        .bind(&post.photo_url)
        .bind(&post.thumbnail)
        .bind(&post.caption)
        .bind(&post.link_url)
        .fetch_one(self.db.pool())
        .await?;
        post.created_at = created_at;

        tracing::info!(
            post_id = %post.id,
            user_id = %author_id,
            privacy = post.privacy.privacy_type.code(),
            "post created"
        );

        Ok(Some(post))
    }

    /// Fetches a post the viewer is allowed to see.
    pub async fn get_post(&self, post_id: Uuid, viewer: Option<UserRef>) -> Result<Option<Post>> {
        let post = self.find_post(post_id, viewer.map(|viewer| viewer.id)).await?;
        let Some(post) = post else {
            return Ok(None);
        };

        let visible = match viewer {
            Some(viewer) => self.evaluator.can_access(&post, &viewer).await,
            None => self.evaluator.can_access_anonymous(&post),
        };

        Ok(visible.then_some(post))
    }

    /// Posts by `author_id`, newest first, restricted to what the viewer may see.
    pub async fn list_by_user(
        &self,
        author_id: Uuid,
        viewer: Option<UserRef>,
        params: ListParams,
    ) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.user_id = $2 \
             ORDER BY p.created_at DESC, p.id DESC \
             LIMIT $3 OFFSET $4",
            POST_SELECT
        ))
        .bind(viewer.map(|viewer| viewer.id))
        .bind(author_id)
        .bind(params.count)
        .bind(params.offset)
        .fetch_all(self.db.pool())
        .await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            posts.push(post_from_row(row)?);
        }

        Ok(self.evaluator.filter_visible(posts, viewer.as_ref()).await)
    }

    /// Changes the privacy of a post owned by `author_id`. The current
    /// settings stay in place when the request does not name a valid mode.
    pub async fn update_privacy(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        requested: &PrivacyOverride,
    ) -> Result<Option<Post>> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT privacy_type, privacy_users FROM posts \
             WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(post_id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let current = PrivacySettings {
            privacy_type: PrivacyType::from_code(row.get("privacy_type")),
            users: row.get("privacy_users"),
        };
        let resolved = resolve_privacy(&current, Some(requested));

        sqlx::query("UPDATE posts SET privacy_type = $2, privacy_users = $3 WHERE id = $1")
            .bind(post_id)
            .bind(resolved.privacy_type.code())
            .bind(&resolved.users)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_post(post_id, Some(author_id)).await
    }

    pub async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(author_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn like_post(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome> {
        let Some(post) = self.get_post(post_id, Some(UserRef::new(user_id))).await? else {
            return Ok(LikeOutcome::NotFound);
        };

        let mut tx = self.db.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(LikeOutcome::AlreadyLiked);
        }

        sqlx::query("UPDATE posts SET likes = likes + 1 WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        if post.user_id != user_id {
            NotificationService::create_with_tx(
                &mut tx,
                post.user_id,
                NotificationKind::PostLiked,
                user_id,
                Some(post_id),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(LikeOutcome::Liked)
    }

    pub async fn unlike_post(&self, post_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE posts SET likes = GREATEST(likes - 1, 0) WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn find_post(&self, post_id: Uuid, viewer_id: Option<Uuid>) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE p.id = $2", POST_SELECT))
            .bind(viewer_id)
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let post_type: i16 = row.get("post_type");
    let post_type =
        PostType::from_db(post_type).ok_or_else(|| anyhow!("unknown post type: {}", post_type))?;

    let video_service: Option<String> = row.get("video_service");
    let video_service = match video_service {
        Some(value) => Some(
            VideoService::from_db(&value)
                .ok_or_else(|| anyhow!("unknown video service: {}", value))?,
        ),
        None => None,
    };

    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        post_type,
        likes: row.get("likes"),
        comments_num: row.get("comments_num"),
        reported: row.get("reported"),
        privacy: PrivacySettings {
            privacy_type: PrivacyType::from_code(row.get("privacy_type")),
            users: row.get("privacy_users"),
        },
        text: row.get("text"),
        video_service,
        video_id: row.get("video_id"),
        title: row.get("title"),
        media_id: row.get("media_id"),
        photo_url: row.get("photo_url"),
        thumbnail: row.get("thumbnail"),
        caption: row.get("caption"),
        link_url: row.get("link_url"),
        liked: row.get("liked"),
    })
}
