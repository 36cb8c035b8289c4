use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::app::content;
use crate::app::media::{process_image, MediaService};
use crate::app::notifications::{ListParams, MarkReadOutcome, NotificationService};
use crate::app::posts::{LikeOutcome, PostService};
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::media::Media;
use crate::domain::notification::Notification;
use crate::domain::post::{Post, PostContent, PostType};
use crate::domain::privacy::{PrivacyDefaults, PrivacyOverride};
use crate::domain::user::PublicUser;
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub count: Option<String>,
    pub offset: Option<String>,
}

impl ListQuery {
    fn params(&self) -> ListParams {
        ListParams::from_query(self.count.as_deref(), self.offset.as_deref())
    }
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

fn post_service(state: &AppState) -> PostService {
    PostService::new(state.db.clone(), state.relationship_lookup_timeout)
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|err| err.as_database_error())
        .map(|err| err.is_unique_violation())
        .unwrap_or(false)
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    const MIN_PASSWORD_LEN: usize = 8;
    const MAX_PASSWORD_LEN: usize = 128;

    let username = payload.username.trim().to_string();
    let valid_username = (3..=30).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_username {
        return Err(AppError::bad_request(
            "username must be 3-30 letters, digits or underscores",
        ));
    }

    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(AppError::bad_request("invalid email"));
    }

    if payload.password.len() < MIN_PASSWORD_LEN || payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "password must be between 8 and 128 characters",
        ));
    }

    let display_name = payload
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| username.clone());
    if display_name.chars().count() > 50 {
        return Err(AppError::bad_request(
            "display_name must be at most 50 characters",
        ));
    }

    let service = AuthService::new(state.db.clone(), state.token_ttl_hours);
    let user = service
        .signup(username, email, display_name, payload.password)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                return AppError::conflict("username or email already taken");
            }
            tracing::error!(error = ?err, "failed to create user");
            AppError::internal("failed to create user")
        })?;

    Ok((StatusCode::CREATED, Json(PublicUser::from(user))))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if payload.identifier.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("identifier and password are required"));
    }

    let service = AuthService::new(state.db.clone(), state.token_ttl_hours);
    let token = service
        .login(payload.identifier.trim(), &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match token {
        Some(token) => Ok(Json(LoginResponse {
            access_token: token.token,
            expires_at: token.expires_at,
        })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

pub async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = AuthService::new(state.db.clone(), state.token_ttl_hours);
    service.revoke(&auth.token).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to revoke token");
        AppError::internal("failed to revoke token")
    })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PublicUser>, AppError> {
    let user = UserService::new(state.db.clone())
        .get_user(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to fetch user");
            AppError::internal("failed to fetch user")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let counts = SocialService::new(state.db.clone())
        .counts(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to count follows");
            AppError::internal("failed to fetch user")
        })?;

    let mut user = PublicUser::from(user);
    user.followers_count = counts.followers;
    user.following_count = counts.following;

    Ok(Json(user))
}

pub async fn list_user_posts(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<Post>>, AppError> {
    let viewer = auth.as_ref().map(AuthUser::viewer);
    let posts = post_service(&state)
        .list_by_user(id, viewer, query.params())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    Ok(Json(ListResponse::from(posts)))
}

async fn ensure_user_exists(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    let user = UserService::new(state.db.clone())
        .get_user(user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to fetch user");
            AppError::internal("failed to fetch user")
        })?;

    match user {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("user not found")),
    }
}

pub async fn follow_user(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    if auth.user_id == id {
        return Err(AppError::bad_request("cannot follow yourself"));
    }
    ensure_user_exists(&state, id).await?;

    SocialService::new(state.db.clone())
        .follow(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, follower_id = %auth.user_id, followee_id = %id, "failed to follow");
            AppError::internal("failed to follow user")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let removed = SocialService::new(state.db.clone())
        .unfollow(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, follower_id = %auth.user_id, followee_id = %id, "failed to unfollow");
            AppError::internal("failed to unfollow user")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("not following user"))
    }
}

pub async fn get_privacy_defaults(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PrivacyDefaults>, AppError> {
    let defaults = UserService::new(state.db.clone())
        .privacy_defaults(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to load privacy defaults");
            AppError::internal("failed to load privacy settings")
        })?;

    defaults
        .map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[derive(Deserialize)]
pub struct UpdatePrivacyDefaultRequest {
    pub post_type: String,
    #[serde(flatten)]
    pub privacy: PrivacyOverride,
}

pub async fn update_privacy_default(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePrivacyDefaultRequest>,
) -> Result<Json<PrivacyDefaults>, AppError> {
    let post_type = PostType::from_name(payload.post_type.trim())
        .ok_or_else(|| AppError::bad_request("invalid post_type"))?;

    let defaults = UserService::new(state.db.clone())
        .update_privacy_default(auth.user_id, post_type, &payload.privacy)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to update privacy defaults");
            AppError::internal("failed to update privacy settings")
        })?;

    defaults
        .map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub post_type: Option<String>,
    pub text: Option<String>,
    pub video_url: Option<String>,
    pub link_url: Option<String>,
    pub title: Option<String>,
    pub media_id: Option<String>,
    pub caption: Option<String>,
    #[serde(flatten)]
    pub privacy: PrivacyOverride,
}

fn post_content(payload: &CreatePostRequest) -> Result<PostContent, AppError> {
    // Unknown post types are treated as plain status updates.
    let post_type = payload
        .post_type
        .as_deref()
        .and_then(|value| PostType::from_name(value.trim()))
        .unwrap_or(PostType::Status);

    let too_long = |_| AppError::bad_request("text must be at most 1500 characters");

    match post_type {
        PostType::Status => {
            let text = content::status_text(payload.text.as_deref().unwrap_or(""))
                .ok_or_else(|| AppError::bad_request("invalid status text"))?;
            Ok(PostContent::Status { text })
        }
        PostType::Video => {
            let (service, video_id) = payload
                .video_url
                .as_deref()
                .and_then(content::parse_video_url)
                .ok_or_else(|| AppError::bad_request("invalid video url"))?;
            Ok(PostContent::Video {
                text: content::optional_text(payload.text.as_deref()).map_err(too_long)?,
                service,
                video_id,
            })
        }
        PostType::Link => {
            let url = payload
                .link_url
                .as_deref()
                .and_then(content::link_url)
                .ok_or_else(|| AppError::bad_request("invalid link url"))?;
            Ok(PostContent::Link {
                text: content::optional_text(payload.text.as_deref()).map_err(too_long)?,
                url,
                title: content::link_title(payload.title.as_deref()),
            })
        }
        PostType::Photo => {
            let media_id = payload
                .media_id
                .as_deref()
                .and_then(|value| Uuid::parse_str(value.trim()).ok())
                .ok_or_else(|| AppError::bad_request("invalid media_id"))?;
            Ok(PostContent::Photo {
                media_id,
                caption: content::optional_text(payload.caption.as_deref()).map_err(|_| {
                    AppError::bad_request("caption must be at most 1500 characters")
                })?,
            })
        }
    }
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let content = post_content(&payload)?;
    let post = post_service(&state)
        .create_post(auth.user_id, content, Some(&payload.privacy))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    match post {
        Some(post) => Ok((StatusCode::CREATED, Json(post))),
        None => Err(AppError::bad_request("invalid media_id")),
    }
}

pub async fn get_post(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Post>, AppError> {
    let viewer = auth.as_ref().map(AuthUser::viewer);
    let post = post_service(&state).get_post(id, viewer).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    // Hidden posts are indistinguishable from missing ones.
    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn update_post_privacy(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PrivacyOverride>,
) -> Result<Json<Post>, AppError> {
    let post = post_service(&state)
        .update_privacy(id, auth.user_id, &payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to update post privacy");
            AppError::internal("failed to update post")
        })?;

    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn delete_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let deleted = post_service(&state)
        .delete_post(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to delete post");
            AppError::internal("failed to delete post")
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn like_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let outcome = post_service(&state)
        .like_post(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, user_id = %auth.user_id, "failed to like post");
            AppError::internal("failed to like post")
        })?;

    match outcome {
        LikeOutcome::Liked | LikeOutcome::AlreadyLiked => Ok(StatusCode::NO_CONTENT),
        LikeOutcome::NotFound => Err(AppError::not_found("post not found")),
    }
}

pub async fn unlike_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let removed = post_service(&state)
        .unlike_post(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, user_id = %auth.user_id, "failed to unlike post");
            AppError::internal("failed to unlike post")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("like not found"))
    }
}

pub async fn upload_photo(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Media>), AppError> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("invalid multipart body"))?
    {
        if field.name() == Some("photo") {
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::payload_too_large("file too large"))?;
            data = Some(bytes);
            break;
        }
    }

    let data = data.ok_or_else(|| AppError::bad_request("no file was uploaded"))?;
    let options = state.upload_options;
    let image = tokio::task::spawn_blocking(move || process_image(&data, &options))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "image processing task failed");
            AppError::internal("failed to process image")
        })??;

    let service = MediaService::new(state.db.clone(), state.storage.clone());
    let media = service.store_photo(auth.user_id, image).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to store photo");
        AppError::internal("failed to store photo")
    })?;

    Ok((StatusCode::CREATED, Json(media)))
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let notifications = NotificationService::new(state.db.clone())
        .list(auth.user_id, query.params())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    Ok(Json(ListResponse::from(notifications)))
}

pub async fn mark_notification_read(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let outcome = NotificationService::new(state.db.clone())
        .mark_read(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to mark notification read");
            AppError::internal("failed to mark notification read")
        })?;

    match outcome {
        MarkReadOutcome::Marked | MarkReadOutcome::AlreadyRead => Ok(StatusCode::NO_CONTENT),
        MarkReadOutcome::NotFound => Err(AppError::not_found("notification not found")),
        MarkReadOutcome::NotOwner => Err(AppError::forbidden("notification belongs to another user")),
    }
}
