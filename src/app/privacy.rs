use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use crate::domain::post::Post;
use crate::domain::privacy::PrivacyType;
use crate::domain::user::UserRef;

/// Answers follow-relationship queries against persisted social graph data.
#[async_trait]
pub trait RelationshipOracle: Send + Sync {
    /// Whether `follower_id` follows `followee_id`.
    async fn follows(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
}

#[async_trait]
impl<T: RelationshipOracle + ?Sized> RelationshipOracle for std::sync::Arc<T> {
    async fn follows(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        (**self).follows(follower_id, followee_id).await
    }
}

/// Decides whether a viewer may see a post.
///
/// Evaluation never fails: relationship lookups that error out or exceed
/// `lookup_timeout` count as "not following", so every ambiguous case
/// resolves to a denial.
#[derive(Clone)]
pub struct PrivacyEvaluator<O> {
    oracle: O,
    lookup_timeout: Duration,
}

impl<O: RelationshipOracle> PrivacyEvaluator<O> {
    pub fn new(oracle: O, lookup_timeout: Duration) -> Self {
        Self {
            oracle,
            lookup_timeout,
        }
    }

    pub async fn can_access(&self, post: &Post, viewer: &UserRef) -> bool {
        let author_id = post.user_id;
        if viewer.id == author_id {
            return true;
        }

        let privacy = &post.privacy;
        let in_list = privacy.contains(viewer.id);

        match privacy.privacy_type {
            PrivacyType::Public => true,
            PrivacyType::None => false,
            PrivacyType::FollowersOnly => self.follows(viewer.id, author_id).await,
            PrivacyType::FollowingOnly => self.follows(author_id, viewer.id).await,
            PrivacyType::AllBut => !in_list,
            PrivacyType::NoneBut => in_list,
            PrivacyType::FollowersBut => !in_list && self.follows(viewer.id, author_id).await,
            PrivacyType::FollowingBut => !in_list && self.follows(author_id, viewer.id).await,
            PrivacyType::Unset | PrivacyType::Unknown(_) => {
                tracing::warn!(
                    post_id = %post.id,
                    code = privacy.privacy_type.code(),
                    "post has no valid privacy type, denying access"
                );
                false
            }
        }
    }

    /// Visibility for a request with no authenticated user.
    pub fn can_access_anonymous(&self, post: &Post) -> bool {
        post.privacy.privacy_type == PrivacyType::Public
    }

    /// Keeps the posts `viewer` may see, in their original order.
    pub async fn filter_visible(&self, posts: Vec<Post>, viewer: Option<&UserRef>) -> Vec<Post> {
        let Some(viewer) = viewer else {
            return posts
                .into_iter()
                .filter(|post| self.can_access_anonymous(post))
                .collect();
        };

        let decisions = join_all(posts.iter().map(|post| self.can_access(post, viewer))).await;
        posts
            .into_iter()
            .zip(decisions)
            .filter_map(|(post, visible)| visible.then_some(post))
            .collect()
    }

    async fn follows(&self, follower_id: Uuid, followee_id: Uuid) -> bool {
        match tokio::time::timeout(
            self.lookup_timeout,
            self.oracle.follows(follower_id, followee_id),
        )
        .await
        {
            Ok(Ok(follows)) => follows,
            Ok(Err(err)) => {
                tracing::warn!(
                    error = ?err,
                    follower_id = %follower_id,
                    followee_id = %followee_id,
                    "relationship lookup failed, treating as not following"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    follower_id = %follower_id,
                    followee_id = %followee_id,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "relationship lookup timed out, treating as not following"
                );
                false
            }
        }
    }
}
