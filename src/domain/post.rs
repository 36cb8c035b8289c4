use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::privacy::PrivacySettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub post_type: PostType,
    pub likes: i64,
    pub comments_num: i64,
    pub reported: i64,
    pub privacy: PrivacySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_service: Option<VideoService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Video or link title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,

    /// Whether the requesting user liked the post (populated at response time)
    #[serde(default)]
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Status,
    Photo,
    Video,
    Link,
}

impl PostType {
    pub fn from_db(value: i16) -> Option<Self> {
        match value {
            1 => Some(Self::Status),
            2 => Some(Self::Photo),
            3 => Some(Self::Video),
            4 => Some(Self::Link),
            _ => None,
        }
    }

    pub fn as_db(&self) -> i16 {
        match self {
            Self::Status => 1,
            Self::Photo => 2,
            Self::Video => 3,
            Self::Link => 4,
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "status" => Some(Self::Status),
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoService {
    Youtube,
    Vimeo,
}

impl VideoService {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "youtube" => Some(Self::Youtube),
            "vimeo" => Some(Self::Vimeo),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Vimeo => "vimeo",
        }
    }
}

/// Type-specific content of a post about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostContent {
    Status {
        text: String,
    },
    Video {
        text: Option<String>,
        service: VideoService,
        video_id: String,
    },
    Link {
        text: Option<String>,
        url: String,
        title: String,
    },
    Photo {
        media_id: Uuid,
        caption: Option<String>,
    },
}

impl PostContent {
    pub fn post_type(&self) -> PostType {
        match self {
            Self::Status { .. } => PostType::Status,
            Self::Video { .. } => PostType::Video,
            Self::Link { .. } => PostType::Link,
            Self::Photo { .. } => PostType::Photo,
        }
    }
}
