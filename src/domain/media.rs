use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(skip_serializing)]
    pub original_key: String,
    #[serde(skip_serializing)]
    pub thumb_key: String,
    pub url: String,
    pub thumbnail_url: String,
    pub width: i32,
    pub height: i32,
    pub bytes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
