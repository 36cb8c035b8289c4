use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::post::PostType;

/// Visibility mode attached to a post. Persisted as a small integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum PrivacyType {
    /// Zero value. Only seen while a post is being built.
    Unset,
    Public,
    None,
    FollowersOnly,
    FollowingOnly,
    AllBut,
    NoneBut,
    FollowersBut,
    FollowingBut,
    /// A stored code that matches no known mode.
    Unknown(i16),
}

impl PrivacyType {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::Unset,
            1 => Self::Public,
            2 => Self::None,
            3 => Self::FollowersOnly,
            4 => Self::FollowingOnly,
            5 => Self::AllBut,
            6 => Self::NoneBut,
            7 => Self::FollowersBut,
            8 => Self::FollowingBut,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::Unset => 0,
            Self::Public => 1,
            Self::None => 2,
            Self::FollowersOnly => 3,
            Self::FollowingOnly => 4,
            Self::AllBut => 5,
            Self::NoneBut => 6,
            Self::FollowersBut => 7,
            Self::FollowingBut => 8,
            Self::Unknown(code) => *code,
        }
    }

    /// Parses a caller-supplied code. Anything outside the eight named modes
    /// is rejected, including the zero value.
    pub fn from_requested(code: i64) -> Option<Self> {
        let code = i16::try_from(code).ok()?;
        let parsed = Self::from_code(code);
        parsed.is_valid().then_some(parsed)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unset | Self::Unknown(_))
    }

    /// Modes whose behaviour depends on the explicit user list.
    pub fn uses_user_list(&self) -> bool {
        matches!(
            self,
            Self::AllBut | Self::NoneBut | Self::FollowersBut | Self::FollowingBut
        )
    }
}

impl From<i16> for PrivacyType {
    fn from(code: i16) -> Self {
        Self::from_code(code)
    }
}

impl From<PrivacyType> for i16 {
    fn from(value: PrivacyType) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(rename = "type")]
    pub privacy_type: PrivacyType,
    #[serde(default)]
    pub users: Vec<Uuid>,
}

impl PrivacySettings {
    pub fn new(privacy_type: PrivacyType) -> Self {
        Self {
            privacy_type,
            users: Vec::new(),
        }
    }

    pub fn public() -> Self {
        Self::new(PrivacyType::Public)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.users.iter().any(|id| *id == user_id)
    }
}

/// An author's default privacy for each kind of post, read as a snapshot
/// whenever a post is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyDefaults {
    pub status: PrivacySettings,
    pub photo: PrivacySettings,
    pub video: PrivacySettings,
    pub link: PrivacySettings,
}

impl Default for PrivacyDefaults {
    fn default() -> Self {
        Self {
            status: PrivacySettings::public(),
            photo: PrivacySettings::public(),
            video: PrivacySettings::public(),
            link: PrivacySettings::public(),
        }
    }
}

impl PrivacyDefaults {
    pub fn for_post_type(&self, post_type: PostType) -> &PrivacySettings {
        match post_type {
            PostType::Status => &self.status,
            PostType::Photo => &self.photo,
            PostType::Video => &self.video,
            PostType::Link => &self.link,
        }
    }

    pub fn set(&mut self, post_type: PostType, settings: PrivacySettings) {
        match post_type {
            PostType::Status => self.status = settings,
            PostType::Photo => self.photo = settings,
            PostType::Video => self.video = settings,
            PostType::Link => self.link = settings,
        }
    }
}

/// Privacy requested by the client, still unvalidated.
///
/// Deserialization never fails on these fields: a type that is not an
/// integer (or an integer string) reads as absent, and user list entries
/// that are not strings are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivacyOverride {
    #[serde(default, deserialize_with = "lenient_code")]
    pub privacy_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub privacy_users: Vec<String>,
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        Value::String(text) => vec![text],
        _ => Vec::new(),
    })
}

/// Computes the privacy to persist for a new post of `post_type`.
pub fn resolve_default_privacy(
    post_type: PostType,
    defaults: &PrivacyDefaults,
    requested: Option<&PrivacyOverride>,
) -> PrivacySettings {
    resolve_privacy(defaults.for_post_type(post_type), requested)
}

/// Applies a requested privacy on top of `fallback`. Unrecognized requests
/// leave the fallback untouched; malformed user ids are dropped.
pub fn resolve_privacy(
    fallback: &PrivacySettings,
    requested: Option<&PrivacyOverride>,
) -> PrivacySettings {
    let accepted = requested.and_then(|requested| {
        requested
            .privacy_type
            .and_then(PrivacyType::from_requested)
            .map(|privacy_type| (privacy_type, requested))
    });

    match accepted {
        Some((privacy_type, requested)) => {
            let mut settings = PrivacySettings::new(privacy_type);
            if privacy_type.uses_user_list() {
                settings.users = parse_user_list(&requested.privacy_users);
            }
            settings
        }
        None if fallback.privacy_type.is_valid() => {
            let mut settings = PrivacySettings::new(fallback.privacy_type);
            if fallback.privacy_type.uses_user_list() {
                settings.users = fallback.users.clone();
            }
            settings
        }
        None => {
            tracing::warn!(
                code = fallback.privacy_type.code(),
                "stored default privacy is invalid, restricting to author"
            );
            PrivacySettings::new(PrivacyType::None)
        }
    }
}

fn parse_user_list(raw: &[String]) -> Vec<Uuid> {
    let mut users = Vec::with_capacity(raw.len());
    for value in raw {
        if let Ok(id) = Uuid::parse_str(value.trim()) {
            if !users.contains(&id) {
                users.push(id);
            }
        }
    }
    users
}
