use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ContentEntry {
    pub id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    /// "movie" or "series"
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub content_type: String,
    /// Runtime in seconds
    pub duration: i64,
    pub views: i64,
    pub is_featured: bool,
    pub category: Option<String>,
    pub created_at: String,
}

impl ContentEntry {
    pub fn kind(&self) -> Option<ContentKind> {
        ContentKind::from_str(&self.content_type)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Series => "series",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Some(ContentKind::Movie),
            "series" => Some(ContentKind::Series),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Advertisement {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    /// Seconds, only meaningful for video ads
    pub duration: Option<i64>,
    pub is_skippable: bool,
    /// Only meaningful when `is_skippable` is set
    pub skip_after_seconds: Option<i64>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
    pub created_at: String,
}

/// How an ad is presented: a playable video, or a static image banner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AdKind {
    Video,
    Banner,
}

impl Advertisement {
    /// Classify the ad from its media references. A playable video URL wins
    /// over an image; an ad with neither is never shown.
    pub fn kind(&self) -> Option<AdKind> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        if present(&self.video_url) {
            Some(AdKind::Video)
        } else if present(&self.thumbnail_url) {
            Some(AdKind::Banner)
        } else {
            None
        }
    }

    /// Seconds before the skip button unlocks, if the ad can be skipped at all
    pub fn skip_after(&self) -> Option<i64> {
        if self.is_skippable {
            Some(self.skip_after_seconds.unwrap_or(0).max(0))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub content_id: String,
    pub username: String,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Friendship {
    pub user_id: String,
    pub friend_id: String,
    /// "pending" or "accepted"
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "pending",
            FriendshipStatus::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub avatar_url: Option<String>,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VoiceMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(skip_serializing)]
    pub audio: Vec<u8>,
    pub duration_seconds: i64,
    pub created_at: String,
}
