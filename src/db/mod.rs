use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{
    Advertisement, Comment, ContentEntry, ContentKind, Friendship, FriendshipStatus, Profile,
    VoiceMessage,
};

/// RFC 3339 timestamp with fixed precision so rows sort lexicographically
fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            thumbnail_url TEXT,
            type TEXT NOT NULL,              -- movie, series
            duration INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
            is_featured INTEGER NOT NULL DEFAULT 0,
            category TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS ads (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            thumbnail_url TEXT,
            video_url TEXT,
            duration INTEGER,
            is_skippable INTEGER NOT NULL DEFAULT 0,
            skip_after_seconds INTEGER,
            cta_text TEXT,
            cta_url TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL REFERENCES content(id) ON DELETE CASCADE,
            username TEXT NOT NULL,
            comment TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            avatar_url TEXT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT
        );

        -- One row per direction-agnostic pair, keyed by the requester
        CREATE TABLE IF NOT EXISTS friendships (
            user_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',  -- pending, accepted
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS voice_messages (
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            audio BLOB NOT NULL,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create schema")?;

    create_indexes(pool).await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Browsing: newest first, filtered by type / featured / category
        "CREATE INDEX IF NOT EXISTS idx_content_created ON content(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_content_type ON content(type)",
        "CREATE INDEX IF NOT EXISTS idx_content_featured ON content(is_featured) WHERE is_featured = 1",
        "CREATE INDEX IF NOT EXISTS idx_content_category ON content(category)",
        // Ad pool is fetched newest first
        "CREATE INDEX IF NOT EXISTS idx_ads_created ON ads(created_at)",
        // Comments for a content item
        "CREATE INDEX IF NOT EXISTS idx_comments_content ON comments(content_id, created_at)",
        // Reverse lookup for friend requests addressed to a user
        "CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id)",
        // At most one row per pair, whoever asked first
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair \
         ON friendships(min(user_id, friend_id), max(user_id, friend_id))",
        "CREATE INDEX IF NOT EXISTS idx_voice_recipient ON voice_messages(recipient_id, created_at)",
    ];

    for sql in indexes {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create index: {}", sql))?;
    }

    Ok(())
}

// =========================================
// Content
// =========================================

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub kind: Option<ContentKind>,
    pub featured: Option<bool>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub kind: ContentKind,
    pub duration: i64,
    pub is_featured: bool,
    pub category: Option<String>,
}

/// List content newest first
pub async fn list_content(pool: &SqlitePool, filter: &ContentFilter) -> Result<Vec<ContentEntry>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, title, thumbnail_url, type, duration, views, is_featured, category, created_at \
         FROM content WHERE 1 = 1",
    );

    if let Some(kind) = filter.kind {
        qb.push(" AND type = ").push_bind(kind.as_str());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND is_featured = ").push_bind(featured);
    }
    if let Some(ref category) = filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }

    qb.push(" ORDER BY created_at DESC, rowid DESC");

    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit.max(0));
    }

    let rows = qb.build_query_as::<ContentEntry>().fetch_all(pool).await?;
    Ok(rows)
}

pub async fn get_content(pool: &SqlitePool, id: &str) -> Result<Option<ContentEntry>> {
    let row = sqlx::query_as::<_, ContentEntry>(
        "SELECT id, title, thumbnail_url, type, duration, views, is_featured, category, created_at \
         FROM content WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn insert_content(pool: &SqlitePool, new: &NewContent) -> Result<ContentEntry> {
    let id = Uuid::new_v4().to_string();
    let created_at = now();

    sqlx::query(
        "INSERT INTO content (id, title, thumbnail_url, type, duration, views, is_featured, category, created_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.title)
    .bind(&new.thumbnail_url)
    .bind(new.kind.as_str())
    .bind(new.duration)
    .bind(new.is_featured)
    .bind(&new.category)
    .bind(&created_at)
    .execute(pool)
    .await?;

    get_content(pool, &id)
        .await?
        .context("Inserted content row disappeared")
}

/// Returns the updated row, or None if the id does not exist
pub async fn update_content(
    pool: &SqlitePool,
    id: &str,
    new: &NewContent,
) -> Result<Option<ContentEntry>> {
    let result = sqlx::query(
        "UPDATE content SET title = ?, thumbnail_url = ?, type = ?, duration = ?, is_featured = ?, category = ? \
         WHERE id = ?",
    )
    .bind(&new.title)
    .bind(&new.thumbnail_url)
    .bind(new.kind.as_str())
    .bind(new.duration)
    .bind(new.is_featured)
    .bind(&new.category)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_content(pool, id).await
}

pub async fn delete_content(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM content WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Write `last_known + 1` as the new view count and return what the store
/// now holds. Errors if the content row no longer exists.
pub async fn increment_views(pool: &SqlitePool, id: &str, last_known: i64) -> Result<i64> {
    let views: Option<i64> =
        sqlx::query_scalar("UPDATE content SET views = ? WHERE id = ? RETURNING views")
            .bind(last_known.max(0) + 1)
            .bind(id)
            .fetch_optional(pool)
            .await?;

    views.with_context(|| format!("Content {} not found", id))
}

// =========================================
// Ads
// =========================================

#[derive(Debug, Clone)]
pub struct NewAd {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    pub is_skippable: bool,
    pub skip_after_seconds: Option<i64>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
}

/// Fetch a bounded ad pool, newest first
pub async fn list_ads(pool: &SqlitePool, limit: i64) -> Result<Vec<Advertisement>> {
    let rows = sqlx::query_as::<_, Advertisement>(
        "SELECT id, title, description, thumbnail_url, video_url, duration, is_skippable, \
         skip_after_seconds, cta_text, cta_url, created_at \
         FROM ads ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_ad(pool: &SqlitePool, id: &str) -> Result<Option<Advertisement>> {
    let row = sqlx::query_as::<_, Advertisement>(
        "SELECT id, title, description, thumbnail_url, video_url, duration, is_skippable, \
         skip_after_seconds, cta_text, cta_url, created_at FROM ads WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn insert_ad(pool: &SqlitePool, new: &NewAd) -> Result<Advertisement> {
    let id = Uuid::new_v4().to_string();
    let created_at = now();

    sqlx::query(
        "INSERT INTO ads (id, title, description, thumbnail_url, video_url, duration, is_skippable, \
         skip_after_seconds, cta_text, cta_url, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.thumbnail_url)
    .bind(&new.video_url)
    .bind(new.duration)
    .bind(new.is_skippable)
    .bind(new.skip_after_seconds)
    .bind(&new.cta_text)
    .bind(&new.cta_url)
    .bind(&created_at)
    .execute(pool)
    .await?;

    get_ad(pool, &id).await?.context("Inserted ad row disappeared")
}

pub async fn update_ad(pool: &SqlitePool, id: &str, new: &NewAd) -> Result<Option<Advertisement>> {
    let result = sqlx::query(
        "UPDATE ads SET title = ?, description = ?, thumbnail_url = ?, video_url = ?, duration = ?, \
         is_skippable = ?, skip_after_seconds = ?, cta_text = ?, cta_url = ? WHERE id = ?",
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.thumbnail_url)
    .bind(&new.video_url)
    .bind(new.duration)
    .bind(new.is_skippable)
    .bind(new.skip_after_seconds)
    .bind(&new.cta_text)
    .bind(&new.cta_url)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_ad(pool, id).await
}

pub async fn delete_ad(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM ads WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =========================================
// Comments
// =========================================

/// Comments for a content item, newest first
pub async fn list_comments(
    pool: &SqlitePool,
    content_id: &str,
    limit: i64,
) -> Result<Vec<Comment>> {
    let rows = sqlx::query_as::<_, Comment>(
        "SELECT id, content_id, username, comment, created_at FROM comments \
         WHERE content_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(content_id)
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_comment(
    pool: &SqlitePool,
    content_id: &str,
    username: &str,
    comment: &str,
) -> Result<Comment> {
    let row = Comment {
        id: Uuid::new_v4().to_string(),
        content_id: content_id.to_string(),
        username: username.to_string(),
        comment: comment.to_string(),
        created_at: now(),
    };

    sqlx::query(
        "INSERT INTO comments (id, content_id, username, comment, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.content_id)
    .bind(&row.username)
    .bind(&row.comment)
    .bind(&row.created_at)
    .execute(pool)
    .await?;

    Ok(row)
}

// =========================================
// Profiles and friendships
// =========================================

pub async fn get_profile(pool: &SqlitePool, id: &str) -> Result<Option<Profile>> {
    let row = sqlx::query_as::<_, Profile>(
        "SELECT id, avatar_url, username, display_name FROM profiles WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Create or replace a profile. Returns false, changing nothing, when the
/// username belongs to another profile.
pub async fn upsert_profile(pool: &SqlitePool, profile: &Profile) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO profiles (id, avatar_url, username, display_name)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            avatar_url = excluded.avatar_url,
            username = excluded.username,
            display_name = excluded.display_name
        "#,
    )
    .bind(&profile.id)
    .bind(&profile.avatar_url)
    .bind(&profile.username)
    .bind(&profile.display_name)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// All friendships touching a user, in either direction
pub async fn list_friendships(pool: &SqlitePool, user_id: &str) -> Result<Vec<Friendship>> {
    let rows = sqlx::query_as::<_, Friendship>(
        "SELECT user_id, friend_id, status, created_at FROM friendships \
         WHERE user_id = ? OR friend_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Record a pending request. Returns false if the pair already exists in
/// either direction.
pub async fn insert_friend_request(
    pool: &SqlitePool,
    user_id: &str,
    friend_id: &str,
) -> Result<bool> {
    // idx_friendships_pair rejects the reverse direction in the same statement
    let result = sqlx::query(
        "INSERT OR IGNORE INTO friendships (user_id, friend_id, status, created_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(friend_id)
    .bind(FriendshipStatus::Pending.as_str())
    .bind(now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Accept a pending request sent by `requester_id` to `user_id`
pub async fn accept_friend_request(
    pool: &SqlitePool,
    user_id: &str,
    requester_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE friendships SET status = ? WHERE user_id = ? AND friend_id = ? AND status = ?",
    )
    .bind(FriendshipStatus::Accepted.as_str())
    .bind(requester_id)
    .bind(user_id)
    .bind(FriendshipStatus::Pending.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_friendship(pool: &SqlitePool, user_id: &str, friend_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM friendships WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)",
    )
    .bind(user_id)
    .bind(friend_id)
    .bind(friend_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// =========================================
// Voice messages
// =========================================

pub async fn insert_voice_message(
    pool: &SqlitePool,
    sender_id: &str,
    recipient_id: &str,
    audio: &[u8],
    duration_seconds: i64,
) -> Result<VoiceMessage> {
    let row = VoiceMessage {
        id: Uuid::new_v4().to_string(),
        sender_id: sender_id.to_string(),
        recipient_id: recipient_id.to_string(),
        audio: audio.to_vec(),
        duration_seconds,
        created_at: now(),
    };

    sqlx::query(
        "INSERT INTO voice_messages (id, sender_id, recipient_id, audio, duration_seconds, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.sender_id)
    .bind(&row.recipient_id)
    .bind(&row.audio)
    .bind(row.duration_seconds)
    .bind(&row.created_at)
    .execute(pool)
    .await?;

    Ok(row)
}

/// Messages sent to or by a user, newest first
pub async fn list_voice_messages(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<VoiceMessage>> {
    let rows = sqlx::query_as::<_, VoiceMessage>(
        "SELECT id, sender_id, recipient_id, audio, duration_seconds, created_at FROM voice_messages \
         WHERE recipient_id = ? OR sender_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Single-connection in-memory database with the schema applied
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
