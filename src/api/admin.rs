// Admin console: content and ad CRUD

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{self, ContentFilter, NewAd, NewContent};
use crate::error::{ApiResult, AppError};
use crate::models::{Advertisement, ContentEntry, ContentKind};
use crate::services::media_probe::{is_image_url, is_valid_url, is_video_url};
use crate::services::notify::{Notification, Notified};
use crate::AppState;

use super::page_limit;

const ADMIN_PAGE_SIZE: i64 = 100;
const ADMIN_MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ContentForm {
    #[serde(default)]
    pub title: String,
    pub thumbnail_url: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub is_featured: bool,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdForm {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    #[serde(default)]
    pub is_skippable: bool,
    pub skip_after_seconds: Option<i64>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
}

/// Trim and drop empty optional text
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_url(field: &str, value: &Option<String>) -> ApiResult<()> {
    match value {
        Some(url) if !is_valid_url(url) => Err(AppError::validation(format!(
            "{} must be an http(s) URL",
            field
        ))),
        _ => Ok(()),
    }
}

impl ContentForm {
    fn validate(self) -> ApiResult<NewContent> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }

        let kind = ContentKind::from_str(self.content_type.trim())
            .ok_or_else(|| AppError::validation("Type must be 'movie' or 'series'"))?;

        if self.duration < 0 {
            return Err(AppError::validation("Duration cannot be negative"));
        }

        let thumbnail_url = optional(self.thumbnail_url);
        check_url("Thumbnail URL", &thumbnail_url)?;

        Ok(NewContent {
            title,
            thumbnail_url,
            kind,
            duration: self.duration,
            is_featured: self.is_featured,
            category: optional(self.category),
        })
    }
}

impl AdForm {
    fn validate(self) -> ApiResult<NewAd> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }

        let thumbnail_url = optional(self.thumbnail_url);
        let video_url = optional(self.video_url);
        let cta_url = optional(self.cta_url);

        if thumbnail_url.is_none() && video_url.is_none() {
            return Err(AppError::validation(
                "An ad needs a video URL or a thumbnail URL",
            ));
        }
        if let Some(url) = &thumbnail_url {
            if !is_image_url(url) {
                return Err(AppError::validation("Thumbnail URL must point to an image"));
            }
        }
        check_url("CTA URL", &cta_url)?;
        if let Some(url) = &video_url {
            if !is_video_url(url) {
                return Err(AppError::validation("Video URL must point to a video file"));
            }
        }

        if self.duration.is_some_and(|d| d < 0) {
            return Err(AppError::validation("Duration cannot be negative"));
        }
        if self.skip_after_seconds.is_some_and(|s| s < 0) {
            return Err(AppError::validation("Skip delay cannot be negative"));
        }

        Ok(NewAd {
            title,
            description: optional(self.description),
            // Duration only applies to video ads
            duration: video_url.as_ref().and(self.duration),
            thumbnail_url,
            video_url,
            is_skippable: self.is_skippable,
            skip_after_seconds: if self.is_skippable {
                self.skip_after_seconds
            } else {
                None
            },
            cta_text: optional(self.cta_text),
            cta_url,
        })
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/Content", get(list_content).post(create_content))
        .route("/Content/:id", put(update_content).delete(delete_content))
        .route("/Ads", get(list_ads).post(create_ad))
        .route("/Ads/:id", put(update_ad).delete(delete_ad))
}

/// GET /Admin/Content
async fn list_content(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<Vec<ContentEntry>>> {
    let filter = ContentFilter {
        limit: Some(page_limit(query.limit, ADMIN_PAGE_SIZE, ADMIN_MAX_PAGE_SIZE)),
        ..Default::default()
    };
    Ok(Json(db::list_content(&state.db, &filter).await?))
}

/// POST /Admin/Content
async fn create_content(
    State(state): State<Arc<AppState>>,
    Json(form): Json<ContentForm>,
) -> ApiResult<(StatusCode, Json<Notified<ContentEntry>>)> {
    let new = form.validate()?;
    let entry = db::insert_content(&state.db, &new).await?;
    tracing::info!("Content '{}' created ({})", entry.title, entry.id);

    Ok((
        StatusCode::CREATED,
        Json(Notified::new(
            entry,
            Notification::success("Content created", "The content entry has been added"),
        )),
    ))
}

/// PUT /Admin/Content/{id}
async fn update_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(form): Json<ContentForm>,
) -> ApiResult<Json<Notified<ContentEntry>>> {
    let new = form.validate()?;
    let entry = db::update_content(&state.db, &id, &new)
        .await?
        .ok_or_else(|| AppError::not_found("Content"))?;
    tracing::info!("Content '{}' updated ({})", entry.title, entry.id);

    Ok(Json(Notified::new(
        entry,
        Notification::success("Content updated", "Your changes have been saved"),
    )))
}

/// DELETE /Admin/Content/{id}
async fn delete_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    if !db::delete_content(&state.db, &id).await? {
        return Err(AppError::not_found("Content"));
    }
    tracing::info!("Content {} deleted", id);
    Ok(Json(Notification::success("Content deleted", "The content entry has been removed")))
}

/// GET /Admin/Ads
async fn list_ads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<Vec<Advertisement>>> {
    let limit = page_limit(query.limit, ADMIN_PAGE_SIZE, ADMIN_MAX_PAGE_SIZE);
    Ok(Json(db::list_ads(&state.db, limit).await?))
}

/// POST /Admin/Ads
async fn create_ad(
    State(state): State<Arc<AppState>>,
    Json(form): Json<AdForm>,
) -> ApiResult<(StatusCode, Json<Notified<Advertisement>>)> {
    let new = form.validate()?;
    let ad = db::insert_ad(&state.db, &new).await?;
    tracing::info!("Ad '{}' created ({:?}, {})", ad.title, ad.kind(), ad.id);

    Ok((
        StatusCode::CREATED,
        Json(Notified::new(
            ad,
            Notification::success("Ad created", "The advertisement has been added"),
        )),
    ))
}

/// PUT /Admin/Ads/{id}
async fn update_ad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(form): Json<AdForm>,
) -> ApiResult<Json<Notified<Advertisement>>> {
    let new = form.validate()?;
    let ad = db::update_ad(&state.db, &id, &new)
        .await?
        .ok_or_else(|| AppError::not_found("Ad"))?;
    tracing::info!("Ad '{}' updated ({})", ad.title, ad.id);

    Ok(Json(Notified::new(
        ad,
        Notification::success("Ad updated", "Your changes have been saved"),
    )))
}

/// DELETE /Admin/Ads/{id}
async fn delete_ad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    if !db::delete_ad(&state.db, &id).await? {
        return Err(AppError::not_found("Ad"));
    }
    tracing::info!("Ad {} deleted", id);
    Ok(Json(Notification::success("Ad deleted", "The advertisement has been removed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, get, json_request, post, send, state};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_content_crud() {
        let app = app(state().await);

        let (status, body) = post(
            &app,
            "/Admin/Content",
            json!({"title": "Heat", "type": "movie", "duration": 10200, "is_featured": true}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["notification"]["title"], "Content created");
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                Method::PUT,
                &format!("/Admin/Content/{}", id),
                Some(json!({"title": "Heat (1995)", "type": "movie", "duration": 10200})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Heat (1995)");
        assert_eq!(body["is_featured"], false);

        let (_, body) = get(&app, "/Admin/Content").await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            json_request(Method::DELETE, &format!("/Admin/Content/{}", id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            json_request(Method::DELETE, &format!("/Admin/Content/{}", id), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_content_validation() {
        let app = app(state().await);

        let (status, _) = post(
            &app,
            "/Admin/Content",
            json!({"title": " ", "type": "movie"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(&app, "/Admin/Content", json!({"title": "X", "type": "clip"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(
            &app,
            "/Admin/Content",
            json!({"title": "X", "type": "series", "thumbnail_url": "not a url"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ad_crud_and_normalization() {
        let app = app(state().await);

        let (status, body) = post(
            &app,
            "/Admin/Ads",
            json!({
                "title": "Spring sale",
                "thumbnail_url": "https://cdn.example.com/sale.jpg",
                "duration": 30,
                "skip_after_seconds": 5,
                "cta_url": "https://shop.example.com"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        // Banner ad: no duration, not skippable so no skip delay
        assert_eq!(body["duration"], serde_json::Value::Null);
        assert_eq!(body["skip_after_seconds"], serde_json::Value::Null);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                Method::PUT,
                &format!("/Admin/Ads/{}", id),
                Some(json!({
                    "title": "Spring sale",
                    "video_url": "https://cdn.example.com/sale.mp4",
                    "duration": 30,
                    "is_skippable": true,
                    "skip_after_seconds": 5
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duration"], 30);
        assert_eq!(body["skip_after_seconds"], 5);

        let (status, _) = send(
            &app,
            json_request(Method::DELETE, &format!("/Admin/Ads/{}", id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = get(&app, "/Admin/Ads").await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ad_validation() {
        let app = app(state().await);

        let (status, body) = post(&app, "/Admin/Ads", json!({"title": "No media"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["description"], "An ad needs a video URL or a thumbnail URL");

        let (status, _) = post(
            &app,
            "/Admin/Ads",
            json!({"title": "Bad video", "video_url": "https://cdn.example.com/page.html"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            json_request(
                Method::PUT,
                "/Admin/Ads/missing",
                Some(json!({"title": "X", "thumbnail_url": "https://cdn.example.com/x.png"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
