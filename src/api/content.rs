// Content browsing endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{self, ContentFilter};
use crate::error::{ApiResult, AppError};
use crate::models::{ContentEntry, ContentKind};
use crate::AppState;

use super::page_limit;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Query parameters shared by content listings and the feed
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    /// "movie" or "series"
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub featured: Option<bool>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

impl ContentQuery {
    pub fn to_filter(&self, default_limit: i64) -> ApiResult<ContentFilter> {
        let kind = match self.content_type.as_deref() {
            None | Some("") => None,
            Some(t) => Some(
                ContentKind::from_str(t)
                    .ok_or_else(|| AppError::validation(format!("Unknown content type '{}'", t)))?,
            ),
        };

        Ok(ContentFilter {
            kind,
            featured: self.featured,
            category: self.category.clone().filter(|c| !c.trim().is_empty()),
            limit: Some(page_limit(self.limit, default_limit, MAX_PAGE_SIZE)),
        })
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_content))
        .route("/:id", get(get_content))
}

/// GET /Content
async fn list_content(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<Vec<ContentEntry>>> {
    let filter = query.to_filter(DEFAULT_PAGE_SIZE)?;
    let items = db::list_content(&state.db, &filter).await?;
    Ok(Json(items))
}

/// GET /Content/{id}
async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContentEntry>> {
    db::get_content(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Content"))
}
