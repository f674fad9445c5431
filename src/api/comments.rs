// Comment endpoints
// Comments hang off a content entry: /Content/{id}/Comments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::models::Comment;
use crate::services::notify::{Notification, Notified};
use crate::AppState;

use super::page_limit;

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NewCommentRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub comment: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id/Comments", get(list_comments).post(post_comment))
}

/// GET /Content/{id}/Comments
/// Newest first
async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
    Query(query): Query<CommentsQuery>,
) -> ApiResult<Json<Vec<Comment>>> {
    let page_size = state.config.chat.comments_page_size.max(1);
    let limit = page_limit(query.limit, page_size, page_size);
    let comments = db::list_comments(&state.db, &content_id, limit).await?;
    Ok(Json(comments))
}

/// POST /Content/{id}/Comments
async fn post_comment(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
    Json(req): Json<NewCommentRequest>,
) -> ApiResult<(StatusCode, Json<Notified<Comment>>)> {
    let chat = &state.config.chat;
    let username = req.username.trim();
    let comment = req.comment.trim();

    if username.is_empty() {
        return Err(AppError::validation("Please enter your name"));
    }
    if comment.is_empty() {
        return Err(AppError::validation("Please enter a comment"));
    }
    if username.chars().count() > chat.max_username_length {
        return Err(AppError::validation(format!(
            "Name must be at most {} characters",
            chat.max_username_length
        )));
    }
    if comment.chars().count() > chat.max_comment_length {
        return Err(AppError::validation(format!(
            "Comment must be at most {} characters",
            chat.max_comment_length
        )));
    }

    if db::get_content(&state.db, &content_id).await?.is_none() {
        return Err(AppError::not_found("Content"));
    }

    let created = db::insert_comment(&state.db, &content_id, username, comment).await?;
    tracing::debug!("Comment {} posted on {} by {}", created.id, content_id, username);

    Ok((
        StatusCode::CREATED,
        Json(Notified::new(
            created,
            Notification::success("Comment posted", "Your comment has been added"),
        )),
    ))
}
