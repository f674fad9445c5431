// Playback session endpoints
// One session per mounted player. Progress reports drive the view guard.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::services::view_tracking::{PlaybackSession, ViewSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlaybackRequest {
    pub content_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Seconds into the content
    pub current_time: f64,
    pub is_playing: bool,
    #[serde(default)]
    pub ad_is_playing: bool,
}

#[derive(Debug, Serialize)]
pub struct PlaybackSessionDto {
    pub id: String,
    #[serde(flatten)]
    pub view: ViewSnapshot,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(start_session))
        .route("/:id", axum::routing::get(get_session).delete(stop_session))
        .route("/:id/Progress", post(report_progress))
}

/// POST /Playback/Sessions
/// Mount a player. Switching content means mounting a new session.
async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartPlaybackRequest>,
) -> ApiResult<(StatusCode, Json<PlaybackSessionDto>)> {
    if req.content_id.trim().is_empty() {
        return Err(AppError::validation("Missing content id"));
    }

    // Seed from a fresh read so the guard starts from the stored count
    let entry = db::get_content(&state.db, &req.content_id)
        .await?
        .ok_or_else(|| AppError::not_found("Content"))?;

    let session = PlaybackSession::new(
        entry.id,
        entry.views,
        state.config.player.view_threshold_seconds,
    );
    let (id, session) = state.playback.insert(session).await;

    tracing::info!("Playback session {} started for {}", id, session.content_id());

    Ok((
        StatusCode::CREATED,
        Json(PlaybackSessionDto {
            id,
            view: session.snapshot().await,
        }),
    ))
}

async fn find_session(state: &AppState, id: &str) -> ApiResult<Arc<PlaybackSession>> {
    state
        .playback
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found("Playback session"))
}

/// GET /Playback/Sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaybackSessionDto>> {
    let session = find_session(&state, &id).await?;
    Ok(Json(PlaybackSessionDto {
        id,
        view: session.snapshot().await,
    }))
}

/// POST /Playback/Sessions/{id}/Progress
async fn report_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(report): Json<ProgressReport>,
) -> ApiResult<Json<PlaybackSessionDto>> {
    if !report.current_time.is_finite() || report.current_time < 0.0 {
        return Err(AppError::validation("Invalid playback position"));
    }

    let session = find_session(&state, &id).await?;
    let view = session
        .track_view(
            &state.db,
            report.is_playing,
            report.current_time,
            report.ad_is_playing,
        )
        .await;

    Ok(Json(PlaybackSessionDto { id, view }))
}

/// DELETE /Playback/Sessions/{id}
async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .playback
        .remove(&id)
        .await
        .ok_or_else(|| AppError::not_found("Playback session"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, get, json_request, post, seed_content, send, state};
    use crate::models::ContentKind;
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_view_counted_once_past_threshold() {
        let state = state().await;
        let entry = seed_content(&state, "Heat", ContentKind::Movie).await;
        let app = app(state.clone());

        let (status, body) = post(&app, "/Playback/Sessions", json!({"contentId": entry.id})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["has_tracked_view"], false);
        let progress = format!("/Playback/Sessions/{}/Progress", body["id"].as_str().unwrap());

        // At the threshold exactly: not yet
        let (_, body) = post(
            &app,
            &progress,
            json!({"currentTime": 30.0, "isPlaying": true}),
        )
        .await;
        assert_eq!(body["fired"], false);

        let (_, body) = post(
            &app,
            &progress,
            json!({"currentTime": 31.0, "isPlaying": true}),
        )
        .await;
        assert_eq!(body["fired"], true);
        assert_eq!(body["current_views"], 1);

        for t in [32.0, 60.0, 600.0] {
            let (_, body) = post(
                &app,
                &progress,
                json!({"currentTime": t, "isPlaying": true}),
            )
            .await;
            assert_eq!(body["fired"], false);
            assert_eq!(body["current_views"], 1);
        }

        let stored = db::get_content(&state.db, &entry.id).await.unwrap().unwrap();
        assert_eq!(stored.views, 1);
    }

    #[tokio::test]
    async fn test_ad_playback_suppresses_view() {
        let state = state().await;
        let entry = seed_content(&state, "Heat", ContentKind::Movie).await;
        let app = app(state.clone());

        let (_, body) = post(&app, "/Playback/Sessions", json!({"contentId": entry.id})).await;
        let progress = format!("/Playback/Sessions/{}/Progress", body["id"].as_str().unwrap());

        let (_, body) = post(
            &app,
            &progress,
            json!({"currentTime": 45.0, "isPlaying": true, "adIsPlaying": true}),
        )
        .await;
        assert_eq!(body["has_tracked_view"], false);

        let stored = db::get_content(&state.db, &entry.id).await.unwrap().unwrap();
        assert_eq!(stored.views, 0);
    }

    #[tokio::test]
    async fn test_new_session_reseeds_from_store() {
        let state = state().await;
        let entry = seed_content(&state, "Heat", ContentKind::Movie).await;
        let app = app(state);

        for expected in [1, 2] {
            let (_, body) = post(&app, "/Playback/Sessions", json!({"contentId": entry.id})).await;
            assert_eq!(body["current_views"], expected - 1);
            let uri = format!("/Playback/Sessions/{}", body["id"].as_str().unwrap());

            let (_, body) = post(
                &app,
                &format!("{}/Progress", uri),
                json!({"currentTime": 31.0, "isPlaying": true}),
            )
            .await;
            assert_eq!(body["current_views"], expected);

            let (status, _) = send(&app, json_request(Method::DELETE, &uri, None)).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
            let (status, _) = get(&app, &uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_start_for_missing_content() {
        let app = app(state().await);
        let (status, _) = post(&app, "/Playback/Sessions", json!({"contentId": "nope"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
