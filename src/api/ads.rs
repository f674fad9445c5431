// Ad pool and showcase endpoints
// A showcase is a mounted dual-type sequencer with its two carousels. Clients
// mount one, follow it over SSE, send carousel commands and unmount it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::models::{AdKind, Advertisement};
use crate::services::carousel::CarouselCommand;
use crate::services::showcase::{Showcase, ShowcaseSnapshot};
use crate::AppState;

/// Ad with its presentation details resolved
#[derive(Debug, Serialize)]
pub struct AdDto {
    #[serde(flatten)]
    pub ad: Advertisement,
    pub kind: Option<AdKind>,
    pub skip_after: Option<i64>,
}

impl From<Advertisement> for AdDto {
    fn from(ad: Advertisement) -> Self {
        Self {
            kind: ad.kind(),
            skip_after: ad.skip_after(),
            ad,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MountedShowcase {
    pub id: String,
    pub state: ShowcaseSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ShowcaseCommandRequest {
    /// Which carousel the command is for
    pub target: AdKind,
    #[serde(flatten)]
    pub command: CarouselCommand,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_ads))
        .route("/Showcase", post(mount_showcase))
        .route("/Showcase/:id", get(get_showcase).delete(unmount_showcase))
        .route("/Showcase/:id/Events", get(showcase_events))
        .route("/Showcase/:id/Command", post(showcase_command))
}

/// GET /Ads
/// Bounded ad pool, newest first
async fn list_ads(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AdDto>>> {
    let ads = db::list_ads(&state.db, state.config.ads.pool_limit).await?;
    Ok(Json(ads.into_iter().map(AdDto::from).collect()))
}

/// POST /Ads/Showcase
async fn mount_showcase(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<MountedShowcase>)> {
    let mut ads = db::list_ads(&state.db, state.config.ads.pool_limit).await?;

    if state.config.ads.probe_videos {
        ads = state.probe.retain_playable(ads).await;
    }

    let showcase = Showcase::mount(ads, state.config.ads.showcase_timings());
    let snapshot = showcase.snapshot();
    let (id, _) = state.showcases.insert(showcase).await;

    tracing::info!("Showcase {} mounted (sequence: {:?})", id, snapshot.current_sequence);

    Ok((
        StatusCode::CREATED,
        Json(MountedShowcase {
            id,
            state: snapshot,
        }),
    ))
}

async fn find_showcase(state: &AppState, id: &str) -> ApiResult<Arc<Showcase>> {
    state
        .showcases
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found("Showcase"))
}

/// GET /Ads/Showcase/{id}
async fn get_showcase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ShowcaseSnapshot>> {
    let showcase = find_showcase(&state, &id).await?;
    Ok(Json(showcase.snapshot()))
}

/// GET /Ads/Showcase/{id}/Events
/// Server-sent `state` events until the showcase is unmounted
async fn showcase_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let (showcase, watch) = state
        .showcases
        .watch(&id)
        .await
        .ok_or_else(|| AppError::not_found("Showcase"))?;
    tracing::debug!("Streaming showcase {} events", id);

    // The guard lives as long as the client stays connected
    let stream = showcase.events().map(move |snapshot| {
        let _watch = &watch;
        Event::default().event("state").json_data(&snapshot)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /Ads/Showcase/{id}/Command
async fn showcase_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ShowcaseCommandRequest>,
) -> ApiResult<StatusCode> {
    if matches!(req.command, CarouselCommand::ReplaceItems { .. }) {
        return Err(AppError::validation(
            "A mounted showcase keeps the ads it was mounted with",
        ));
    }

    let showcase = find_showcase(&state, &id).await?;
    if !showcase.command(req.target, req.command) {
        return Err(AppError::validation(format!(
            "No {} carousel is running",
            match req.target {
                AdKind::Video => "video",
                AdKind::Banner => "banner",
            }
        )));
    }

    tracing::debug!("Showcase {} command {:?} -> {:?}", id, req.command, req.target);
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /Ads/Showcase/{id}
async fn unmount_showcase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let showcase = state
        .showcases
        .remove(&id)
        .await
        .ok_or_else(|| AppError::not_found("Showcase"))?;
    showcase.unmount();
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, get, json_request, post, seed_ad, send, state};
    use axum::http::Method;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_ads_classifies_and_caps() {
        let state = state().await;
        for i in 0..7 {
            seed_ad(&state, &format!("ad-{}", i), i % 2 == 0).await;
        }
        let app = app(state);

        let (status, body) = get(&app, "/Ads").await;
        assert_eq!(status, StatusCode::OK);
        let ads = body.as_array().unwrap();
        assert_eq!(ads.len(), 5);
        assert_eq!(ads[0]["title"], "ad-6");
        assert_eq!(ads[0]["kind"], "video");
        assert_eq!(ads[0]["skip_after"], 5);
        assert_eq!(ads[1]["kind"], "banner");
    }

    #[tokio::test]
    async fn test_showcase_lifecycle() {
        let state = state().await;
        seed_ad(&state, "banner-a", false).await;
        seed_ad(&state, "banner-b", false).await;
        seed_ad(&state, "video-a", true).await;
        let app = app(state.clone());

        let (status, body) = post(&app, "/Ads/Showcase", json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"]["current_sequence"], "video");
        let id = body["id"].as_str().unwrap().to_string();
        let uri = format!("/Ads/Showcase/{}", id);

        let (status, _) = post(
            &app,
            &format!("{}/Command", uri),
            json!({"target": "banner", "action": "go_to", "index": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // Commands are applied by the carousel task
        let mut body = serde_json::Value::Null;
        for _ in 0..100 {
            body = get(&app, &uri).await.1;
            if body["banner"]["carousel"]["current_index"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(body["banner"]["carousel"]["current_index"], 1);
        assert_eq!(body["video"]["carousel"]["len"], 1);

        let (status, _) = send(&app, json_request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.showcases.len().await, 0);

        let (status, _) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_stream_keeps_showcase_mounted() {
        let state = state().await;
        seed_ad(&state, "banner-a", false).await;
        let app = app(state.clone());

        let (_, body) = post(&app, "/Ads/Showcase", json!({})).await;
        let id = body["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::GET,
                &format!("/Ads/Showcase/{}/Events", id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        let first = String::from_utf8_lossy(&first);
        assert!(first.contains("event: state"));
        assert!(first.contains("\"current_sequence\":\"banner\""));

        // Open stream: nothing is idle
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.reap_idle_sessions(Duration::from_millis(5)).await, 0);
        let (status, _) = get(&app, &format!("/Ads/Showcase/{}", id)).await;
        assert_eq!(status, StatusCode::OK);

        // Client gone: the showcase goes idle and is unmounted
        drop(frames);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let showcase = state.showcases.get(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.reap_idle_sessions(Duration::from_millis(5)).await, 1);
        assert!(showcase.is_unmounted());
        assert_eq!(state.showcases.len().await, 0);
    }

    #[tokio::test]
    async fn test_events_for_unknown_showcase() {
        let app = app(state().await);
        let (status, _) = get(&app, "/Ads/Showcase/unknown/Events").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_command_validation() {
        let state = state().await;
        seed_ad(&state, "banner-a", false).await;
        let app = app(state);

        let (_, body) = post(&app, "/Ads/Showcase", json!({})).await;
        let command_uri = format!("/Ads/Showcase/{}/Command", body["id"].as_str().unwrap());

        // No video ads in the pool
        let (status, body) = post(
            &app,
            &command_uri,
            json!({"target": "video", "action": "next"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["description"], "No video carousel is running");

        let (status, _) = post(
            &app,
            &command_uri,
            json!({"target": "banner", "action": "replace_items", "len": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(
            &app,
            "/Ads/Showcase/unknown/Command",
            json!({"target": "banner", "action": "next"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_command_request_deserializes_flattened_action() {
        let req: ShowcaseCommandRequest =
            serde_json::from_value(json!({"target": "video", "action": "pause"})).unwrap();
        assert_eq!(req.target, AdKind::Video);
        assert_eq!(req.command, CarouselCommand::Pause);
    }
}
