// Voice message endpoints
// A recording is mounted per user; its capture slot is exclusive to that user
// and is released whenever the recording leaves the recording state.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::models::VoiceMessage;
use crate::services::notify::{Notification, Notified};
use crate::services::recorder::{CaptureSlot, Recorder, RecorderError, RecorderState};
use crate::AppState;

use super::page_limit;
use super::social::UserQuery;

const MESSAGES_PAGE_SIZE: i64 = 50;

/// A mounted recorder and the user it records for
pub struct VoiceRecording {
    owner: String,
    recorder: Mutex<Recorder<CaptureSlot>>,
}

#[derive(Debug, Serialize)]
pub struct RecordingDto {
    pub id: String,
    pub owner: String,
    pub state: RecorderState,
    pub elapsed_seconds: u64,
    pub size_bytes: usize,
}

impl RecordingDto {
    fn new(id: String, owner: &str, recorder: &Recorder<CaptureSlot>) -> Self {
        Self {
            id,
            owner: owner.to_string(),
            state: recorder.state(),
            elapsed_seconds: recorder.elapsed_seconds(),
            size_bytes: recorder.size(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRecordingRequest {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/Recordings", post(start_recording))
        .route("/Recordings/:id", get(get_recording))
        .route("/Recordings/:id/Chunks", put(append_chunk))
        .route("/Recordings/:id/Stop", post(stop_recording))
        .route("/Recordings/:id/Send", post(send_recording))
        .route("/Recordings/:id/Discard", post(discard_recording))
        .route("/Messages", get(list_messages))
}

/// POST /Voice/Recordings
async fn start_recording(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRecordingRequest>,
) -> ApiResult<(StatusCode, Json<RecordingDto>)> {
    let owner = req.user_id.trim();
    if owner.is_empty() {
        return Err(AppError::validation("Missing userId"));
    }

    let mut recorder = Recorder::new(state.config.chat.max_voice_bytes);
    recorder.start(&state.capture.for_owner(owner))?;

    let (id, recording) = state
        .recordings
        .insert(VoiceRecording {
            owner: owner.to_string(),
            recorder: Mutex::new(recorder),
        })
        .await;

    tracing::info!("Recording {} started for {}", id, owner);

    let recorder = recording.recorder.lock().await;
    Ok((
        StatusCode::CREATED,
        Json(RecordingDto::new(id, &recording.owner, &recorder)),
    ))
}

async fn find_recording(state: &AppState, id: &str) -> ApiResult<Arc<VoiceRecording>> {
    state
        .recordings
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found("Recording"))
}

/// GET /Voice/Recordings/{id}
async fn get_recording(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RecordingDto>> {
    let recording = find_recording(&state, &id).await?;
    let recorder = recording.recorder.lock().await;
    Ok(Json(RecordingDto::new(id, &recording.owner, &recorder)))
}

/// PUT /Voice/Recordings/{id}/Chunks
/// Raw audio bytes
async fn append_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<RecordingDto>> {
    let recording = find_recording(&state, &id).await?;
    let mut recorder = recording.recorder.lock().await;

    recorder.push_chunk(body.to_vec()).map_err(|e| match e {
        RecorderError::TooLarge { .. } => AppError::validation(e.to_string()),
        other => other.into(),
    })?;

    Ok(Json(RecordingDto::new(id, &recording.owner, &recorder)))
}

/// POST /Voice/Recordings/{id}/Stop
async fn stop_recording(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RecordingDto>> {
    let recording = find_recording(&state, &id).await?;
    let mut recorder = recording.recorder.lock().await;

    let stopped = recorder.stop().map(|_| ());
    if let Err(e) = stopped {
        // A failed finalization leaves nothing worth keeping
        if recorder.state() == RecorderState::Idle {
            state.recordings.remove(&id).await;
        }
        return Err(e.into());
    }

    tracing::debug!(
        "Recording {} stopped: {} bytes, {}s",
        id,
        recorder.size(),
        recorder.elapsed_seconds()
    );
    Ok(Json(RecordingDto::new(id, &recording.owner, &recorder)))
}

/// POST /Voice/Recordings/{id}/Send
async fn send_recording(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendRecordingRequest>,
) -> ApiResult<(StatusCode, Json<Notified<VoiceMessage>>)> {
    let recipient = req.recipient_id.trim();
    if recipient.is_empty() {
        return Err(AppError::validation("Missing recipientId"));
    }

    let recording = find_recording(&state, &id).await?;
    let mut recorder = recording.recorder.lock().await;

    let db = &state.db;
    let sender = recording.owner.as_str();
    let message = recorder
        .send(|clip| async move {
            let duration = i64::try_from(clip.duration_seconds).unwrap_or(i64::MAX);
            db::insert_voice_message(db, sender, recipient, &clip.audio, duration)
                .await
                .map_err(AppError::from)
        })
        .await?;

    drop(recorder);
    state.recordings.remove(&id).await;

    tracing::info!("Voice message {} sent {} -> {}", message.id, sender, recipient);
    Ok((
        StatusCode::CREATED,
        Json(Notified::new(
            message,
            Notification::success("Voice message sent", "Your voice message has been sent"),
        )),
    ))
}

/// POST /Voice/Recordings/{id}/Discard
async fn discard_recording(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let recording = find_recording(&state, &id).await?;
    recording.recorder.lock().await.discard()?;
    state.recordings.remove(&id).await;

    Ok(Json(Notification::info(
        "Recording discarded",
        "Your voice message was not sent",
    )))
}

/// GET /Voice/Messages?userId=
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<VoiceMessage>>> {
    let user_id = UserQuery {
        user_id: query.user_id,
    }
    .require()?;
    let limit = page_limit(query.limit, MESSAGES_PAGE_SIZE, MESSAGES_PAGE_SIZE);
    let messages = db::list_voice_messages(&state.db, &user_id, limit).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, get, post, send, state};
    use axum::{body::Body, http::Request};
    use serde_json::json;

    fn chunk(id: &str, bytes: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(format!("/Voice/Recordings/{}/Chunks", id))
            .header("content-type", "application/octet-stream")
            .body(Body::from(bytes))
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_stop_send() {
        let state = state().await;
        let app = app(state.clone());

        let (status, body) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"], "recording");
        let id = body["id"].as_str().unwrap().to_string();
        assert!(state.capture.is_held("ana"));

        let (_, body) = send(&app, chunk(&id, b"abc")).await;
        assert_eq!(body["size_bytes"], 3);
        send(&app, chunk(&id, b"de")).await;

        let (status, body) = post(&app, &format!("/Voice/Recordings/{}/Stop", id), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "recorded");
        assert_eq!(body["size_bytes"], 5);
        assert!(!state.capture.is_held("ana"));

        let (status, body) = post(
            &app,
            &format!("/Voice/Recordings/{}/Send", id),
            json!({"recipientId": "bo"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sender_id"], "ana");
        assert!(body.get("audio").is_none());
        assert_eq!(state.recordings.len().await, 0);

        let (_, body) = get(&app, "/Voice/Messages?userId=bo").await;
        let messages = body.as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["recipient_id"], "bo");

        let stored = db::list_voice_messages(&state.db, "bo", 10).await.unwrap();
        assert_eq!(stored[0].audio, b"abcde".to_vec());
    }

    #[tokio::test]
    async fn test_one_active_recording_per_user() {
        let state = state().await;
        let app = app(state.clone());

        let (_, body) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["variant"], "destructive");

        // Another user is unaffected
        let (status, _) = post(&app, "/Voice/Recordings", json!({"userId": "bo"})).await;
        assert_eq!(status, StatusCode::CREATED);

        // Aborting frees the slot
        let (status, _) = post(&app, &format!("/Voice/Recordings/{}/Discard", id), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.capture.is_held("ana"));
        let (status, _) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_empty_stop_releases_and_unmounts() {
        let state = state().await;
        let app = app(state.clone());

        let (_, body) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _) = post(&app, &format!("/Voice/Recordings/{}/Stop", id), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!state.capture.is_held("ana"));

        let (status, _) = get(&app, &format!("/Voice/Recordings/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_before_stop_rejected() {
        let state = state().await;
        let app = app(state.clone());

        let (_, body) = post(&app, "/Voice/Recordings", json!({"userId": "ana"})).await;
        let id = body["id"].as_str().unwrap().to_string();
        send(&app, chunk(&id, b"abc")).await;

        let (status, _) = post(
            &app,
            &format!("/Voice/Recordings/{}/Send", id),
            json!({"recipientId": "bo"}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = get(&app, &format!("/Voice/Recordings/{}", id)).await;
        assert_eq!(body["state"], "recording");
        assert!(db::list_voice_messages(&state.db, "bo", 10).await.unwrap().is_empty());
    }
}
