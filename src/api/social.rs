// Profiles and friendships

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db;
use crate::error::{ApiResult, AppError};
use crate::models::{Friendship, FriendshipStatus, Profile};
use crate::services::media_probe::is_valid_url;
use crate::services::notify::{Notification, Notified};
use crate::AppState;

/// Query parameters identifying the acting user
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

impl UserQuery {
    pub fn require(self) -> ApiResult<String> {
        self.user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::validation("Missing userId"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub user_id: String,
    pub friend_id: String,
}

/// The other side of a friendship, with their profile if they have one
#[derive(Debug, Serialize)]
pub struct FriendDto {
    pub user_id: String,
    pub status: String,
    pub since: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Serialize)]
pub struct FriendsResponse {
    pub friends: Vec<FriendDto>,
    /// Requests waiting for this user to accept
    pub incoming: Vec<FriendDto>,
    /// Requests this user sent
    pub outgoing: Vec<FriendDto>,
}

pub fn profile_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id", get(get_profile).put(update_profile))
}

pub fn friend_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_friends))
        .route("/Requests", post(send_request))
        .route("/Requests/:friendId/Accept", post(accept_request))
        .route("/:friendId", delete(remove_friend))
}

/// GET /Profiles/{id}
async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Profile>> {
    db::get_profile(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Profile"))
}

/// PUT /Profiles/{id}
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ProfileUpdate>,
) -> ApiResult<Json<Notified<Profile>>> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("Username cannot be empty"));
    }
    if username.chars().count() > state.config.chat.max_username_length {
        return Err(AppError::validation(format!(
            "Username must be at most {} characters",
            state.config.chat.max_username_length
        )));
    }

    let avatar_url = req.avatar_url.filter(|u| !u.trim().is_empty());
    if let Some(url) = &avatar_url {
        if !is_valid_url(url) {
            return Err(AppError::validation("Avatar must be an http(s) URL"));
        }
    }

    let profile = Profile {
        id,
        avatar_url,
        username: username.to_string(),
        display_name: req.display_name.filter(|n| !n.trim().is_empty()),
    };
    if !db::upsert_profile(&state.db, &profile).await? {
        return Err(AppError::validation("Username is already taken"));
    }

    Ok(Json(Notified::new(
        profile,
        Notification::success("Profile saved", "Your profile has been updated"),
    )))
}

/// GET /Friends?userId=
async fn list_friends(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<FriendsResponse>> {
    let user_id = query.require()?;
    let friendships = db::list_friendships(&state.db, &user_id).await?;

    let mut response = FriendsResponse::default();
    for friendship in friendships {
        let bucket = bucket_for(&friendship, &user_id);
        let other = if friendship.user_id == user_id {
            friendship.friend_id
        } else {
            friendship.user_id
        };
        let profile = db::get_profile(&state.db, &other).await?;
        let dto = FriendDto {
            user_id: other,
            status: friendship.status,
            since: friendship.created_at,
            profile,
        };

        match bucket {
            Bucket::Friends => response.friends.push(dto),
            Bucket::Incoming => response.incoming.push(dto),
            Bucket::Outgoing => response.outgoing.push(dto),
        }
    }

    Ok(Json(response))
}

enum Bucket {
    Friends,
    Incoming,
    Outgoing,
}

fn bucket_for(friendship: &Friendship, user_id: &str) -> Bucket {
    if friendship.status == FriendshipStatus::Accepted.as_str() {
        Bucket::Friends
    } else if friendship.friend_id == user_id {
        Bucket::Incoming
    } else {
        Bucket::Outgoing
    }
}

/// POST /Friends/Requests
async fn send_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FriendRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let user_id = req.user_id.trim();
    let friend_id = req.friend_id.trim();

    if user_id.is_empty() || friend_id.is_empty() {
        return Err(AppError::validation("Both users are required"));
    }
    if user_id == friend_id {
        return Err(AppError::validation("You cannot add yourself as a friend"));
    }

    if !db::insert_friend_request(&state.db, user_id, friend_id).await? {
        return Err(AppError::validation("A friend request already exists"));
    }

    tracing::debug!("Friend request {} -> {}", user_id, friend_id);
    Ok((
        StatusCode::CREATED,
        Json(Notification::success("Request sent", "Friend request sent")),
    ))
}

/// POST /Friends/Requests/{friendId}/Accept?userId=
async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(friend_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Notification>> {
    let user_id = query.require()?;

    if !db::accept_friend_request(&state.db, &user_id, &friend_id).await? {
        return Err(AppError::not_found("Friend request"));
    }

    Ok(Json(Notification::success(
        "Friend added",
        "You are now friends",
    )))
}

/// DELETE /Friends/{friendId}?userId=
async fn remove_friend(
    State(state): State<Arc<AppState>>,
    Path(friend_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<StatusCode> {
    let user_id = query.require()?;

    if !db::delete_friendship(&state.db, &user_id, &friend_id).await? {
        return Err(AppError::not_found("Friendship"));
    }
    Ok(StatusCode::NO_CONTENT)
}
