use axum::Router;
use std::sync::Arc;

use crate::AppState;

mod admin;
mod ads;
mod comments;
mod content;
mod feed;
mod playback;
mod social;
pub mod voice;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Comments live under /Content/:id/Comments
        .nest("/Content", content::routes().merge(comments::routes()))
        .nest("/Feed", feed::routes())
        .nest("/Ads", ads::routes()) // Ad pool and showcases
        .nest("/Playback/Sessions", playback::routes()) // View tracking
        .nest("/Profiles", social::profile_routes())
        .nest("/Friends", social::friend_routes())
        .nest("/Voice", voice::routes()) // Recordings and sent messages
        .nest("/Admin", admin::routes())
}

/// Clamp a client supplied page size
fn page_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}
