// Feed endpoint: content listing with ad banners spliced in

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db;
use crate::error::ApiResult;
use crate::services::ad_plan::{build_insertion_plan, PlanNode};
use crate::AppState;

use super::content::ContentQuery;

const DEFAULT_FEED_SIZE: i64 = 20;

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub nodes: Vec<PlanNode>,
    pub content_count: usize,
    pub ads_used: usize,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_feed))
}

/// GET /Feed
async fn get_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let filter = query.to_filter(DEFAULT_FEED_SIZE)?;
    let content = db::list_content(&state.db, &filter).await?;

    // Unclassified ads are never shown
    let ads: Vec<_> = db::list_ads(&state.db, state.config.ads.pool_limit)
        .await?
        .into_iter()
        .filter(|ad| ad.kind().is_some())
        .collect();

    let nodes = build_insertion_plan(&content, &ads, &state.config.ads.plan_config());
    let ads_used = nodes
        .iter()
        .map(|node| match node {
            PlanNode::AdBanner { ads, .. } => ads.len(),
            PlanNode::Content(_) => 0,
        })
        .sum();

    tracing::debug!(
        "Feed built: {} content entries, {} ads in {} banners",
        content.len(),
        ads_used,
        nodes.iter().filter(|n| n.is_banner()).count()
    );

    Ok(Json(FeedResponse {
        nodes,
        content_count: content.len(),
        ads_used,
    }))
}
