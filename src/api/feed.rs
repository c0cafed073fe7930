//! Feed API endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{MessageView, Paginated};
use crate::services::{FeedType, TrendingHashtag};

const DEFAULT_TRENDING: usize = 10;
const MAX_TRENDING: usize = 50;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub feed_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<usize>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(public_feed))
        .route("/trending", get(trending))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/mine", get(my_feed))
}

/// GET /api/v1/feed
async fn public_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Paginated<MessageView>>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(state.feed_service.public_feed(request).await?))
}

/// GET /api/v1/feed/mine?type=all|friends
async fn my_feed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Paginated<MessageView>>, ApiError> {
    let feed_type = match query.feed_type.as_deref() {
        Some(raw) => FeedType::from_str(raw).map_err(|e| ApiError::validation_error(e.to_string()))?,
        None => FeedType::default(),
    };
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(
        state
            .feed_service
            .user_feed(user.0.id, feed_type, request)
            .await?,
    ))
}

/// GET /api/v1/feed/trending
async fn trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<TrendingHashtag>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRENDING).clamp(1, MAX_TRENDING);
    Ok(Json(state.feed_service.trending_hashtags(limit).await?))
}
