//! Feed assembly
//!
//! Feeds are plain filtered queries over top-level messages; there is no
//! ranking. Trending hashtags are counted in memory and cached with moka.

use crate::config::FeedConfig;
use crate::db::repositories::{FeedFilter, FriendshipRepository, MessageRepository};
use crate::models::{MessageView, PageRequest, Paginated};
use crate::services::message::MessageService;
use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which messages a signed-in member's feed shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    /// Everything public plus friends-only posts from friends and self
    #[default]
    All,
    /// Only posts written by friends
    Friends,
}

impl FromStr for FeedType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(FeedType::All),
            "friends" => Ok(FeedType::Friends),
            _ => Err(anyhow::anyhow!("Invalid feed type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingHashtag {
    pub tag: String,
    pub count: i64,
}

pub struct FeedService {
    messages: Arc<dyn MessageRepository>,
    friendships: Arc<dyn FriendshipRepository>,
    message_service: Arc<MessageService>,
    config: FeedConfig,
    trending: Cache<(), Arc<Vec<TrendingHashtag>>>,
}

impl FeedService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        friendships: Arc<dyn FriendshipRepository>,
        message_service: Arc<MessageService>,
        config: FeedConfig,
    ) -> Self {
        let trending = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.trending_ttl_secs.max(1)))
            .build();
        Self {
            messages,
            friendships,
            message_service,
            config,
            trending,
        }
    }

    /// Clamp optional query parameters into a page request
    pub fn page_request(&self, page: Option<i64>, limit: Option<i64>) -> PageRequest {
        PageRequest::new(
            page.unwrap_or(1),
            limit.unwrap_or(self.config.default_limit),
            self.config.max_limit,
        )
    }

    pub async fn public_feed(&self, request: PageRequest) -> Result<Paginated<MessageView>> {
        self.load(&FeedFilter::Public, request).await
    }

    pub async fn user_feed(&self, user_id: i64, feed_type: FeedType, request: PageRequest) -> Result<Paginated<MessageView>> {
        let mut ids = self.friend_ids(user_id).await?;
        let filter = match feed_type {
            FeedType::Friends => FeedFilter::Authors(ids),
            FeedType::All => {
                ids.push(user_id);
                FeedFilter::Network { ids }
            }
        };
        self.load(&filter, request).await
    }

    async fn load(&self, filter: &FeedFilter, request: PageRequest) -> Result<Paginated<MessageView>> {
        let (messages, total) = self
            .messages
            .feed(filter, request.page, request.limit)
            .await
            .context("Failed to load feed")?;
        let views = self.message_service.to_views(messages).await?;
        Ok(Paginated::new(views, total, request))
    }

    pub async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.friendships
            .friend_ids(user_id)
            .await
            .context("Failed to load friend ids")
    }

    /// Most used hashtags across live messages
    pub async fn trending_hashtags(&self, limit: usize) -> Result<Vec<TrendingHashtag>> {
        let ranked = match self.trending.get(&()).await {
            Some(cached) => cached,
            None => {
                let sets = self
                    .messages
                    .hashtag_sets()
                    .await
                    .context("Failed to load hashtags")?;
                let ranked = Arc::new(rank_hashtags(sets));
                self.trending.insert((), ranked.clone()).await;
                ranked
            }
        };
        Ok(ranked.iter().take(limit).cloned().collect())
    }

    /// Drop the cached ranking so the next call recounts
    pub async fn invalidate_trending(&self) {
        self.trending.invalidate(&()).await;
    }
}

/// Count per tag, highest first, ties broken alphabetically
pub fn rank_hashtags(sets: Vec<Vec<String>>) -> Vec<TrendingHashtag> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for tag in sets.into_iter().flatten() {
        *counts.entry(tag).or_default() += 1;
    }
    let mut ranked: Vec<TrendingHashtag> = counts
        .into_iter()
        .map(|(tag, count)| TrendingHashtag { tag, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked
}
