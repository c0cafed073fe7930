//! Message service
//!
//! Posting, replying, deleting and reacting to feed messages, and turning
//! stored rows into the views the API and templates render.
//!
//! Notifications for mentions, replies, addressees and likes are written
//! inline after the message itself is stored. Their failures are logged and
//! never undo the post.

use crate::db::repositories::{FeedFilter, LikeRepository, MessageRepository, UserRepository};
use crate::models::{
    CreateMessageInput, LikeType, Message, MessageView, NotificationKind, PageRequest, Paginated,
    ReactionOutcome, User, UserSummary, Visibility, MAX_MESSAGE_LENGTH,
};
use crate::services::notification::NotificationService;
use crate::services::text::{extract_hashtags, extract_mentions};
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum MessageServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    likes: Arc<dyn LikeRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        likes: Arc<dyn LikeRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            messages,
            likes,
            users,
            notifications,
        }
    }

    /// Post a message (or a reply when `parent_id` is set).
    ///
    /// # Errors
    ///
    /// - `ValidationError` for empty or oversized content
    /// - `NotFound` when the parent or addressee does not exist
    pub async fn create(&self, author: &User, input: CreateMessageInput) -> Result<MessageView, MessageServiceError> {
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(MessageServiceError::ValidationError(
                "Message content is required".to_string(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(MessageServiceError::ValidationError(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let parent = match input.parent_id {
            Some(id) => Some(
                self.live_message(id)
                    .await?
                    .ok_or(MessageServiceError::NotFound("Parent message"))?,
            ),
            None => None,
        };
        let addressee = match input.addressee_id {
            Some(id) => Some(
                self.users
                    .get_by_id(id)
                    .await
                    .context("Failed to get addressee")?
                    .ok_or(MessageServiceError::NotFound("Addressee"))?,
            ),
            None => None,
        };

        // A private message is never visible beyond its addressee
        let visibility = if input.is_private {
            Visibility::Private
        } else {
            input.visibility.unwrap_or(Visibility::Public)
        };
        let now = Utc::now();
        let draft = Message {
            id: 0,
            user_id: author.id,
            addressee_id: addressee.as_ref().map(|u| u.id),
            parent_id: parent.as_ref().map(|m| m.id),
            mentions: extract_mentions(&content),
            hashtags: extract_hashtags(&content),
            content,
            deleted: false,
            is_private: input.is_private,
            visibility,
            created_at: now,
            updated_at: now,
        };

        let message = self
            .messages
            .create(&draft)
            .await
            .context("Failed to store message")?;

        if let Err(e) = self.users.touch_activity(author.id, now).await {
            tracing::warn!("Failed to record activity for user {}: {}", author.id, e);
        }
        self.notify_for_new_message(author, &message, parent.as_ref()).await;

        let mut views = self.to_views(vec![message]).await?;
        views
            .pop()
            .ok_or_else(|| MessageServiceError::InternalError(anyhow::anyhow!("Author vanished while posting")))
    }

    async fn notify_for_new_message(&self, author: &User, message: &Message, parent: Option<&Message>) {
        let author_name = author.full_name();
        let data = json!({ "messageId": message.id, "fromUserId": author.id });
        let mut notified = HashSet::new();

        for token in &message.mentions {
            let targets = match self.users.find_by_mention(token).await {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!("Failed to resolve mention @{}: {}", token, e);
                    continue;
                }
            };
            for target in targets.into_iter().filter(|u| u.id != author.id) {
                if notified.insert(target.id) {
                    self.notifications
                        .notify(
                            target.id,
                            NotificationKind::Mention,
                            &format!("You were mentioned by {}", author_name),
                            &message.content,
                            data.clone(),
                        )
                        .await;
                }
            }
        }

        if let Some(parent) = parent {
            if parent.user_id != author.id && notified.insert(parent.user_id) {
                self.notifications
                    .notify(
                        parent.user_id,
                        NotificationKind::Comment,
                        "Someone replied to your message",
                        &format!("{} replied: {}", author_name, message.content),
                        json!({ "messageId": message.id, "parentId": parent.id, "fromUserId": author.id }),
                    )
                    .await;
            }
        }

        if let Some(addressee_id) = message.addressee_id {
            if addressee_id != author.id && notified.insert(addressee_id) {
                self.notifications
                    .notify(
                        addressee_id,
                        NotificationKind::Message,
                        &format!("New message from {}", author_name),
                        &message.content,
                        data,
                    )
                    .await;
            }
        }
    }

    /// Reply to `parent_id`, addressed to the parent's author
    pub async fn reply(&self, author: &User, parent_id: i64, content: &str) -> Result<MessageView, MessageServiceError> {
        let parent = self
            .live_message(parent_id)
            .await?
            .ok_or(MessageServiceError::NotFound("Message"))?;

        self.create(
            author,
            CreateMessageInput {
                content: content.to_string(),
                addressee_id: Some(parent.user_id),
                parent_id: Some(parent.id),
                visibility: Some(parent.visibility),
                is_private: parent.is_private,
            },
        )
        .await
    }

    /// Soft-delete a message the user wrote
    pub async fn delete(&self, user: &User, id: i64) -> Result<(), MessageServiceError> {
        let message = self
            .live_message(id)
            .await?
            .ok_or(MessageServiceError::NotFound("Message"))?;
        if message.user_id != user.id {
            return Err(MessageServiceError::Forbidden(
                "You can only delete your own messages".to_string(),
            ));
        }
        self.messages
            .soft_delete(id)
            .await
            .context("Failed to delete message")?;
        Ok(())
    }

    /// Toggle a like; a previous dislike is replaced
    pub async fn like(&self, user: &User, id: i64) -> Result<ReactionOutcome, MessageServiceError> {
        let message = self
            .live_message(id)
            .await?
            .ok_or(MessageServiceError::NotFound("Message"))?;
        let outcome = self.react(user.id, id, LikeType::Like).await?;

        if outcome == ReactionOutcome::Added && message.user_id != user.id {
            self.notifications
                .notify(
                    message.user_id,
                    NotificationKind::Like,
                    "Your message was liked",
                    &format!("{} liked your message", user.full_name()),
                    json!({ "messageId": id, "fromUserId": user.id }),
                )
                .await;
        }
        Ok(outcome)
    }

    /// Toggle a dislike; a previous like is replaced
    pub async fn dislike(&self, user: &User, id: i64) -> Result<ReactionOutcome, MessageServiceError> {
        self.live_message(id)
            .await?
            .ok_or(MessageServiceError::NotFound("Message"))?;
        self.react(user.id, id, LikeType::Dislike).await
    }

    async fn react(&self, user_id: i64, message_id: i64, like_type: LikeType) -> Result<ReactionOutcome, MessageServiceError> {
        if let Some(existing) = self
            .likes
            .get(user_id, message_id)
            .await
            .context("Failed to get reaction")?
        {
            self.likes
                .delete(existing.id)
                .await
                .context("Failed to remove reaction")?;
            if existing.like_type == like_type {
                return Ok(ReactionOutcome::Removed);
            }
        }
        self.likes
            .create(user_id, message_id, like_type)
            .await
            .context("Failed to add reaction")?;
        Ok(ReactionOutcome::Added)
    }

    /// One message with its replies
    pub async fn get_with_replies(&self, id: i64) -> Result<MessageView, MessageServiceError> {
        let message = self
            .live_message(id)
            .await?
            .ok_or(MessageServiceError::NotFound("Message"))?;
        let mut views = self.with_replies(vec![message]).await?;
        views.pop().ok_or(MessageServiceError::NotFound("Message"))
    }

    /// Public top-level messages, newest first, each with its replies
    pub async fn list(&self, request: PageRequest) -> Result<Paginated<MessageView>, MessageServiceError> {
        let (messages, total) = self
            .messages
            .feed(&FeedFilter::Public, request.page, request.limit)
            .await
            .context("Failed to list messages")?;
        let views = self.with_replies(messages).await?;
        Ok(Paginated::new(views, total, request))
    }

    /// Every live top-level message whatever its visibility. Moderation only.
    pub async fn list_all(&self, request: PageRequest) -> Result<Paginated<MessageView>, MessageServiceError> {
        let (messages, total) = self
            .messages
            .list_top_level(request.page, request.limit)
            .await
            .context("Failed to list messages")?;
        let views = self.with_replies(messages).await?;
        Ok(Paginated::new(views, total, request))
    }

    /// Latest messages written by `author_id` that the viewer may read.
    ///
    /// Friends-only posts need `viewer_is_friend`; private posts are shown to
    /// the author and the addressee only.
    pub async fn by_author(
        &self,
        author_id: i64,
        viewer_id: Option<i64>,
        viewer_is_friend: bool,
        limit: i64,
    ) -> Result<Vec<MessageView>, MessageServiceError> {
        let messages = self
            .messages
            .list_by_author(author_id, limit)
            .await
            .context("Failed to list messages by author")?;
        let own = viewer_id == Some(author_id);
        let visible = messages
            .into_iter()
            .filter(|m| {
                own || match m.visibility {
                    Visibility::Public => !m.is_private,
                    Visibility::Friends => viewer_is_friend && !m.is_private,
                    Visibility::Private => viewer_id.is_some() && m.addressee_id == viewer_id,
                }
            })
            .collect();
        self.to_views(visible).await
    }

    async fn live_message(&self, id: i64) -> Result<Option<Message>, MessageServiceError> {
        let message = self
            .messages
            .get_by_id(id)
            .await
            .context("Failed to get message")?;
        Ok(message.filter(|m| !m.deleted))
    }

    async fn with_replies(&self, messages: Vec<Message>) -> Result<Vec<MessageView>, MessageServiceError> {
        let mut views = self.to_views(messages).await?;
        for view in &mut views {
            let replies = self
                .messages
                .list_replies(view.id)
                .await
                .context("Failed to list replies")?;
            view.replies = self.to_views(replies).await?;
        }
        Ok(views)
    }

    /// Attach author/addressee summaries and reaction counts.
    ///
    /// Messages whose author no longer exists are dropped.
    pub async fn to_views(&self, messages: Vec<Message>) -> Result<Vec<MessageView>, MessageServiceError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let mut user_ids: Vec<i64> = messages
            .iter()
            .flat_map(|m| std::iter::once(m.user_id).chain(m.addressee_id))
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let users: HashMap<i64, UserSummary> = self
            .users
            .get_many(&user_ids)
            .await
            .context("Failed to load message authors")?
            .into_iter()
            .map(|u| (u.id, u.summary()))
            .collect();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        let counts = self
            .likes
            .counts_for(&ids)
            .await
            .context("Failed to load reaction counts")?;

        Ok(messages
            .into_iter()
            .filter_map(|m| {
                let author = users.get(&m.user_id)?.clone();
                let (likes, dislikes) = counts.get(&m.id).copied().unwrap_or((0, 0));
                Some(MessageView {
                    id: m.id,
                    addressee: m.addressee_id.and_then(|id| users.get(&id).cloned()),
                    author,
                    content: m.content,
                    parent_id: m.parent_id,
                    visibility: m.visibility,
                    is_private: m.is_private,
                    mentions: m.mentions,
                    hashtags: m.hashtags,
                    likes,
                    dislikes,
                    created_at: m.created_at,
                    replies: Vec::new(),
                })
            })
            .collect())
    }
}
