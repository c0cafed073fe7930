//! Private (direct) messages between two members

use crate::db::repositories::{PrivateMessageRepository, UserRepository};
use crate::models::{Conversation, NotificationKind, PrivateMessage, User, MAX_MESSAGE_LENGTH};
use crate::services::message::MessageServiceError;
use crate::services::notification::NotificationService;
use anyhow::Context;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PrivateMessageService {
    private_messages: Arc<dyn PrivateMessageRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl PrivateMessageService {
    pub fn new(
        private_messages: Arc<dyn PrivateMessageRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            private_messages,
            users,
            notifications,
        }
    }

    pub async fn send(&self, sender: &User, receiver_id: i64, content: &str) -> Result<PrivateMessage, MessageServiceError> {
        if sender.id == receiver_id {
            return Err(MessageServiceError::ValidationError(
                "You cannot send a message to yourself".to_string(),
            ));
        }
        let content = content.trim();
        if content.is_empty() || content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(MessageServiceError::ValidationError(format!(
                "Message must be between 1 and {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
        self.users
            .get_by_id(receiver_id)
            .await
            .context("Failed to get receiver")?
            .ok_or(MessageServiceError::NotFound("Receiver"))?;

        let message = self
            .private_messages
            .create(sender.id, receiver_id, content)
            .await
            .context("Failed to store private message")?;

        let name = sender.full_name();
        self.notifications
            .notify(
                receiver_id,
                NotificationKind::Message,
                &format!("New private message from {}", name),
                content,
                json!({ "messageId": message.id, "senderId": sender.id, "isPrivate": true }),
            )
            .await;

        Ok(message)
    }

    /// Both directions, oldest first. Incoming unread messages are marked read.
    pub async fn conversation(&self, user_id: i64, partner_id: i64) -> Result<Vec<PrivateMessage>, MessageServiceError> {
        self.private_messages
            .mark_read(partner_id, user_id)
            .await
            .context("Failed to mark conversation read")?;
        Ok(self
            .private_messages
            .conversation(user_id, partner_id)
            .await
            .context("Failed to load conversation")?)
    }

    /// One entry per partner, most recent conversation first
    pub async fn conversations(&self, user_id: i64) -> Result<Vec<Conversation>, MessageServiceError> {
        let partners = self
            .private_messages
            .partners(user_id)
            .await
            .context("Failed to list conversations")?;
        let unread = self
            .private_messages
            .unread_by_sender(user_id)
            .await
            .context("Failed to count unread messages")?;

        let ids: Vec<i64> = partners.iter().map(|(id, _)| *id).collect();
        let users: HashMap<i64, User> = self
            .users
            .get_many(&ids)
            .await
            .context("Failed to load conversation partners")?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(partners
            .into_iter()
            .filter_map(|(partner_id, last_message)| {
                users.get(&partner_id).map(|partner| Conversation {
                    partner: partner.summary(),
                    last_message,
                    unread_count: unread.get(&partner_id).copied().unwrap_or(0),
                })
            })
            .collect())
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, MessageServiceError> {
        Ok(self
            .private_messages
            .count_unread(user_id)
            .await
            .context("Failed to count unread messages")?)
    }
}
