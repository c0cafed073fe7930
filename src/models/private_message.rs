//! Private (direct) message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// One entry in the inbox: the partner, the latest message and what is still unread
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub partner: UserSummary,
    pub last_message: PrivateMessage,
    pub unread_count: i64,
}
