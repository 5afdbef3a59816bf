use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Internal application events for coordinating between the UI task and background work
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A reply request finished, successfully or not
    Reply(ReplyEnvelope),
}

/// Outcome of one `send_content` request, tagged with the conversation it belongs to.
///
/// Content is routed by `conversation_id`, never by completion order.
/// `requested_id` is the conversation that issued the request; it differs
/// only when the host answers for another id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEnvelope {
    pub conversation_id: ConversationId,
    pub requested_id: ConversationId,
    pub outcome: std::result::Result<String, String>,
}

impl ReplyEnvelope {
    pub fn success(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            requested_id: conversation_id.clone(),
            conversation_id,
            outcome: Ok(content.into()),
        }
    }

    pub fn failure(conversation_id: ConversationId, message: impl Into<String>) -> Self {
        Self {
            requested_id: conversation_id.clone(),
            conversation_id,
            outcome: Err(message.into()),
        }
    }

    /// Record which conversation issued the request
    pub fn requested_by(mut self, requested_id: ConversationId) -> Self {
        self.requested_id = requested_id;
        self
    }
}

/// Role in conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

impl ConversationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationRole::User => "user",
            ConversationRole::Assistant => "assistant",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConversationRole::User => "You",
            ConversationRole::Assistant => "Assistant",
        }
    }
}

/// One message exchanged in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: ConversationRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            content: content.into(),
        }
    }
}

/// Opaque conversation identifier, minted from the creation time in milliseconds.
///
/// Numeric ids order by value and sort before any non-numeric id, so the
/// persisted map iterates in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_timestamp_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    /// Mint an id from the current time, stepping forward past any id for which `taken` holds.
    pub fn generate(taken: impl Fn(&ConversationId) -> bool) -> Self {
        Self::generate_at(Utc::now().timestamp_millis(), taken)
    }

    pub fn generate_at(mut millis: i64, taken: impl Fn(&ConversationId) -> bool) -> Self {
        loop {
            let candidate = Self::from_timestamp_millis(millis);
            if !taken(&candidate) {
                return candidate;
            }
            millis += 1;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time, when the id is a timestamp
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    fn sort_key(&self) -> (bool, u64, &str) {
        match self.0.parse::<u64>() {
            Ok(value) => (false, value, &self.0),
            Err(_) => (true, 0, &self.0),
        }
    }
}

impl Ord for ConversationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ConversationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
