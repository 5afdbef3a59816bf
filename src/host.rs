//! The command surface the UI talks to: `send_content`, `load_conversations`
//! and `save_conversations`.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{ConversationId, Turn};
use crate::llm::LlmClient;
use crate::storage::ConversationStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;

/// Reply to `send_content`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendContentResponse {
    pub id: ConversationId,
    pub content: String,
}

#[async_trait]
pub trait HostCommands: Send + Sync {
    /// Generate the assistant reply for a conversation
    async fn send_content(
        &self,
        conversation_id: &ConversationId,
        messages: &[Turn],
    ) -> Result<SendContentResponse>;

    /// Serialized conversation map, or `None` when nothing was saved yet
    async fn load_conversations(&self) -> Result<Option<String>>;

    async fn save_conversations(&self, conversation_map: String) -> Result<()>;
}

/// Host backed by a JSON file and an HTTP model endpoint
pub struct LocalHost {
    llm: LlmClient,
    store: ConversationStore,
}

impl LocalHost {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            llm: LlmClient::new(config.clone())?,
            store: ConversationStore::new(&config.data_dir),
        })
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| Error::Io(io::Error::other(err)))?
}

#[async_trait]
impl HostCommands for LocalHost {
    async fn send_content(
        &self,
        conversation_id: &ConversationId,
        messages: &[Turn],
    ) -> Result<SendContentResponse> {
        let content = self.llm.complete(messages).await?;
        Ok(SendContentResponse {
            id: conversation_id.clone(),
            content,
        })
    }

    async fn load_conversations(&self) -> Result<Option<String>> {
        let store = self.store.clone();
        blocking(move || store.load()).await
    }

    async fn save_conversations(&self, conversation_map: String) -> Result<()> {
        let store = self.store.clone();
        blocking(move || store.save(&conversation_map)).await
    }
}
