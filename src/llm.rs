use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::Turn;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, instrument};

/// Message in the chat-completions wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<LlmMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct LlmClient {
    config: Config,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn messages(&self, turns: &[Turn]) -> Vec<LlmMessage> {
        let system = self
            .config
            .system_prompt
            .as_ref()
            .filter(|prompt| !prompt.trim().is_empty())
            .map(|prompt| LlmMessage {
                role: "system".to_string(),
                content: prompt.clone(),
            });

        system
            .into_iter()
            .chain(turns.iter().map(|turn| LlmMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            }))
            .collect()
    }

    /// Ask for the next assistant reply given the conversation so far
    #[instrument(level = "debug", skip(self, turns), fields(turns = turns.len(), model = %self.config.model))]
    pub async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let api_key = self.config.api_key().ok_or_else(|| {
            Error::Config(format!(
                "No API key configured. Set api_key in the config file or {}.",
                self.config.api_key_env
            ))
        })?;

        let payload = ChatRequest {
            model: &self.config.model,
            messages: self.messages(turns),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {error_text}")));
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "Received reply");
        parse_reply(&body)
    }
}

fn parse_reply(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::Api("Reply contained no content".to_string()))
}
