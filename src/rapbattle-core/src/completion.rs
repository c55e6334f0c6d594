//! Text-generation client for an OpenAI-compatible chat completions API.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;

use crate::error::BattleError;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Source of generated text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the content of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BattleError>;
}

/// Chat completions over HTTP with a bearer key.
pub struct ChatCompletions {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl ChatCompletions {
    /// Build a client. Without an API key every request fails with a
    /// configuration error.
    pub fn new(
        api_base: &str,
        api_key: Option<&str>,
        model: impl Into<String>,
    ) -> Result<Self, BattleError> {
        let client = match api_key {
            Some(key) => {
                let http_client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(120))
                    .connect_timeout(Duration::from_secs(30))
                    .build()
                    .map_err(|e| {
                        BattleError::ConfigError(format!("Failed to create HTTP client: {}", e))
                    })?;

                let config = OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(api_base);

                Some(Client::with_config(config).with_http_client(http_client))
            }
            None => None,
        };

        Ok(Self {
            client,
            model: model.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl CompletionService for ChatCompletions {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BattleError> {
        let client = self.client.as_ref().ok_or_else(|| {
            BattleError::ConfigError("Text generation API key is required".to_string())
        })?;

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: request.system.into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: request.prompt.into(),
                name: None,
            }),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .messages(messages)
            .build()?;

        tracing::debug!(model = %self.model, "sending chat completion request");
        let response = client.chat().create(chat_request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}
