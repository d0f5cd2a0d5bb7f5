//! Chat completion backend
//!
//! Sends the serialized conversation to Azure `OpenAI` (deployment-scoped
//! endpoint, `api-key` header) or to any `OpenAI`-compatible endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::assistant::Generator;
use crate::config::{ChatConfig, ChatProvider};
use crate::history::Message;
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for chat completions
pub struct ChatClient {
    client: reqwest::Client,
    provider: ChatProvider,
    url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    /// Create a chat client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint, key or deployment is missing
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Config("chat endpoint required (OPENAI_API_BASE)".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("chat API key required (OPENAI_API_KEY)".to_string()))?;
        let model = config.deployment.clone().filter(|d| !d.is_empty()).ok_or_else(|| {
            Error::Config("chat deployment required (AZURE_OPENAI_DEPLOYMENT_NAME)".to_string())
        })?;

        let url = completions_url(config.provider, endpoint, &model, &config.api_version);

        tracing::debug!(provider = ?config.provider, url = %url, "chat client initialized");

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider,
            url,
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Request a completion for `messages`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response has no content
    pub async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: match self.provider {
                ChatProvider::Azure => None,
                ChatProvider::OpenAI => Some(self.model.as_str()),
            },
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(messages = messages.len(), "sending chat completion");

        let builder = self.client.post(&self.url).json(&request);
        let builder = match self.provider {
            ChatProvider::Azure => builder.header("api-key", self.api_key.expose_secret()),
            ChatProvider::OpenAI => builder.bearer_auth(self.api_key.expose_secret()),
        };

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Chat(format!("chat API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        parse_reply(result)
    }
}

#[async_trait(?Send)]
impl Generator for ChatClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.complete(messages).await
    }
}

/// Build the completions URL for a provider
fn completions_url(provider: ChatProvider, endpoint: &str, model: &str, api_version: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    match provider {
        ChatProvider::Azure => format!(
            "{base}/openai/deployments/{}/chat/completions?api-version={}",
            urlencoding::encode(model),
            urlencoding::encode(api_version)
        ),
        ChatProvider::OpenAI => format!("{base}/chat/completions"),
    }
}

fn parse_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Chat("response contained no message content".to_string()))
}
