use anyhow::{Context, Result, anyhow, bail};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A file sent to the model alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    fn is_text(&self) -> bool {
        self.media_type.starts_with("text/") || self.media_type == "application/json"
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub attachment: Option<Attachment>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
            attachment: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// The text a model produced for a [`CompletionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub stop_reason: Option<String>,
}

/// A generic client for a hosted text-completion model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends one request and returns the model's text. Upstream failures are
    /// returned as errors carrying the provider's message; nothing is retried.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// A client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl AnthropicClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - The key sent in the `x-api-key` header.
    /// * `model` - The model identifier (e.g., "claude-sonnet-4-20250514").
    /// * `base_url` - API root, normally [`ANTHROPIC_API_BASE`].
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut content = Vec::new();
        let mut prompt = request.prompt.clone();

        if let Some(attachment) = &request.attachment {
            if attachment.is_text() {
                let text = String::from_utf8_lossy(&attachment.data);
                let name = attachment.file_name.as_deref().unwrap_or("attachment");
                prompt = format!("Contents of {name}:\n\n{text}\n\n{prompt}");
            } else {
                let kind = if attachment.media_type.starts_with("image/") {
                    "image"
                } else {
                    "document"
                };
                content.push(json!({
                    "type": kind,
                    "source": {
                        "type": "base64",
                        "media_type": attachment.media_type,
                        "data": STANDARD.encode(&attachment.data),
                    }
                }));
            }
        }
        content.push(json!({ "type": "text", "text": prompt }));

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = self.build_body(&request);
        debug!(model = %self.model, max_tokens = request.max_tokens, "Sending completion request");

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the completion API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, body = %error_text, "Completion API returned an error");
            bail!("Claude API error: {} {}", status.as_u16(), error_text);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to decode completion API response")?;

        if let Some(err) = parsed.error {
            bail!(
                "{}",
                err.message.unwrap_or_else(|| "Claude API error".to_string())
            );
        }

        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("Empty response from Claude"))?;

        Ok(Completion {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            stop_reason: parsed.stop_reason,
        })
    }
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut prompt = request.prompt;
        if let Some(attachment) = &request.attachment {
            if !attachment.is_text() {
                bail!(
                    "Attachments of type '{}' are not supported by this provider",
                    attachment.media_type
                );
            }
            let name = attachment.file_name.as_deref().unwrap_or("attachment");
            let text = String::from_utf8_lossy(&attachment.data);
            prompt = format!("Contents of {name}:\n\n{text}\n\n{prompt}");
        }

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        if let Some(system) = request.system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        );

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .max_completion_tokens(request.max_tokens);
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }
        let chat_request = args.build()?;

        let response = self.client.chat().create(chat_request).await?;
        let choice = response
            .choices
            .first()
            .context("No response choice from LLM")?;
        let text = choice
            .message
            .content
            .clone()
            .filter(|text| !text.is_empty())
            .context("No content in LLM response")?;
        let stop_reason = choice
            .finish_reason
            .as_ref()
            .map(|reason| format!("{reason:?}").to_lowercase());

        Ok(Completion {
            text,
            model: response.model,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new(
            "test-key".to_string(),
            "claude-test".to_string(),
            format!("{ANTHROPIC_API_BASE}/"),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        assert_eq!(client().base_url, ANTHROPIC_API_BASE);
    }

    #[test]
    fn test_body_for_plain_prompt() {
        let request = CompletionRequest::new("Hello", 512)
            .with_system("Be brief")
            .with_temperature(0.5);
        let body = client().build_body(&request);

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hello");
    }

    #[test]
    fn test_body_omits_optional_fields() {
        let body = client().build_body(&CompletionRequest::new("Hi", 16));
        assert!(body.get("system").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_pdf_attachment_becomes_document_block() {
        let request = CompletionRequest::new("Summarize", 1024).with_attachment(Attachment {
            file_name: Some("notes.pdf".to_string()),
            media_type: "application/pdf".to_string(),
            data: b"%PDF-1.4".to_vec(),
        });
        let body = client().build_body(&request);
        let content = &body["messages"][0]["content"];

        assert_eq!(content[0]["type"], "document");
        assert_eq!(content[0]["source"]["media_type"], "application/pdf");
        assert_eq!(content[0]["source"]["data"], STANDARD.encode(b"%PDF-1.4"));
        assert_eq!(content[1]["text"], "Summarize");
    }

    #[test]
    fn test_image_attachment_becomes_image_block() {
        let request = CompletionRequest::new("Describe", 256).with_attachment(Attachment {
            file_name: None,
            media_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });
        let body = client().build_body(&request);
        assert_eq!(body["messages"][0]["content"][0]["type"], "image");
    }

    #[test]
    fn test_text_attachment_is_inlined() {
        let request = CompletionRequest::new("List the topics", 256).with_attachment(Attachment {
            file_name: Some("guide.txt".to_string()),
            media_type: "text/plain".to_string(),
            data: b"Chapter 1: Cells".to_vec(),
        });
        let body = client().build_body(&request);
        let content = body["messages"][0]["content"].as_array().unwrap();

        assert_eq!(content.len(), 1);
        let text = content[0]["text"].as_str().unwrap();
        assert!(text.starts_with("Contents of guide.txt:"));
        assert!(text.contains("Chapter 1: Cells"));
        assert!(text.ends_with("List the topics"));
    }
}
