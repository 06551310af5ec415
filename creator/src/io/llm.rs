//! Chat backend abstraction for agent replies.
//!
//! The [`ChatBackend`] trait decouples agents from the HTTP API (currently an
//! OpenAI-compatible `/chat/completions` endpoint). Tests use scripted
//! backends that return predetermined replies without network access.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::description::{Segment, split_image_tags};
use crate::core::types::Role;
use crate::io::config::LlmConfig;

/// Author of a chat message, from the model's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Message body: plain text, or text and image parts for multimodal models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: ChatRole::User,
            content,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// A completion request on behalf of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Agent the request is made for. Not sent over the wire.
    #[serde(skip)]
    pub agent: Role,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Text reply from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Abstraction over chat completion backends.
pub trait ChatBackend {
    /// Produce the next assistant message for `request`.
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for &B {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        (**self).complete(request)
    }
}

/// Build the user-message content for an agent.
///
/// Multimodal agents get `<img path>` tags expanded into inline image parts;
/// everyone else receives the text verbatim.
pub fn message_content(text: &str, multimodal: bool) -> Result<MessageContent> {
    if !multimodal {
        return Ok(MessageContent::Text(text.to_string()));
    }
    let segments = split_image_tags(text);
    if !segments.iter().any(|s| matches!(s, Segment::Image(_))) {
        return Ok(MessageContent::Text(text.to_string()));
    }
    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => parts.push(ContentPart::Text {
                text: text.to_string(),
            }),
            Segment::Image(path) => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_data_url(Path::new(path))?,
                },
            }),
        }
    }
    Ok(MessageContent::Parts(parts))
}

/// Inline an image file as a base64 `data:` URL.
pub fn image_data_url(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Backend for OpenAI-compatible chat completion APIs.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenAiBackend {
    /// Create a backend from config. The API key is read from `api_key_env`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(env = %cfg.api_key_env, "no api key set; requests are sent unauthenticated");
        }
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            max_retries: cfg.max_retries,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        })
    }

    fn send_once(&self, request: &ChatRequest) -> Result<ChatReply, AttemptError> {
        let mut req = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .map_err(|e| AttemptError::Retryable(anyhow!(e).context("send chat request")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = anyhow!("chat api returned {status}: {body}");
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let parsed: ApiResponse = response
            .json()
            .map_err(|e| AttemptError::Fatal(anyhow!(e).context("parse chat response")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::Fatal(anyhow!("chat response has no choices")))?;
        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            usage: parsed.usage,
        })
    }
}

impl ChatBackend for OpenAiBackend {
    #[instrument(skip_all, fields(agent = %request.agent, model = %request.model, messages = request.messages.len()))]
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(request) {
                Ok(reply) => {
                    info!(
                        total_tokens = reply.usage.as_ref().map(|u| u.total_tokens),
                        "chat completion received"
                    );
                    return Ok(reply);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) => {
                    if attempt >= self.max_retries {
                        return Err(err.context(format!(
                            "chat request failed after {} attempts",
                            attempt + 1
                        )));
                    }
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, err = %err, "retrying chat request");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff: `base * 2^attempt`, capped at 64x.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(6))
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    use super::*;

    const OK_BODY: &str = r#"{"model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;

    /// Serve one canned response per connection, in order; returns the count served.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let mut served = 0;
            for (status, body) in responses {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().expect("content length");
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).expect("read body");

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .expect("write response");
                stream.flush().expect("flush");
                served += 1;
            }
            served
        });
        (base_url, handle)
    }

    fn local_backend(base_url: String, max_retries: u32) -> OpenAiBackend {
        let cfg = LlmConfig {
            base_url,
            api_key_env: "CREATOR_TEST_UNSET_API_KEY".to_string(),
            timeout_secs: 10,
            max_retries,
            retry_backoff_ms: 0,
            ..LlmConfig::default()
        };
        OpenAiBackend {
            client: Client::builder().no_proxy().build().expect("client"),
            ..OpenAiBackend::from_config(&cfg).expect("backend")
        }
    }

    fn hello_request() -> ChatRequest {
        ChatRequest {
            agent: Role::Coder,
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::system("be brief")],
            max_tokens: 10,
            temperature: None,
        }
    }

    #[test]
    fn server_error_is_retried_until_success() {
        let (base_url, server) = serve(vec![(503, "busy"), (200, OK_BODY)]);
        let backend = local_backend(base_url, 3);

        let reply = backend.complete(&hello_request()).expect("reply");
        assert_eq!(reply.content, "hello");
        assert_eq!(reply.model, "gpt-4o");
        assert_eq!(server.join().expect("server"), 2);
    }

    #[test]
    fn client_error_is_not_retried() {
        let (base_url, server) = serve(vec![(400, "bad request")]);
        let backend = local_backend(base_url, 3);

        let err = backend.complete(&hello_request()).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("400"), "{text}");
        assert!(text.contains("bad request"), "{text}");
        assert!(!text.contains("attempts"), "{text}");
        assert_eq!(server.join().expect("server"), 1);
    }

    #[test]
    fn retries_stop_after_max_retries() {
        let (base_url, server) = serve(vec![(500, "down"), (429, "slow down"), (502, "gateway")]);
        let backend = local_backend(base_url, 2);

        let err = backend.complete(&hello_request()).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("chat request failed after 3 attempts"), "{text}");
        assert!(text.contains("502"), "{text}");
        assert_eq!(server.join().expect("server"), 3);
    }

    #[test]
    fn text_only_agents_keep_image_tags_verbatim() {
        let content = message_content("see <img /nowhere/fig.png>", false).expect("content");
        assert_eq!(
            content,
            MessageContent::Text("see <img /nowhere/fig.png>".to_string())
        );
    }

    #[test]
    fn multimodal_content_inlines_images() {
        let temp = tempfile::tempdir().expect("tempdir");
        let image = temp.path().join("fig.png");
        fs::write(&image, [0x89, b'P', b'N', b'G']).expect("write image");
        let text = format!("Model: <img {}> end", image.display());

        let content = message_content(&text, true).expect("content");
        let MessageContent::Parts(parts) = content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "Model: ".to_string()
            }
        );
        let ContentPart::ImageUrl { image_url } = &parts[1] else {
            panic!("expected image part");
        };
        assert!(image_url.url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn multimodal_content_errors_on_missing_image() {
        let err = message_content("<img /definitely/missing.png>", true).unwrap_err();
        assert!(err.to_string().contains("read image"));
    }

    #[test]
    fn request_serializes_openai_shape() {
        let request = ChatRequest {
            agent: Role::Critics,
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::system("be strict"),
                ChatMessage::user(MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base64,AA==".to_string(),
                    },
                }])),
            ],
            max_tokens: 10,
            temperature: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("agent").is_none());
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["content"], "be strict");
        assert_eq!(json["messages"][1]["content"][0]["type"], "image_url");
    }

    #[test]
    fn retry_policy_covers_rate_limits_and_server_errors() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 30), Duration::from_millis(6400));
    }

    #[test]
    fn parses_api_response_with_null_content() {
        let raw = r#"{"id":"x","model":"gpt-4o","choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.choices.len(), 1);
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }
}
