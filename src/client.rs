use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ResolvedConfig;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

// ── Model response after streaming completes ──────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ── SSE delta types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageStats>,
    /// Set when the server fails mid-stream after already answering 200
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageStats {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ── SSE decoder ───────────────────────────────────────────────────────────────

/// Incremental decoder for the `data:` lines of an OpenAI-style event stream.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// only complete lines are decoded; the tail stays buffered until the next push.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamChunk>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(chunk) = self.decode_line(&line)? {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    /// Decode whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Result<Vec<StreamChunk>> {
        let rest = std::mem::take(&mut self.buf);
        Ok(self.decode_line(&rest)?.into_iter().collect())
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<Option<StreamChunk>> {
        if self.done {
            return Ok(None);
        }
        let line = std::str::from_utf8(raw).context("stream line is not valid UTF-8")?;
        let line = line.trim_end_matches(['\r', '\n']);
        // Blank separators, `:` comments, and `event:`/`id:` fields carry nothing we use.
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim_start();
        if data.is_empty() {
            return Ok(None);
        }
        if data.trim_end() == "[DONE]" {
            self.done = true;
            return Ok(None);
        }
        let chunk = serde_json::from_str(data)
            .with_context(|| format!("malformed stream frame: {data}"))?;
        Ok(Some(chunk))
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Client {
    http: reqwest::Client,
    pub endpoint: String,
    pub model: String,
    api_key: Option<String>,
    seed: Option<i64>,
}

impl Client {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            model,
            api_key: None,
            seed: None,
        }
    }

    /// Build a client from the merged profile + CLI settings.
    pub fn from_resolved(resolved: &ResolvedConfig) -> Result<Self> {
        let mut client = Self::new(resolved.endpoint.clone(), resolved.model.clone());
        if let Some(key) = &resolved.api_key {
            client.set_api_key(key.clone());
        }
        client.set_seed(resolved.seed);
        client.set_connect_timeout(Duration::from_secs(resolved.connect_timeout_secs))?;
        Ok(client)
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    pub fn set_seed(&mut self, seed: Option<i64>) {
        self.seed = seed;
    }

    /// Bound how long establishing the connection may take. The body itself
    /// streams for as long as the server keeps sending.
    pub fn set_connect_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(())
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    /// Stream a chat completion. Calls `on_text` for each text chunk as it arrives.
    /// Returns the complete response once streaming finishes.
    pub async fn chat(
        &self,
        system: Option<&str>,
        messages: &[Message],
        on_text: impl Fn(&str),
    ) -> Result<ModelResponse> {
        let mut body = serde_json::json!({
            "model": self.model,
            "stream": true,
            "stream_options": {"include_usage": true},
            "messages": build_messages(system, messages),
        });
        if let Some(seed) = self.seed {
            body["seed"] = serde_json::json!(seed);
        }

        let url = self.completions_url();
        tracing::debug!(%url, model = %self.model, messages = messages.len(), "sending chat request");

        let mut req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "chat request rejected");
            return Err(anyhow!("API error {}: {}", status, text));
        }

        let mut stream = resp.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut response = ModelResponse::default();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.context("stream interrupted")?;
            for chunk in decoder.push(&bytes)? {
                absorb(&mut response, chunk, &on_text)?;
            }
            if decoder.is_done() {
                break;
            }
        }
        for chunk in decoder.finish()? {
            absorb(&mut response, chunk, &on_text)?;
        }

        tracing::debug!(
            chars = response.text.len(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("-"),
            "chat stream complete"
        );
        Ok(response)
    }
}

fn absorb(response: &mut ModelResponse, chunk: StreamChunk, on_text: &impl Fn(&str)) -> Result<()> {
    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        tracing::warn!(%message, "error frame in chat stream");
        return Err(anyhow!("API error: {message}"));
    }
    if let Some(usage) = chunk.usage {
        response.input_tokens = usage.prompt_tokens.unwrap_or(0);
        response.output_tokens = usage.completion_tokens.unwrap_or(0);
    }
    // Only the first choice is ever requested.
    let Some(choice) = chunk.choices.unwrap_or_default().into_iter().next() else {
        return Ok(());
    };
    if let Some(text) = choice.delta.and_then(|d| d.content) {
        if !text.is_empty() {
            tracing::trace!(delta = %text);
            on_text(&text);
            response.text.push_str(&text);
        }
    }
    if choice.finish_reason.is_some() {
        response.finish_reason = choice.finish_reason;
    }
    Ok(())
}

// ── Build the messages array for the API ──────────────────────────────────────

fn build_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system.filter(|s| !s.is_empty()) {
        out.push(serde_json::json!(Message::system(system)));
    }
    out.extend(messages.iter().map(|m| serde_json::json!(m)));

    out
}
