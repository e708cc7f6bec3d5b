//! Streaming text generation through OpenAI chat completions.
//!
//! Tokens arrive as server-sent events. A failure after the first token is
//! surfaced as [`VaultError::GenerationStream`]; tokens already yielded stay
//! with the caller.
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::VaultError;

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub type TokenStream = Box<dyn Iterator<Item = Result<String, VaultError>>>;

pub trait TextGenerator {
    fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

/// Iterator over the content deltas of an SSE body.
pub struct SseTokens<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> SseTokens<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn fail(&mut self, msg: String) -> Option<Result<String, VaultError>> {
        self.done = true;
        Some(Err(VaultError::GenerationStream(msg)))
    }
}

impl<R: BufRead> Iterator for SseTokens<R> {
    type Item = Result<String, VaultError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        while !self.done {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => self.done = true,
                Ok(_) => {}
                Err(e) => return self.fail(e.to_string()),
            }

            let Some(data) = line.trim().strip_prefix("data:") else {
                // blank separators, comments, event/id fields
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(c) => c,
                Err(e) => return self.fail(format!("invalid stream event: {e}")),
            };
            if let Some(err) = chunk.error {
                return self.fail(err.message);
            }
            if let Some(content) = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty())
            {
                return Some(Ok(content));
            }
        }
        None
    }
}

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiChat {
    /// Build the generator from `provider.*`.
    ///
    /// Fails with `UnsupportedProvider` for any type but `openai`, and with
    /// `MissingCredential` when the key variable is unset.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.provider.kind != "openai" {
            return Err(VaultError::UnsupportedProvider {
                kind: cfg.provider.kind.clone(),
            }
            .into());
        }
        let api_key = cfg.api_key().ok_or_else(|| VaultError::MissingCredential {
            env: cfg.provider.api_key_env.clone(),
        })?;

        // No overall timeout: a long answer may stream for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: cfg.provider.model.clone(),
            endpoint: OPENAI_CHAT_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl TextGenerator for OpenAiChat {
    fn stream(&self, prompt: &str) -> Result<TokenStream> {
        debug!("streaming completion from {}", self.model);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": true,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {text}");
        }

        Ok(Box::new(SseTokens::new(BufReader::new(resp))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokens(body: &str) -> Vec<Result<String, VaultError>> {
        SseTokens::new(Cursor::new(body.to_string())).collect()
    }

    #[test]
    fn test_parses_deltas_until_done() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        );
        let out: Vec<String> = tokens(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_mid_stream_error() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        );
        let out = tokens(body);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(&out[1], Err(VaultError::GenerationStream(m)) if m == "overloaded"));
    }

    #[test]
    fn test_garbage_event_is_stream_error() {
        let out = tokens("data: {not json\n");
        assert!(matches!(&out[0], Err(VaultError::GenerationStream(_))));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unsupported_provider() {
        let mut cfg = Config::default();
        cfg.provider.kind = "local-llm".into();
        let err = OpenAiChat::from_config(&cfg).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<VaultError>(),
            Some(VaultError::UnsupportedProvider { kind }) if kind == "local-llm"
        ));
    }

    #[test]
    fn test_missing_credential() {
        let mut cfg = Config::default();
        cfg.provider.api_key_env = "VAULTRAG_TEST_UNSET_KEY_4821".into();
        let err = OpenAiChat::from_config(&cfg).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<VaultError>(),
            Some(VaultError::MissingCredential { env }) if env == "VAULTRAG_TEST_UNSET_KEY_4821"
        ));
    }
}
