//! Language-model engines.
//!
//! The query text is sent as a prompt and the completion comes back as text
//! output. These engines do not require the text to be valid SQL. Unlike the
//! database engine, failures propagate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Engine, Output};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::query::QueryString;

/// Canned completion returned by [`MockAiEngine`].
pub const MOCK_RESPONSE: &str = "SELECT\n42 AS select";

pub const DEFAULT_HF_MODEL: &str = "openai/gpt-oss-20b:fireworks-ai";
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/v1";

/// Offline engine that always answers with [`MOCK_RESPONSE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAiEngine;

impl Engine for MockAiEngine {
    fn name(&self) -> &str {
        "mockai"
    }

    fn run(&self, _query: &QueryString) -> Result<Output> {
        Ok(Output::Text(MOCK_RESPONSE.to_string()))
    }
}

/// Hugging Face inference router, OpenAI-compatible responses API.
#[derive(Debug, Clone)]
pub struct HfEngine {
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl ResponsesReply {
    /// First text part of the first message; reasoning items are skipped.
    fn text(&self) -> Option<&str> {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .find(|part| part.kind == "output_text")
            .and_then(|part| part.text.as_deref())
    }
}

impl HfEngine {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_HF_BASE_URL.to_string(),
            model: DEFAULT_HF_MODEL.to_string(),
            api_key,
        }
    }

    /// Credentials from `HF_API_KEY`, model and endpoint from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut engine = Self::new(settings.env_var("HF_API_KEY").map(str::to_string));
        if let Some(model) = &settings.hf_model {
            engine.model = model.clone();
        }
        if let Some(url) = &settings.hf_base_url {
            engine.base_url = url.clone();
        }
        engine
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn complete(&self, query: &QueryString) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Api("HF_API_KEY is not set".to_string()))?;
        let endpoint = format!("{}/responses", self.base_url.trim_end_matches('/'));

        let response = reqwest::blocking::Client::new()
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&ResponsesRequest {
                model: &self.model,
                input: query.as_str(),
            })
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Api(format!("{} - {}", status, body)));
        }

        let reply: ResponsesReply = response.json()?;
        if let Some(usage) = &reply.usage {
            if !query.is_quiet() {
                debug!(input_tokens = usage.input_tokens, "usage");
                debug!(output_tokens = usage.output_tokens, "usage");
            }
        }

        reply
            .text()
            .map(str::to_string)
            .ok_or_else(|| Error::Api("response contained no output text".to_string()))
    }
}

impl Engine for HfEngine {
    fn name(&self) -> &str {
        "hf"
    }

    fn run(&self, query: &QueryString) -> Result<Output> {
        Ok(Output::Text(self.complete(query)?))
    }
}
