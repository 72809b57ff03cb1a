//! OpenAI-compatible chat completions (OpenAI, SiliconFlow, vLLM).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use super::{VisionImage, VisionProvider, USER_PROMPT};

const MAX_TOKENS: u32 = 1024;

pub struct OpenAiVisionClient {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl Debug for OpenAiVisionClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OpenAiVisionClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
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

impl OpenAiVisionClient {
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for vision API")?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl VisionProvider for OpenAiVisionClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn describe(&self, image: &VisionImage, instruction: &str) -> Result<String> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": instruction
                },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": image.to_data_url() }
                        },
                        {
                            "type": "text",
                            "text": USER_PROMPT
                        }
                    ]
                }
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": 0.2
        });

        tracing::debug!(
            model = %self.model,
            image_size = image.jpeg.len(),
            "Sending vision request to chat completions API"
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to vision API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&error_text) {
                if let Some(message) = error_json
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                {
                    return Err(anyhow::anyhow!(
                        "Vision API error: {} - Status: {}",
                        message,
                        status
                    ));
                }
            }

            return Err(anyhow::anyhow!(
                "Vision API request failed: {} - {}",
                status,
                error_text
            ));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse vision API response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("No content in vision API response")
    }
}
