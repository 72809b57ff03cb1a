//! Vision model clients and response parsing.
//!
//! Providers only move bytes and text; turning the model's reply into tags is
//! done here so every provider is held to the same schema.

mod anthropic;
mod openai;

pub use anthropic::AnthropicVisionClient;
pub use openai::OpenAiVisionClient;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use picflow_core::config::{VisionConfig, VisionProviderKind};
use picflow_core::constants::MAX_TAG_NAME_CHARS;
use serde::Deserialize;
use std::sync::Arc;

/// Fixed instruction sent with every enrichment request.
pub const SYSTEM_INSTRUCTION: &str = "你是一个图片标注助手。请分析用户提供的照片，并且只返回一个严格的 JSON 对象，不要输出任何其他文字。\
JSON 格式如下：\
{\"summary\": \"一句话中文描述照片内容\", \
\"scene_tags\": [\"场景标签\"], \
\"object_tags\": [\"物体标签\"], \
\"style_tags\": [\"风格标签\"]}。\
每个标签为简短的中文词语，每类不超过 5 个。";

/// User-turn text accompanying the image.
pub const USER_PROMPT: &str = "请为这张照片生成描述和标签。";

/// JPEG copy of an asset, already bounded for transport.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub jpeg: Vec<u8>,
}

impl VisionImage {
    pub const MEDIA_TYPE: &'static str = "image/jpeg";

    pub fn new(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MEDIA_TYPE, self.to_base64())
    }
}

/// A vision-capable chat model.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send one image with a system instruction and return the raw text reply.
    async fn describe(&self, image: &VisionImage, instruction: &str) -> Result<String>;
}

/// Build the configured provider, or `None` when no credential is set.
pub fn from_config(config: &VisionConfig) -> Result<Option<Arc<dyn VisionProvider>>> {
    let Some(api_key) = config.api_key.as_deref().filter(|_| config.is_enabled()) else {
        return Ok(None);
    };

    let provider: Arc<dyn VisionProvider> = match config.provider {
        VisionProviderKind::OpenAi => Arc::new(OpenAiVisionClient::new(
            &config.api_base,
            api_key,
            &config.model,
            config.timeout,
        )?),
        VisionProviderKind::Anthropic => Arc::new(AnthropicVisionClient::new(
            &config.api_base,
            api_key,
            &config.model,
            config.timeout,
        )?),
    };

    Ok(Some(provider))
}

#[derive(Debug, thiserror::Error)]
pub enum VisionParseError {
    #[error("vision response is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("vision response does not match the expected schema: {0}")]
    Schema(String),
}

/// Reply fields as the model may send them. Absent and `null` are both allowed;
/// a present field of the wrong type fails the schema check.
#[derive(Debug, Default, Deserialize)]
struct PartialAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    scene_tags: Option<Vec<String>>,
    #[serde(default)]
    object_tags: Option<Vec<String>>,
    #[serde(default)]
    style_tags: Option<Vec<String>>,
}

/// Validated model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionAnalysis {
    pub summary: Option<String>,
    /// scene, then object, then style tags; trimmed and de-duplicated.
    pub tags: Vec<String>,
}

impl VisionAnalysis {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.tags.is_empty()
    }

    pub fn parse(text: &str) -> Result<Self, VisionParseError> {
        let json_text = strip_code_fences(text);
        let value: serde_json::Value =
            serde_json::from_str(json_text).map_err(VisionParseError::NotJson)?;

        if !value.is_object() {
            return Err(VisionParseError::Schema(
                "top-level value is not an object".to_string(),
            ));
        }

        let partial: PartialAnalysis = serde_json::from_value(value)
            .map_err(|e| VisionParseError::Schema(e.to_string()))?;

        let mut tags: Vec<String> = Vec::new();
        let lists = [partial.scene_tags, partial.object_tags, partial.style_tags];
        for name in lists.into_iter().flatten().flatten() {
            let name = name.trim();
            if name.is_empty() || name.chars().count() > MAX_TAG_NAME_CHARS {
                continue;
            }
            if !tags.iter().any(|t| t == name) {
                tags.push(name.to_string());
            }
        }

        let summary = partial
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self { summary, tags })
    }
}

/// Remove a Markdown code fence (with optional info string) around the reply.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(open) = text.find("```") else {
        return text;
    };

    let after_open = &text[open + 3..];
    let body = match after_open.rfind("```") {
        Some(close) => &after_open[..close],
        None => after_open,
    };

    // Info string, e.g. ```json
    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_strips_json_fence() {
        let text = "```json\n{\"summary\": \"海边\"}\n```";
        assert_eq!(strip_code_fences(text), "{\"summary\": \"海边\"}");
    }

    #[test]
    fn test_strips_bare_fence_and_prose() {
        let text = "Here you go:\n```\n{\"a\": 1}\n```\nEnjoy";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn test_unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_parses_full_reply() {
        let analysis = VisionAnalysis::parse(
            r#"```json
            {
                "summary": " 夕阳下的海滩 ",
                "scene_tags": ["海滩", "日落"],
                "object_tags": ["海浪", "海滩"],
                "style_tags": ["暖色调", ""]
            }
            ```"#,
        )
        .unwrap();

        assert_eq!(analysis.summary.as_deref(), Some("夕阳下的海滩"));
        assert_eq!(analysis.tags, vec!["海滩", "日落", "海浪", "暖色调"]);
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let analysis =
            VisionAnalysis::parse(r#"{"scene_tags": ["Beach"], "object_tags": ["beach"]}"#).unwrap();
        assert_eq!(analysis.tags, vec!["Beach", "beach"]);
        assert!(analysis.summary.is_none());
    }

    #[test]
    fn test_null_and_missing_fields_are_allowed() {
        let analysis = VisionAnalysis::parse(r#"{"summary": null, "scene_tags": null}"#).unwrap();
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_overlong_tags_are_dropped() {
        let long = "长".repeat(MAX_TAG_NAME_CHARS + 1);
        let analysis =
            VisionAnalysis::parse(&format!(r#"{{"scene_tags": ["{}", "ok"]}}"#, long)).unwrap();
        assert_eq!(analysis.tags, vec!["ok"]);
    }

    #[test]
    fn test_non_json_is_rejected() {
        assert!(matches!(
            VisionAnalysis::parse("I cannot see the image."),
            Err(VisionParseError::NotJson(_))
        ));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        assert!(matches!(
            VisionAnalysis::parse(r#"{"summary": 42}"#),
            Err(VisionParseError::Schema(_))
        ));
        assert!(matches!(
            VisionAnalysis::parse(r#"{"scene_tags": "beach"}"#),
            Err(VisionParseError::Schema(_))
        ));
        assert!(matches!(
            VisionAnalysis::parse(r#"["beach"]"#),
            Err(VisionParseError::Schema(_))
        ));
    }

    #[test]
    fn test_data_url_is_base64_jpeg() {
        let image = VisionImage::new(vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_missing_credential_disables_provider() {
        let config = VisionConfig {
            provider: VisionProviderKind::OpenAi,
            api_key: None,
            api_base: "https://api.siliconflow.cn/v1".into(),
            model: "m".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(from_config(&config).unwrap().is_none());
    }
}
