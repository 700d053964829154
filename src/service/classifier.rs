//! External AI message classifier
//!
//! One HTTP call per inspected message against the Perplexity
//! chat-completions API, with a 15-second hard budget. The contract is
//! deliberately forgiving: any deviation (non-200, timeout, malformed
//! JSON, unknown fields) yields the `none` verdict and the message is left
//! alone.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;

const ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const TIMEOUT: Duration = Duration::from_secs(15);
const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "\
You are a chat moderation classifier. Analyze the message and respond with \
a single JSON object, no prose: {\"violation\": bool, \"severity\": \
\"none\"|\"low\"|\"medium\"|\"high\"|\"critical\", \"action\": \
\"none\"|\"warn\"|\"mute\"|\"ban\", \"reason\": string}. Taxonomy: spam, \
scam, insults, harassment, threats of violence, doxxing, sexual content \
involving minors. Escalate action with severity; use \"none\" when the \
message is acceptable.";

/// Classifier verdict severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Action the classifier recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictAction {
    #[default]
    None,
    Warn,
    Mute,
    Ban,
}

/// Structured classifier response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub violation: bool,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub action: VerdictAction,
    #[serde(default)]
    pub reason: String,
}

impl Verdict {
    /// The do-nothing verdict every failure mode maps to.
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Classification seam consumed by the message inspector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageClassifier: Send + Sync {
    /// Classify one message. Must not fail; failures map to [`Verdict::none`].
    async fn classify(&self, text: &str) -> Verdict;
}

pub struct Classifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl Classifier {
    pub fn new(api_key: String, model: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent("ChatWarden/0.1.0")
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            api_key,
            model,
        })
    }

    async fn request(&self, text: &str) -> Result<Verdict, AppError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Analyze:\n\n{text}")},
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        let response = self
            .http
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Classifier(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AppError::Classifier("empty choices".to_string()))?;

        parse_verdict(content)
            .ok_or_else(|| AppError::Classifier("malformed verdict JSON".to_string()))
    }
}

#[async_trait]
impl MessageClassifier for Classifier {
    /// Classifier errors are logged and mapped to the `none` verdict, so
    /// moderation degrades to a no-op rather than blocking.
    async fn classify(&self, text: &str) -> Verdict {
        match self.request(text).await {
            Ok(verdict) => verdict,
            Err(error) => {
                tracing::warn!(%error, "Classifier call failed; treating as no violation");
                Verdict::none()
            }
        }
    }
}

/// Decode the assistant message content into a verdict, tolerating an
/// optional ``` fence (with or without a language tag).
fn parse_verdict(content: &str) -> Option<Verdict> {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest)
        })
        .unwrap_or(trimmed);

    serde_json::from_str(inner.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_verdict_parses() {
        let verdict = parse_verdict(
            r#"{"violation": true, "severity": "high", "action": "ban", "reason": "threats"}"#,
        )
        .unwrap();

        assert!(verdict.violation);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.action, VerdictAction::Ban);
        assert_eq!(verdict.reason, "threats");
    }

    #[test]
    fn fenced_verdict_parses() {
        let content = "```json\n{\"violation\": true, \"severity\": \"low\", \"action\": \"warn\", \"reason\": \"spam\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.action, VerdictAction::Warn);
    }

    #[test]
    fn fence_without_language_tag_parses() {
        let content = "```\n{\"violation\": false, \"severity\": \"none\", \"action\": \"none\", \"reason\": \"\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert!(!verdict.violation);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let verdict = parse_verdict(r#"{"violation": true}"#).unwrap();
        assert_eq!(verdict.action, VerdictAction::None);
        assert_eq!(verdict.severity, Severity::None);
    }

    #[test]
    fn garbage_yields_no_verdict() {
        assert!(parse_verdict("I think this message is fine.").is_none());
        assert!(parse_verdict("").is_none());
        assert!(parse_verdict(r#"{"action": "kick"}"#).is_none());
    }
}
