//! Optional AI framing around a deterministic script
//!
//! The enricher writes a short tone-matched addition that is appended after
//! the deterministic text; it can never replace it. Any failure, timeout or
//! empty reply leaves the deterministic script alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::script::{CommunicationStyle, InversionScript, ScriptSource};
use crate::error::{BlueprintError, Result};
use crate::physics::state::Axis;
use crate::severity::SeverityBand;

/// Enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// OpenAI-compatible base URL
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 3000,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "BLUEPRINT_ENRICHMENT_API_KEY".to_string(),
        }
    }
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// What the enricher may see about the user
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    pub communication_style: CommunicationStyle,
    /// Titles of recent events, newest first
    pub recent_history: Vec<String>,
    pub band: Option<SeverityBand>,
    pub primary_axis: Option<Axis>,
}

/// Writes a short addition for a script
#[async_trait]
pub trait TextEnricher: Send + Sync {
    fn name(&self) -> &str;

    /// Sentences to append after `script`
    async fn enrich(&self, script: &str, context: &EnrichmentContext) -> Result<String>;
}

/// Run `enricher` under a deadline and append its reply; on any failure
/// return `script` unchanged
pub async fn enrich_with_timeout(
    enricher: &dyn TextEnricher,
    script: InversionScript,
    context: &EnrichmentContext,
    timeout: Duration,
) -> InversionScript {
    match tokio::time::timeout(timeout, enricher.enrich(&script.deterministic_script, context)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            debug!(enricher = enricher.name(), "script enriched");
            InversionScript {
                script: format!("{}\n\n{}", script.deterministic_script, text.trim()),
                source: ScriptSource::AiGenerated,
                ..script
            }
        }
        Ok(Ok(_)) => {
            warn!(enricher = enricher.name(), "enricher returned empty text, keeping deterministic script");
            script
        }
        Ok(Err(e)) => {
            warn!(enricher = enricher.name(), error = %e, "enrichment failed, keeping deterministic script");
            script
        }
        Err(_) => {
            warn!(
                enricher = enricher.name(),
                timeout_ms = timeout.as_millis() as u64,
                "enrichment timed out, keeping deterministic script"
            );
            script
        }
    }
}

/// OpenAI-compatible chat completions client
#[derive(Debug, Clone)]
pub struct HttpEnricher {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl HttpEnricher {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.4,
            max_tokens: 400,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the key from the configured variable
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(&config.endpoint, &config.model, api_key)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn system_prompt(context: &EnrichmentContext) -> String {
        let tone = match context.communication_style {
            CommunicationStyle::Warm => "warm and encouraging",
            CommunicationStyle::Direct => "direct and brief",
            CommunicationStyle::Analytical => "calm and analytical",
            CommunicationStyle::Gentle => "gentle and unhurried",
        };
        let mut prompt = format!(
            "Write at most two sentences to follow the guidance below: one in a {} tone \
             acknowledging it, and one connecting it to the recent events if any are listed. \
             Do not repeat, contradict or change the guidance. Do not add medical advice. \
             Reply with those sentences only.\n",
            tone
        );
        if let Some(band) = context.band {
            prompt.push_str(&format!("Severity band: {}\n", band));
        }
        if let Some(axis) = context.primary_axis {
            prompt.push_str(&format!("Most strained area: {}\n", axis));
        }
        if !context.recent_history.is_empty() {
            prompt.push_str(&format!("Recent events: {}\n", context.recent_history.join("; ")));
        }
        prompt
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl TextEnricher for HttpEnricher {
    fn name(&self) -> &str {
        "http"
    }

    async fn enrich(&self, script: &str, context: &EnrichmentContext) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt(context),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: script.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self
            .http_client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| BlueprintError::Enrichment(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlueprintError::Enrichment(format!("API error ({}): {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BlueprintError::Enrichment(format!("bad response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BlueprintError::Enrichment("no choices returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;
    struct Failing;
    struct Echo;

    #[async_trait]
    impl TextEnricher for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn enrich(&self, script: &str, _: &EnrichmentContext) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(format!("late: {}", script))
        }
    }

    #[async_trait]
    impl TextEnricher for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn enrich(&self, _: &str, _: &EnrichmentContext) -> Result<String> {
            Err(BlueprintError::Enrichment("upstream down".into()))
        }
    }

    #[async_trait]
    impl TextEnricher for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn enrich(&self, script: &str, _: &EnrichmentContext) -> Result<String> {
            Ok(format!("  You said: {}  ", script.len()))
        }
    }

    struct Hijack;

    #[async_trait]
    impl TextEnricher for Hijack {
        fn name(&self) -> &str {
            "hijack"
        }
        async fn enrich(&self, _: &str, _: &EnrichmentContext) -> Result<String> {
            Ok("OK.".into())
        }
    }

    fn script() -> InversionScript {
        InversionScript {
            script: "Slow down.".into(),
            deterministic_script: "Slow down.".into(),
            experiments: vec!["Walk".into()],
            source: ScriptSource::Deterministic,
            band: SeverityBand::Friction,
            gates_consulted: vec![34],
            personalizations: vec![],
        }
    }

    #[tokio::test]
    async fn test_timeout_keeps_deterministic() {
        let out = enrich_with_timeout(&Slow, script(), &EnrichmentContext::default(), Duration::from_millis(20)).await;
        assert_eq!(out, script());
    }

    #[tokio::test]
    async fn test_failure_keeps_deterministic() {
        let out = enrich_with_timeout(&Failing, script(), &EnrichmentContext::default(), Duration::from_secs(1)).await;
        assert_eq!(out.source, ScriptSource::Deterministic);
        assert_eq!(out.script, "Slow down.");
    }

    #[tokio::test]
    async fn test_success_marks_ai_generated() {
        let out = enrich_with_timeout(&Echo, script(), &EnrichmentContext::default(), Duration::from_secs(1)).await;
        assert_eq!(out.source, ScriptSource::AiGenerated);
        assert_eq!(out.script, "Slow down.\n\nYou said: 10");
        assert_eq!(out.experiments, vec!["Walk".to_string()]);
    }

    #[tokio::test]
    async fn test_unrelated_reply_cannot_erase_deterministic_text() {
        let out = enrich_with_timeout(&Hijack, script(), &EnrichmentContext::default(), Duration::from_secs(1)).await;
        assert_eq!(out.source, ScriptSource::AiGenerated);
        assert_eq!(out.deterministic_script, "Slow down.");
        assert!(out.script.starts_with("Slow down."));
        assert!(out.script.ends_with("OK."));
    }

    #[test]
    fn test_system_prompt_carries_context() {
        let ctx = EnrichmentContext {
            communication_style: CommunicationStyle::Direct,
            recent_history: vec!["Deadline moved".into()],
            band: Some(SeverityBand::Breakpoint),
            primary_axis: Some(Axis::Autonomy),
        };
        let prompt = HttpEnricher::system_prompt(&ctx);
        assert!(prompt.contains("direct"));
        assert!(prompt.contains("autonomy"));
        assert!(prompt.contains("Deadline moved"));
    }
}
