//! Answer generation collaborator.
//!
//! A [`Generator`] turns a query plus an ordered context list into answer
//! text. Failures come back as [`GenerationError`] values; the retriever
//! turns them into failed candidates and never propagates them.
//!
//! [`GeminiGenerator`] calls the Google AI Studio `generateContent`
//! endpoint. Context is joined with newlines and cut to a whitespace-token
//! budget before the request is built.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, query: &str, context: &[String]) -> Result<String, GenerationError>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _query: &str, _context: &[String]) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: Option<String>,
    max_context_tokens: usize,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// A missing API key is not an error here; every `generate` call then
    /// fails with [`GenerationError::MissingCredential`].
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_context_tokens: config.max_context_tokens,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, query: &str, context: &[String]) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::MissingCredential("API key not found".to_string()))?;

        let context = trim_context(context, self.max_context_tokens);
        if context.is_empty() {
            return Err(GenerationError::EmptyContext);
        }

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": build_prompt(query, &context)}]}],
            "generation_config": {
                "temperature": self.temperature,
                "max_output_tokens": self.max_output_tokens,
            }
        });
        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, context_chars = context.len(), "requesting answer");

        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!("{}: {}", status, text)));
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        parse_answer(&json)
    }
}

/// First candidate's first text part.
fn parse_answer(json: &serde_json::Value) -> Result<String, GenerationError> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or(GenerationError::EmptyResponse)
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer the query \"{}\" using the context:\n\n{}\n\nYour response (start of reply):",
        query, context
    )
}

/// Join `docs` with newlines and keep at most `max_tokens` whitespace
/// tokens. Text within the budget keeps its original layout.
pub fn trim_context(docs: &[String], max_tokens: usize) -> String {
    let combined = docs.join("\n");
    let mut seen = 0;
    let mut in_token = false;
    for (i, ch) in combined.char_indices() {
        if ch.is_whitespace() {
            in_token = false;
        } else if !in_token {
            in_token = true;
            if seen == max_tokens {
                return combined[..i].trim().to_string();
            }
            seen += 1;
        }
    }
    combined.trim().to_string()
}

pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn context_within_budget_is_unchanged() {
        assert_eq!(trim_context(&docs(&["a b", "c"]), 10), "a b\nc");
    }

    #[test]
    fn context_is_cut_at_token_budget() {
        assert_eq!(trim_context(&docs(&["one two three", "four"]), 2), "one two");
        assert_eq!(trim_context(&docs(&["one two", "three four"]), 3), "one two\nthree");
    }

    #[test]
    fn blank_context_trims_to_empty() {
        assert_eq!(trim_context(&docs(&["  ", ""]), 100), "");
        assert_eq!(trim_context(&docs(&[]), 100), "");
    }

    #[test]
    fn prompt_has_fixed_shape() {
        assert_eq!(
            build_prompt("EUR outlook?", "ctx"),
            "Answer the query \"EUR outlook?\" using the context:\n\nctx\n\nYour response (start of reply):"
        );
    }

    #[test]
    fn answer_is_first_candidate_text() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Bullish bias."}]}}]
        });
        assert_eq!(parse_answer(&json).unwrap(), "Bullish bias.");
        assert_eq!(
            parse_answer(&serde_json::json!({"candidates": []})),
            Err(GenerationError::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn missing_key_is_a_credential_error() {
        let config = GenerationConfig {
            provider: "gemini".to_string(),
            api_key_env: "FXRAG_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GenerationConfig::default()
        };
        let generator = GeminiGenerator::new(&config).unwrap();
        let err = generator
            .generate("q", &docs(&["context"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn disabled_generator_fails() {
        assert_eq!(
            DisabledGenerator.generate("q", &docs(&["c"])).await,
            Err(GenerationError::Disabled)
        );
    }
}
