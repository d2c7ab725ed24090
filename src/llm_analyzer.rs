/// Out-of-scope LLM root-cause analyzer (spec.md Non-goals / SPEC_FULL §4.9).
///
/// Captured only to the extent the `/anomalies/analyze` endpoint needs a
/// concrete return type; no retry loop, no prompt templating beyond a single
/// request, no caching. Grounded in the upstream `LLMAnalyzerService`'s fixed
/// three-section response shape, with the Gemini-specific request/response
/// envelope replaced by the teacher's plain `reqwest` + Ollama client style.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub anomaly_detection: Value,
    pub root_cause_analysis: Value,
    pub recommendations: Value,
}

pub struct LlmAnalyzer {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl LlmAnalyzer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Analyze a single log's surrounding context. Returns the raw JSON the
    /// model produced, parsed into the fixed three-section shape; a
    /// malformed or unreachable model is surfaced to the caller rather than
    /// retried, since this endpoint sits outside the core pipeline's error
    /// budget.
    pub async fn analyze(&self, prompt: &str) -> anyhow::Result<LlmAnalysis> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("llm analyzer request failed with status {}", response.status());
        }

        let raw: Value = response.json().await?;
        let text = raw
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("llm response missing 'response' field"))?;

        let parsed: LlmAnalysis = serde_json::from_str(text.trim())?;
        Ok(parsed)
    }
}
