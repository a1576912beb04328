//! HTTP client for the streaming generation endpoint.
//!
//! One outbound POST per inbound user turn. The credential is selected by
//! function mode with no fallback, the request body follows the backend's
//! chat-messages contract, and the streamed response is reassembled into
//! one complete answer bounded by a configured deadline.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use tracing::debug;

use sqlpilot_core::config::AiConfig;
use sqlpilot_core::types::FunctionMode;

use crate::assemble::StreamAssembler;
use crate::error::AiError;

/// One generation request, as received from the wire (minus correlation).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub mode: FunctionMode,
    /// Natural-language request (create mode) or SQL text (other modes).
    pub text: String,
    /// Target SQL dialect.
    pub dialect: String,
    /// Optional schema description appended to the prompt.
    pub schema_data: Option<serde_json::Value>,
    /// Flips to true when the request is cancelled; the streamed call is
    /// then dropped early so the connection closes.
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Seam between the orchestrator and the external generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce one complete answer for the request, or fail.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AiError>;
}

/// Client for the line-delimited streaming generation endpoint.
pub struct AiClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Build the mode-specific prompt around the user's text.
    fn build_prompt(request: &GenerationRequest) -> String {
        let dialect = &request.dialect;
        let text = &request.text;
        match request.mode {
            FunctionMode::Create => {
                let mut prompt = format!(
                    "Convert the natural language request into a {} SQL query.\n\n\
                     Request: {}\n\n\
                     Respond in the format:\n\
                     SQL: [generated SQL query]\n\
                     Explanation: [description of the query]\n\
                     Confidence: [number between 0 and 1]",
                    dialect, text
                );
                if let Some(schema) = &request.schema_data {
                    let rendered = serde_json::to_string_pretty(schema)
                        .unwrap_or_else(|_| schema.to_string());
                    prompt.push_str(&format!("\n\nDatabase schema:\n{}", rendered));
                }
                prompt
            }
            FunctionMode::Explain => format!(
                "Explain the following {} SQL query in detail:\n\n{}",
                dialect, text
            ),
            FunctionMode::Grammar => format!(
                "Validate the grammar of the following {} SQL query and correct it \
                 if necessary. Respond with the corrected SQL only:\n\n{}",
                dialect, text
            ),
            FunctionMode::Comment => format!(
                "Add explanatory comments to the following {} SQL query:\n\n{}",
                dialect, text
            ),
            FunctionMode::Transform => {
                format!("Convert the following SQL to {}:\n\n{}", dialect, text)
            }
        }
    }

    /// Issue the streaming call and reassemble the answer.
    async fn call_streaming(
        &self,
        query: &str,
        api_key: &str,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<String, AiError> {
        if cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
            return Err(AiError::Cancelled);
        }
        let body = json!({
            "inputs": {},
            "query": query,
            "response_mode": "streaming",
            "conversation_id": "",
            "user": self.config.user_id,
        });

        debug!(url = %self.config.base_url, "Calling generation backend");

        let response = self
            .http
            .post(&self.config.base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut assembler = StreamAssembler::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = wait_cancelled(&mut cancel) => {
                    // Dropping the stream here closes the connection.
                    return Err(AiError::Cancelled);
                }
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| AiError::Transport(e.to_string()))?;
            assembler.push(&String::from_utf8_lossy(&chunk))?;
            if assembler.is_complete() {
                // Stop reading; dropping the stream closes the connection.
                break;
            }
        }
        assembler.finish()
    }
}

/// Resolve once the cancel signal flips to true; pend forever when there
/// is no signal (or its sender went away without cancelling).
async fn wait_cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

#[async_trait]
impl GenerationBackend for AiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AiError> {
        // Fail fast on a missing credential, before any network traffic.
        let api_key = self.config.keys.key_for(request.mode);
        if api_key.trim().is_empty() {
            return Err(AiError::MissingCredential(request.mode));
        }
        let api_key = api_key.to_string();

        let prompt = Self::build_prompt(request);
        let deadline = std::time::Duration::from_secs(self.config.timeout_secs);

        let cancel = request.cancel.clone();
        match tokio::time::timeout(deadline, self.call_streaming(&prompt, &api_key, cancel)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(AiError::Timeout(self.config.timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpilot_core::config::AiKeys;

    fn request(mode: FunctionMode, text: &str) -> GenerationRequest {
        GenerationRequest {
            mode,
            text: text.to_string(),
            dialect: "mysql".to_string(),
            schema_data: None,
            cancel: None,
        }
    }

    // ---- Prompt building ----

    #[test]
    fn test_create_prompt_contains_request_and_dialect() {
        let prompt = AiClient::build_prompt(&request(FunctionMode::Create, "show orders"));
        assert!(prompt.contains("mysql"));
        assert!(prompt.contains("Request: show orders"));
        assert!(prompt.contains("SQL:"));
        assert!(!prompt.contains("Database schema"));
    }

    #[test]
    fn test_create_prompt_appends_schema() {
        let mut req = request(FunctionMode::Create, "show orders");
        req.schema_data = Some(serde_json::json!({"tables": ["orders"]}));
        let prompt = AiClient::build_prompt(&req);
        assert!(prompt.contains("Database schema:"));
        assert!(prompt.contains("orders"));
    }

    #[test]
    fn test_non_create_prompts_wrap_sql_text() {
        let sql = "SELECT 1";
        for (mode, marker) in [
            (FunctionMode::Explain, "Explain"),
            (FunctionMode::Grammar, "Validate"),
            (FunctionMode::Comment, "comments"),
            (FunctionMode::Transform, "Convert"),
        ] {
            let prompt = AiClient::build_prompt(&request(mode, sql));
            assert!(prompt.contains(marker), "mode {} missing '{}'", mode, marker);
            assert!(prompt.ends_with(sql));
        }
    }

    // ---- Credential isolation ----

    #[tokio::test]
    async fn test_missing_credential_fails_fast() {
        // Only 'create' is populated; 'explain' must fail without any
        // network traffic and without borrowing create's key.
        let config = AiConfig {
            keys: AiKeys {
                create: "create-key".to_string(),
                ..AiKeys::default()
            },
            ..AiConfig::default()
        };
        let client = AiClient::new(config);

        let result = client.generate(&request(FunctionMode::Explain, "SELECT 1")).await;
        assert!(matches!(
            result,
            Err(AiError::MissingCredential(FunctionMode::Explain))
        ));
    }

    #[tokio::test]
    async fn test_whitespace_credential_treated_as_missing() {
        let config = AiConfig {
            keys: AiKeys {
                grammar: "   ".to_string(),
                ..AiKeys::default()
            },
            ..AiConfig::default()
        };
        let client = AiClient::new(config);

        let result = client.generate(&request(FunctionMode::Grammar, "SELECT 1")).await;
        assert!(matches!(result, Err(AiError::MissingCredential(_))));
    }

    // ---- Cancellation ----

    #[tokio::test]
    async fn test_already_cancelled_call_fails_without_network() {
        let config = AiConfig {
            keys: AiKeys {
                create: "create-key".to_string(),
                ..AiKeys::default()
            },
            // Unroutable; reaching the network would hang or error as
            // Transport, not Cancelled.
            base_url: "http://192.0.2.1:9/v1/chat-messages".to_string(),
            ..AiConfig::default()
        };
        let client = AiClient::new(config);

        let (signal, receiver) = tokio::sync::watch::channel(false);
        signal.send(true).unwrap();

        let mut req = request(FunctionMode::Create, "show orders");
        req.cancel = Some(receiver);

        let result = client.generate(&req).await;
        assert!(matches!(result, Err(AiError::Cancelled)));
    }
}
