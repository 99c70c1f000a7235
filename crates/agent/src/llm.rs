//! Upstream completion client. One endpoint pair: plain chat completions
//! and the same route with live-search enabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use banter_core::config::ApiConfig;
use banter_core::domain::request::{Endpoint, RequestPayload, TurnRole};
use banter_core::errors::GenerationError;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        payload: &RequestPayload,
        endpoint: Endpoint,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Error)]
pub enum BuildClientError {
    #[error("api key is not configured")]
    MissingApiKey,
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl HttpGenerationClient {
    pub fn new(config: &ApiConfig) -> Result<Self, BuildClientError> {
        let api_key = config.api_key.clone().ok_or(BuildClientError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, payload: &RequestPayload, endpoint: Endpoint) -> serde_json::Value {
        let mut messages = Vec::with_capacity(payload.turns.len() + 2);
        messages.push(json!({ "role": "system", "content": payload.system_prompt }));
        for turn in &payload.turns {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": payload.message }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if endpoint == Endpoint::SearchCompletion {
            body["search_parameters"] = json!({ "mode": "auto" });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        payload: &RequestPayload,
        endpoint: Endpoint,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(payload, endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() || error.is_connect() {
                    GenerationError::Transient(error.to_string())
                } else {
                    GenerationError::Permanent(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, endpoint));
        }

        let decoded: CompletionResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Permanent(format!("malformed response: {error}")))?;

        let reply = decoded
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if reply.trim().is_empty() {
            return Err(GenerationError::Permanent("empty completion".to_string()));
        }

        debug!(endpoint = endpoint.as_str(), chars = reply.len(), "completion received");
        Ok(reply)
    }
}

fn classify_status(status: StatusCode, endpoint: Endpoint) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return GenerationError::Transient(format!("upstream returned {status}"));
    }
    if status.is_client_error() && endpoint == Endpoint::SearchCompletion {
        return GenerationError::SearchUnavailable(format!("search endpoint returned {status}"));
    }
    GenerationError::Permanent(format!("upstream returned {status}"))
}

#[cfg(test)]
mod tests {
    use banter_core::config::AppConfig;
    use banter_core::domain::request::{ContextTurn, Endpoint, RequestPayload, TurnRole};
    use banter_core::errors::GenerationError;
    use reqwest::StatusCode;

    use super::{classify_status, BuildClientError, HttpGenerationClient};

    fn client() -> HttpGenerationClient {
        let mut config = AppConfig::default().api;
        config.api_key = Some("xai-test".to_string().into());
        HttpGenerationClient::new(&config).expect("build client")
    }

    fn payload() -> RequestPayload {
        RequestPayload {
            system_prompt: "be brief".to_string(),
            turns: vec![
                ContextTurn { role: TurnRole::User, content: "hi".to_string() },
                ContextTurn { role: TurnRole::Assistant, content: "hello".to_string() },
            ],
            message: "what's up".to_string(),
        }
    }

    #[test]
    fn missing_api_key_is_rejected_at_build_time() {
        let config = AppConfig::default().api;
        assert!(matches!(
            HttpGenerationClient::new(&config),
            Err(BuildClientError::MissingApiKey)
        ));
    }

    #[test]
    fn body_carries_history_and_current_message_in_order() {
        let body = client().request_body(&payload(), Endpoint::Completion);
        let messages = body["messages"].as_array().expect("messages");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "what's up");
        assert!(body.get("search_parameters").is_none());
    }

    #[test]
    fn search_endpoint_adds_search_parameters() {
        let body = client().request_body(&payload(), Endpoint::SearchCompletion);
        assert_eq!(body["search_parameters"]["mode"], "auto");
    }

    #[test]
    fn status_classification_matches_retry_policy() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Endpoint::Completion),
            GenerationError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, Endpoint::Completion),
            GenerationError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, Endpoint::SearchCompletion),
            GenerationError::SearchUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, Endpoint::Completion),
            GenerationError::Permanent(_)
        ));
    }
}
