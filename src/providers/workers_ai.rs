//! Cloudflare Workers AI provider
//!
//! Calls the REST endpoint for text generation:
//!
//! ```text
//! POST {base_url}/accounts/{account_id}/ai/run/{model}
//! Authorization: Bearer {api_token}
//! { "messages": [{ "role": "system", "content": "..." }, ...] }
//! ```
//!
//! and reads the generated text from `result.response`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";

#[derive(Debug, Clone)]
pub struct WorkersAiConfig {
    pub base_url: String,
    pub account_id: String,
    pub api_token: String,
    pub model: String,
    pub timeout: Duration,
}

impl WorkersAiConfig {
    pub fn new(account_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    messages: Vec<RunMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RunMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

pub struct WorkersAiProvider {
    config: WorkersAiConfig,
    client: Client,
}

impl WorkersAiProvider {
    pub fn new(config: WorkersAiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let request = RunRequest {
            messages: messages
                .iter()
                .map(|m| RunMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.config.run_url())
            .bearer_auth(&self.config.api_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                describe_errors(&body).unwrap_or(body)
            )));
        }

        parse_run_response(&body)
    }
}

/// Extract the generated text from a run response body
fn parse_run_response(body: &str) -> Result<String, ProviderError> {
    let run: RunResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
    })?;

    if !run.success {
        return Err(ProviderError::InvalidResponse(format!(
            "API error: {}",
            join_errors(&run.errors)
        )));
    }

    run.result
        .and_then(|r| r.response)
        .ok_or_else(|| ProviderError::InvalidResponse("No response in result".to_string()))
}

fn describe_errors(body: &str) -> Option<String> {
    let run: RunResponse = serde_json::from_str(body).ok()?;
    if run.errors.is_empty() {
        None
    } else {
        Some(join_errors(&run.errors))
    }
}

fn join_errors(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }

    errors
        .iter()
        .map(|e| match e.code {
            Some(code) => format!("{} ({})", e.message, code),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_url() {
        let config = WorkersAiConfig::new("abc123", "token");
        assert_eq!(
            config.run_url(),
            "https://api.cloudflare.com/client/v4/accounts/abc123/ai/run/@cf/meta/llama-3.3-70b-instruct-fp8-fast"
        );
    }

    #[test]
    fn test_parse_successful_response() {
        let body = r#"{"result":{"response":"Hello! 🐾"},"success":true,"errors":[],"messages":[]}"#;
        assert_eq!(parse_run_response(body).unwrap(), "Hello! 🐾");
    }

    #[test]
    fn test_empty_response_is_passed_through() {
        let body = r#"{"result":{"response":""},"success":true,"errors":[]}"#;
        assert_eq!(parse_run_response(body).unwrap(), "");
    }

    #[test]
    fn test_missing_response_is_an_error() {
        let body = r#"{"result":{},"success":true,"errors":[]}"#;
        assert!(matches!(
            parse_run_response(body),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_api_errors_are_reported() {
        let body = r#"{"result":null,"success":false,"errors":[{"code":5007,"message":"No such model"}]}"#;
        let err = parse_run_response(body).unwrap_err();
        assert!(err.to_string().contains("No such model (5007)"));
    }

    #[test]
    fn test_request_shape() {
        let messages = [Message::system("be a cat"), Message::user("hi")];
        let request = RunRequest {
            messages: messages
                .iter()
                .map(|m| RunMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
