//! Ollama provider implementation

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::ProviderError;

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    pub async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let ollama_messages: Vec<OllamaMessage> = messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let request = OllamaRequest {
            model: &self.model,
            messages: ollama_messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;

        ollama_response
            .message
            .map(|m| m.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No message in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_message_deserializes() {
        let response: OllamaResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(response.message.is_none());
    }

    #[test]
    fn test_request_disables_streaming() {
        let request = OllamaRequest {
            model: "llama3.2",
            messages: vec![],
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "llama3.2");
    }
}
