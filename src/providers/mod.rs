//! AI provider integrations

mod ollama;
mod openai_compat;
mod workers_ai;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::conversation::Message;

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};
pub use workers_ai::{WorkersAiConfig, WorkersAiProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A text-generation model reachable over the network
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the full prompt and return the generated text, which may be empty
    async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError>;
}

pub enum Provider {
    WorkersAi(WorkersAiProvider),
    Ollama(OllamaProvider),
    OpenAICompat(OpenAICompatProvider),
}

impl Provider {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs);

        match config.provider.to_lowercase().as_str() {
            "workers-ai" | "workers_ai" | "cloudflare" => {
                let account_id = config.account_id.clone().ok_or_else(|| {
                    ProviderError::NotConfigured("workers-ai requires an account id".into())
                })?;
                let api_token = config.api_key.clone().ok_or_else(|| {
                    ProviderError::NotConfigured("workers-ai requires an API token".into())
                })?;

                let mut workers = WorkersAiConfig::new(account_id, api_token);
                if let Some(base_url) = &config.base_url {
                    workers.base_url = base_url.clone();
                }
                if let Some(model) = &config.model {
                    workers.model = model.clone();
                }
                workers.timeout = timeout;

                Ok(Provider::WorkersAi(WorkersAiProvider::new(workers)?))
            }
            "ollama" => {
                let url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".into());
                let model = config.model.clone().unwrap_or_else(|| "llama3.2".into());
                Ok(Provider::Ollama(OllamaProvider::new(url, model, timeout)?))
            }
            "openai" | "openai-compat" => {
                let mut openai = OpenAICompatConfig::default();
                if let Some(base_url) = &config.base_url {
                    openai.base_url = base_url.clone();
                }
                if let Some(model) = &config.model {
                    openai.model = model.clone();
                }
                openai.api_key = config.api_key.clone();
                openai.timeout = timeout;

                Ok(Provider::OpenAICompat(OpenAICompatProvider::new(openai)?))
            }
            _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::WorkersAi(_) => "workers-ai",
            Provider::Ollama(_) => "ollama",
            Provider::OpenAICompat(_) => "openai",
        }
    }
}

#[async_trait]
impl ChatModel for Provider {
    async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        match self {
            Provider::WorkersAi(p) => p.chat(messages).await,
            Provider::Ollama(p) => p.chat(messages).await,
            Provider::OpenAICompat(p) => p.chat(messages).await,
        }
    }
}

/// Scripted model for tests
#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Returns queued results in order and records every prompt it receives
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        prompts: Mutex<Vec<Vec<Message>>>,
        latency: Option<Duration>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self, error: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(ProviderError::InvalidResponse(error.to_string())));
            self
        }

        /// Wait this long before answering each prompt
        pub fn latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        pub fn prompts(&self) -> Vec<Vec<Message>> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::InvalidResponse("no scripted reply".into())))
        }
    }
}
