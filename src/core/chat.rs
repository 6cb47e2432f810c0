//! Chat workflow
//!
//! Every request runs the same three steps, strictly in order:
//! 1. `fetch-history`: load the user's most recent turns
//! 2. `ai-inference`: send persona prompt + history + new message to the model
//! 3. `save-to-db`: append the exchange, unless inference fell back
//!
//! Inference failures never escape this module. The caller gets
//! [`FALLBACK_REPLY`] instead and nothing is written, so a failed exchange never
//! becomes context for later requests. A model call is cut off after the
//! inference timeout, which must stay below the runner's step timeout for the
//! fallback to win. Store failures are returned as [`ChatError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::prompts::{FALLBACK_REPLY, SYSTEM_PROMPT};
use crate::conversation::Message;
use crate::providers::ChatModel;

use super::memory::{ChatStore, HISTORY_LIMIT};
use super::steps::{
    LocalStepRunner, StepError, StepFailed, StepRunner, AI_INFERENCE, FETCH_HISTORY, SAVE_TO_DB,
};

/// Default limit on a single model call
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(25);

/// Errors from the chat workflow
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Step(#[from] StepFailed),
}

/// Orchestrates one chat exchange over an injected store, model and runner
pub struct ChatWorkflow<R = LocalStepRunner> {
    store: Arc<dyn ChatStore>,
    model: Arc<dyn ChatModel>,
    runner: R,
    inference_timeout: Duration,
}

impl<R: StepRunner> ChatWorkflow<R> {
    pub fn new(store: Arc<dyn ChatStore>, model: Arc<dyn ChatModel>, runner: R) -> Self {
        Self {
            store,
            model,
            runner,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }

    /// Give up on the model after `timeout` and answer with the fallback
    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    /// Produce a reply for `message` in `user_id`'s conversation
    ///
    /// Both fields are taken as received; `None` is stored as NULL.
    pub async fn run(
        &self,
        user_id: Option<&str>,
        message: Option<&str>,
    ) -> Result<String, ChatError> {
        let instance_id = Uuid::new_v4();
        let span = tracing::info_span!("chat_workflow", %instance_id, ?user_id);

        let user_id: Option<Arc<str>> = user_id.map(Arc::from);
        let message: Option<Arc<str>> = message.map(Arc::from);

        self.run_steps(user_id, message).instrument(span).await
    }

    async fn run_steps(
        &self,
        user_id: Option<Arc<str>>,
        message: Option<Arc<str>>,
    ) -> Result<String, ChatError> {
        let history =
            fetch_history_step(&self.runner, self.store.clone(), user_id.clone()).await?;

        tracing::debug!(history_len = history.len(), "Loaded conversation history");

        let prompt: Arc<[Message]> =
            build_prompt(history, message.as_deref().unwrap_or_default()).into();

        let reply = inference_step(
            &self.runner,
            self.model.clone(),
            prompt,
            self.inference_timeout,
        )
        .await?;

        if reply == FALLBACK_REPLY {
            tracing::debug!("Inference fell back; exchange not saved");
            return Ok(reply);
        }

        let saved_reply: Arc<str> = Arc::from(reply.as_str());
        save_step(&self.runner, self.store.clone(), user_id, message, saved_reply).await?;

        Ok(reply)
    }
}

// Steps are issued from these plain functions rather than inside `run_steps`
// so the step closure types carry no lifetimes from the async fn; otherwise
// the compiler cannot prove the workflow future is `Send`.

fn fetch_history_step<R: StepRunner>(
    runner: &R,
    store: Arc<dyn ChatStore>,
    owner: Option<Arc<str>>,
) -> impl Future<Output = Result<Vec<Message>, StepFailed>> + Send + '_ {
    runner.run(FETCH_HISTORY, move || {
        let store = store.clone();
        let user_id = owner.clone();
        async move {
            Ok::<_, StepError>(
                store
                    .recent_messages(user_id.as_deref(), HISTORY_LIMIT)
                    .await?,
            )
        }
    })
}

fn inference_step<R: StepRunner>(
    runner: &R,
    model: Arc<dyn ChatModel>,
    prompt: Arc<[Message]>,
    limit: Duration,
) -> impl Future<Output = Result<String, StepFailed>> + Send + '_ {
    runner.run(AI_INFERENCE, move || {
        let model = model.clone();
        let prompt = prompt.clone();
        async move { Ok::<_, StepError>(infer(model.as_ref(), &prompt, limit).await) }
    })
}

fn save_step<R: StepRunner>(
    runner: &R,
    store: Arc<dyn ChatStore>,
    user_id: Option<Arc<str>>,
    message: Option<Arc<str>>,
    saved_reply: Arc<str>,
) -> impl Future<Output = Result<(), StepFailed>> + Send + '_ {
    runner.run(SAVE_TO_DB, move || {
        let store = store.clone();
        let user_id = user_id.clone();
        let message = message.clone();
        let reply = saved_reply.clone();
        async move {
            store
                .append_exchange(user_id.as_deref(), message.as_deref(), &reply)
                .await?;
            Ok::<_, StepError>(())
        }
    })
}

/// Persona prompt, then prior turns, then the new user message
fn build_prompt(history: Vec<Message>, message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(SYSTEM_PROMPT));
    messages.extend(history);
    messages.push(Message::user(message));
    messages
}

async fn infer(model: &dyn ChatModel, prompt: &[Message], limit: Duration) -> String {
    match tokio::time::timeout(limit, model.chat(prompt)).await {
        Ok(Ok(reply)) if !reply.is_empty() => reply,
        Ok(Ok(_)) => {
            tracing::error!("AI inference error: model returned an empty response");
            FALLBACK_REPLY.to_string()
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "AI inference error");
            FALLBACK_REPLY.to_string()
        }
        Err(_) => {
            tracing::error!(timeout = ?limit, "AI inference error: model did not answer in time");
            FALLBACK_REPLY.to_string()
        }
    }
}
