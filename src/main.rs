//! Maincoon Chat - conversational API with per-user memory
//!
//! Exposes `POST /chat`. Each request loads the user's recent conversation
//! from SQLite, asks a hosted LLM for a reply, stores the exchange and returns
//! the reply.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use config::Config;
use crate::core::{ChatStore, ChatWorkflow, LocalStepRunner, MemoryStore};
use providers::Provider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_workflow: Arc<ChatWorkflow>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maincoon_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::new(&config.database.path).await?);
    tracing::info!(path = %config.database.path.display(), "Conversation memory ready");

    let provider = Provider::from_config(&config.llm)?;
    tracing::info!(provider = provider.name(), "Model provider configured");

    let runner = LocalStepRunner::new(config.workflow.step_policy());
    let chat_workflow = Arc::new(
        ChatWorkflow::new(store, Arc::new(provider), runner)
            .with_inference_timeout(Duration::from_secs(config.llm.timeout_secs)),
    );

    let state = AppState { chat_workflow };

    // All origins allowed; there is no authentication either
    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Maincoon Chat running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
