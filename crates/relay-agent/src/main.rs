use std::sync::Arc;

use anyhow::Context;

mod callback;
mod config;
mod error;
mod liveness;
mod pid_store;
mod routes;
mod supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = config::AgentConfig::from_env();

    let pid_store = pid_store::PidStore::new(config.pid_dir.clone());
    pid_store
        .ensure_dir()
        .await
        .with_context(|| format!("create pid dir {}", config.pid_dir.display()))?;

    let state = routes::AppState {
        supervisor: supervisor::Supervisor::new(pid_store),
        notifier: callback::CallbackNotifier::new(config.callback_timeout)?,
        api_key: Arc::from(config.api_key.as_str()),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "relay-agent listening");

    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
