//! The relay server.

#[macro_use]
extern crate tracing;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use coach_relay::core::tool::Registry;
use coach_relay::tools::StockDetailsTool;
use coach_relay::{AppState, OpenAIClientFactory, Settings, router};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing `.env` is fine, settings may come from the environment.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Arc::new(Settings::parse());
    debug!("settings: {settings:?}");
    if settings.api_key().is_none() {
        warn!("OPENAI_API_KEY is not set, requests must bring their own key");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .context("failed to build the http client")?;
    let mut tools = Registry::default();
    if settings.no_tools {
        info!("tools are disabled");
    } else {
        tools.add_tool(StockDetailsTool::new(
            http.clone(),
            &settings.market_data_url,
        ));
    }

    let clients = OpenAIClientFactory::new(http, Arc::clone(&settings));
    let app = router(AppState::new(Arc::clone(&settings), clients, tools));

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    info!("listening on http://{}", settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
