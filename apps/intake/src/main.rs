mod analysis;
mod config;
mod db;
mod errors;
mod extraction;
mod ingestion;
mod llm_client;
mod mailbox;
mod models;
mod persistence;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::FieldExtractor;
use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::extraction::{OcrDecoder, TextExtractor};
use crate::ingestion::{IngestScheduler, IngestionPipeline};
use crate::llm_client::GeminiClient;
use crate::mailbox::{GmailClient, OAuthCredentials};
use crate::persistence::{PersistenceGateway, PgCandidateStore, PgProcessedLedger};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Intake API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL: candidate records and the processed-message ledger
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;

    let mailbox = GmailClient::new(
        OAuthCredentials {
            client_id: config.gmail_client_id.clone(),
            client_secret: config.gmail_client_secret.clone(),
            refresh_token: config.gmail_refresh_token.clone(),
        },
        config.gmail_user_id.clone(),
    )?;
    info!("Gmail client initialized (user: {})", config.gmail_user_id);

    let gemini = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    info!("LLM client initialized (model: {})", gemini.model());

    let extractor = TextExtractor::with_ocr(OcrDecoder::new(
        config.tesseract_bin.clone(),
        config.ocr_lang.clone(),
    ));

    let pipeline = IngestionPipeline::new(
        Arc::new(mailbox),
        Arc::new(PgProcessedLedger::new(db.clone())),
        extractor,
        FieldExtractor::new(Arc::new(gemini)),
        PersistenceGateway::new(Arc::new(PgCandidateStore::new(db.clone()))),
        config.pipeline_settings(),
    );
    let scheduler = IngestScheduler::new(Arc::new(pipeline));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let polling = tokio::spawn(scheduler.clone().run(config.poll_interval, shutdown_rx));

    let state = AppState { db, scheduler };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    shutdown_tx.send(true).ok();
    polling.await?;

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
