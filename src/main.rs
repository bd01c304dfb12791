//! # KiddoLingo Backend - Main Application Entry Point
//!
//! Actix-web server for the voice tutoring service. Two surfaces:
//!
//! - `/ws/voice`: the persistent streaming connection where audio turns are
//!   transcribed, answered and synthesized back
//! - A small JSON API: health/metrics, runtime configuration, and lesson
//!   subtopic generation
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state, metrics, injected collaborators
//! - **openai**: the remote speech/chat collaborators behind trait seams
//! - **voice**: session registry and the audio turn pipeline
//! - **websocket**: the per-connection session actor
//! - **handlers / health / middleware / error**: the HTTP surface

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod openai;
mod prompts;
mod state;
mod voice;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use openai::OpenAiClient;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice::{SessionRegistry, VoicePipeline};

/// Global shutdown flag flipped by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present (OPENAI_API_KEY lives
    // there in development).
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting kiddolingo-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if config.openai.api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; collaborator calls will fail");
    }

    // Explicitly constructed collaborators, injected everywhere they are
    // needed. One OpenAI client backs all three pipeline stages and the
    // subtopics endpoint.
    let openai_client = Arc::new(OpenAiClient::new(config.openai.clone()));
    let pipeline = Arc::new(VoicePipeline::new(
        openai_client.clone(),
        openai_client.clone(),
        openai_client.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new(
        config.session.max_concurrent_sessions,
    ));

    let app_state = AppState::new(config.clone(), registry, pipeline, openai_client);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // The streaming voice endpoint
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
            // Lesson subtopic generation
            .route(
                "/api/topics/{topic_id}/subtopics/generate",
                web::post().to(handlers::generate_subtopics),
            )
            // Operational API
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            // Health check at root level for convenience
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal.
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiddolingo_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag without busy-waiting.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
