use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use extraction_cell::{LanguageModel, OpenAiModel, UnavailableModel};
use intake_cell::IntakeState;
use shared_config::AppConfig;
use shared_database::{ClinicStore, InMemoryStore, SupabaseStore};
use voice_session_cell::SessionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic intake API server");

    // Load configuration
    let config = AppConfig::from_env();

    let store: Arc<dyn ClinicStore> = if config.is_configured() {
        Arc::new(SupabaseStore::new(&config))
    } else {
        Arc::new(InMemoryStore::new())
    };

    let model: Arc<dyn LanguageModel> = match OpenAiModel::new(&config) {
        Ok(model) => Arc::new(model),
        Err(err) => {
            warn!("Language model disabled: {}", err);
            Arc::new(UnavailableModel)
        }
    };

    let sessions = Arc::new(SessionManager::new());
    let intake = IntakeState::new(&config, model, store, Arc::clone(&sessions));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(intake, sessions)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
