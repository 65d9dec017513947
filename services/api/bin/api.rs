//! Main Entrypoint for the Interview API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Building the turn generator and the conversation orchestrator.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use interview_api::{config::Config, db::PgStore, router::create_router, state::AppState};
use interview_core::{
    Orchestrator, OrchestratorDeps, catalog::TopicCatalog, interview::SummaryCache,
    prompt::PromptTemplate, turn_generator::OpenAITurnGenerator,
};
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {e}");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads every `*.md` file in a directory, keyed by file stem.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgStore::new(pool));
    store.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize the Orchestrator ---
    let prompts = load_prompts(&config.prompts_path)?;
    let prompt = PromptTemplate::from_prompts(&prompts)?;

    let api_key = config
        .api_key()
        .with_context(|| format!("No API key configured for provider {:?}", config.provider))?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let generator = OpenAITurnGenerator::new(openai_config, config.chat_model.clone());

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        generator: Arc::new(generator),
        store: store.clone(),
        interviews: store,
        summaries: Arc::new(SummaryCache::new()),
        prompt: Arc::new(prompt),
        catalog: TopicCatalog::standard(),
        turn_timeout: config.turn_timeout,
    });

    let app_state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        turn_timeout = ?config.turn_timeout,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
