//! Main Entrypoint for the Study Guide API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Initializing shared services (completion client, file store, rate limiter).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc, time::Duration};
use studyguide_api::{
    config::{Config, Provider},
    db::Db,
    rate_limit::{
        CounterStore, MemoryCounterStore, RateLimitPolicy, RateLimiter, RedisCounterStore,
    },
    router::create_router,
    state::AppState,
    storage::{FileStore, HttpFileStore},
};
use studyguide_core::{
    llm_client::{ANTHROPIC_API_BASE, AnthropicClient, CompletionClient, OpenAICompatibleClient},
    prompts,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads every `*.md` file in `prompts_path`, keyed by file stem.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts from {}", prompts_path.display()))?;
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

fn completion_client(config: &Config) -> anyhow::Result<Arc<dyn CompletionClient>> {
    match &config.provider {
        Provider::Anthropic => {
            info!("Using Anthropic provider.");
            let api_key = config
                .anthropic_api_key
                .clone()
                .context("ANTHROPIC_API_KEY is not set")?;
            Ok(Arc::new(AnthropicClient::new(
                api_key,
                config.chat_model.clone(),
                ANTHROPIC_API_BASE.to_string(),
            )?))
        }
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            let api_key = config
                .openai_api_key
                .as_ref()
                .context("OPENAI_API_KEY is not set")?;
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/");
            Ok(Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
            )))
        }
    }
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
    let db = Db::new(pool);
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Shared Services ---
    let prompts = load_prompts(&config.prompts_path)?;
    for key in [
        prompts::GENERATE_PROBLEM,
        prompts::SOLVE_MATH,
        prompts::SOLVE_MATH_SYSTEM,
        prompts::EXTRACT_TOPICS,
    ] {
        if !prompts.contains_key(key) {
            anyhow::bail!("{key}.md not found in prompts directory");
        }
    }

    let completion_client = completion_client(&config)?;

    let file_store: Option<Arc<dyn FileStore>> = match &config.storage {
        Some(storage) => Some(Arc::new(HttpFileStore::new(storage)?)),
        None => {
            warn!("STORAGE_URL not set; file attachments are disabled.");
            None
        }
    };

    let counter_store: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            info!("Using Redis for rate limit counters.");
            Arc::new(RedisCounterStore::connect(url).await?)
        }
        None => Arc::new(MemoryCounterStore::new(Duration::from_millis(
            config.rate_limit_window_ms,
        ))),
    };
    let rate_limiter = Arc::new(RateLimiter::new(
        counter_store,
        RateLimitPolicy {
            max_requests: config.rate_limit_max_requests,
            window_ms: config.rate_limit_window_ms,
        },
    ));

    let app_state = Arc::new(AppState::new(
        Arc::new(db),
        completion_client,
        prompts,
        file_store,
        rate_limiter,
        config.clone(),
    ));

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        rate_limit = config.rate_limit_max_requests,
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
