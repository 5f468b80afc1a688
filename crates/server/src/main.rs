//! Booking agent server entry point.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use booking_agent_agent::{
    start_refresh_task, start_sweep_task, DataPreload, InMemorySessionStore, Orchestrator,
    SessionStore,
};
use booking_agent_config::{load_settings, Settings};
use booking_agent_functions::{FunctionRunner, HttpFunctionExecutor};
use booking_agent_llm::{LlmBackend, OpenAiBackend};
use booking_agent_rag::{
    AppointmentSync, CachingEmbedder, CollectionNames, ContextRetriever, ConversationArchiver,
    Embedder, EmbeddingCache, FaqIndexer, OpenAiEmbedder, VectorSearch, VectorStore,
    VectorStoreConfig,
};
use booking_agent_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("BOOKING_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            // Tracing not yet initialized
            eprintln!("Warning: failed to load config: {}. Using defaults.", err);
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = env.as_deref().unwrap_or("default"),
        "Starting booking agent"
    );

    init_metrics();

    let llm: Arc<dyn LlmBackend> = Arc::new(OpenAiBackend::new(settings.llm.clone())?);

    let upstream: Arc<dyn Embedder> =
        Arc::new(OpenAiEmbedder::new(&settings.llm, settings.embedding.clone())?);
    let cache = Arc::new(EmbeddingCache::new(
        settings.embedding.cache_capacity,
        settings.embedding.max_text_len,
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(CachingEmbedder::new(upstream, cache));

    let vector_store = Arc::new(
        VectorStore::new(VectorStoreConfig::from_settings(
            &settings.qdrant,
            &settings.embedding,
        ))
        .await?,
    );
    if let Err(err) = vector_store.ensure_collections().await {
        tracing::warn!(
            error = %err,
            "collection setup failed; retrieval degrades until Qdrant is reachable"
        );
    }
    let retriever = Arc::new(ContextRetriever::new(
        Arc::clone(&vector_store) as Arc<dyn VectorSearch>,
        Arc::clone(&embedder),
        CollectionNames {
            faq: settings.qdrant.faq_collection.clone(),
            conversation: settings.qdrant.conversation_collection.clone(),
            appointment: settings.qdrant.appointment_collection.clone(),
        },
        settings.rag.clone(),
    ));

    let runner: Arc<dyn FunctionRunner> = Arc::new(HttpFunctionExecutor::new(&settings.backend)?);

    let store: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(settings.session.buffer_size));
    let _sweep = start_sweep_task(
        Arc::clone(&store),
        Duration::from_secs(settings.session.sweep_interval_secs),
        Duration::from_secs(settings.session.timeout_minutes * 60),
    );

    let preload = Arc::new(DataPreload::new(Arc::clone(&runner)));
    preload.refresh().await;
    let _refresh = start_refresh_task(
        Arc::clone(&preload),
        Duration::from_secs(settings.backend.catalog_refresh_secs),
    );

    let history = Arc::new(AppointmentSync::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
    ));
    let archiver = Arc::new(ConversationArchiver::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
    ));

    let indexer = Arc::new(FaqIndexer::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        settings.rag.faq_path.clone(),
    ));
    match indexer.reindex().await {
        Ok(report) => tracing::info!(indexed = report.indexed, "FAQ indexed at startup"),
        Err(err) => tracing::warn!(
            error = %err,
            "startup FAQ indexing failed; use POST /admin/reindex-faq once resolved"
        ),
    }

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        llm,
        retriever,
        Arc::clone(&runner),
        Arc::clone(&preload),
        Some(history),
        Some(archiver),
        settings.llm.clone(),
        settings.detection.clone(),
    ));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(settings, orchestrator, store, preload, indexer);
    let app = create_router(state);

    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "booking_agent={},tower_http=info",
            settings.server.log_level
        )
        .into()
    });

    let fmt_layer = if settings.server.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
