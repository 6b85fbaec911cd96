use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelrank_api::{
    api::{create_router, AppState},
    config::{Config, SessionBackend},
    db::{
        create_pool, create_redis_client, redis::RedisSessionStore, Cache, MemoryStore,
        MovieCatalog, PgStore, RatingStore, UserStore,
    },
    services::{
        providers::{
            cached::CachedEmbedder, openai::OpenAiChat, openai::OpenAiEmbedder,
            pinecone::PineconeIndex, EmbeddingProvider,
        },
        ChatSearchService, MemorySessionStore, RankingConfig, RankingEngine, SessionStore,
    },
};

/// How often idle in-memory sessions are swept
const SESSION_EVICTION_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reelrank_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let timeout = config.upstream_timeout();

    let (users, movies, ratings) = match &config.database_url {
        Some(database_url) => {
            let store = PgStore::new(create_pool(database_url).await?);
            store.migrate().await?;
            tracing::info!("Using PostgreSQL store");
            split_store(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            split_store(Arc::new(MemoryStore::new()))
        }
    };

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client.clone()).await;

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CachedEmbedder::new(
        Arc::new(OpenAiEmbedder::new(
            config.openai_api_key.clone(),
            config.openai_api_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            timeout,
        )?),
        cache,
        config.embedding_model.clone(),
        config.embedding_cache_ttl_secs,
    ));

    let content_index = Arc::new(PineconeIndex::new(
        "content",
        config.pinecone_api_key.clone(),
        config.content_index_url.clone(),
        config.content_index_metric,
        timeout,
    )?);
    let collaborative_index = Arc::new(PineconeIndex::new(
        "collaborative",
        config.pinecone_api_key.clone(),
        config.collaborative_index_url.clone(),
        config.collaborative_index_metric,
        timeout,
    )?);

    let engine = RankingEngine::new(
        embedder,
        content_index,
        collaborative_index,
        movies.clone(),
        ratings.clone(),
        RankingConfig::from(&config),
    );

    let mut eviction_task = None;
    let sessions: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => {
            let store = MemorySessionStore::new(config.session_max_messages, config.session_ttl());
            eviction_task = Some(store.spawn_eviction(SESSION_EVICTION_PERIOD));
            Arc::new(store)
        }
        SessionBackend::Redis => Arc::new(RedisSessionStore::new(
            redis_client,
            config.session_max_messages,
            config.session_ttl(),
        )),
    };

    let generator = Arc::new(OpenAiChat::new(
        config.openai_api_key.clone(),
        config.openai_api_url.clone(),
        config.chat_model.clone(),
        timeout,
    )?);

    let search = ChatSearchService::new(engine.clone(), sessions, generator);
    let state = AppState::new(engine, search, users, movies, ratings);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = eviction_task {
        task.abort();
    }
    cache_writer.shutdown().await;
    Ok(())
}

type Stores = (
    Arc<dyn UserStore>,
    Arc<dyn MovieCatalog>,
    Arc<dyn RatingStore>,
);

/// One store instance behind all three store traits
fn split_store<S>(store: Arc<S>) -> Stores
where
    S: UserStore + MovieCatalog + RatingStore + 'static,
{
    (store.clone(), store.clone(), store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
