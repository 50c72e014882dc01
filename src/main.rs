use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use upc_product_lookup::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        cache::{ProductCache, RedisCache},
        coordinator::JobCoordinator,
        gemini::{GeminiClient, ImageRanker},
        images::{HttpImageSource, ImageStore},
        lookup::UpcItemDbClient,
        pipeline::ProductPipeline,
        selector::BestImageSelector,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing upc-product-lookup server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to Redis cache");
    let store = RedisCache::new(&config.redis_url).expect("Failed to initialize Redis client");
    let cache = ProductCache::new(Arc::new(store), config.cache_ttl());

    tracing::info!("Initializing UPCitemdb client");
    let lookup = UpcItemDbClient::new(
        &config.upcitemdb_url,
        config.upcitemdb_api_key.clone(),
        config.http_timeout(),
    )
    .expect("Failed to initialize UPCitemdb client");

    let image_source =
        HttpImageSource::new(config.http_timeout()).expect("Failed to initialize image downloader");
    tokio::fs::create_dir_all(&config.image_dir)
        .await
        .expect("Failed to create image directory");
    let images = ImageStore::new(config.image_dir.clone(), &config.base_url);

    let ranker: Option<Arc<dyn ImageRanker>> = match &config.gemini_api_key {
        Some(key) => {
            tracing::info!(model = %config.gemini_model, "Initializing Gemini best-image selector");
            let client = GeminiClient::new(key, &config.gemini_model, config.http_timeout())
                .expect("Failed to initialize Gemini client");
            Some(Arc::new(client) as Arc<dyn ImageRanker>)
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not set, best-image selection disabled");
            None
        }
    };

    let pipeline = ProductPipeline::new(
        Arc::new(lookup),
        Arc::new(image_source),
        images,
        BestImageSelector::new(ranker),
    );
    let coordinator = JobCoordinator::new(pipeline, cache.clone());
    let state = AppState::new(coordinator, cache, config.image_dir.clone());
    let coordinator = Arc::clone(&state.coordinator);

    let app = routes::router(state)
        .merge(routes::metrics::metrics_router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting upc-product-lookup on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    coordinator.shutdown();
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
