//! HTTP server wiring.
//!
//! The catalog lives behind `RwLock<Arc<SchemaCatalog>>`: handlers clone the
//! Arc at turn start and use that snapshot for the whole turn, so a reload
//! swapping the pointer never affects in-flight work. Everything else in
//! `AppState` is either immutable configuration or internally synchronized.

pub mod handlers;
pub mod models;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::capabilities::gemini::GeminiClient;
use crate::capabilities::mysql::MySqlCapability;
use crate::capabilities::{SchemaProvider, SqlExecutor, SqlGenerator, TextEmbedder};
use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use crate::schema_catalog::{CatalogOverlay, SchemaCatalog};
use crate::session::SessionRegistry;

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

pub struct AppState {
    pub config: ServerConfig,
    pub catalog: RwLock<Arc<SchemaCatalog>>,
    pub overlay: CatalogOverlay,
    pub sessions: SessionRegistry,
    pub orchestrator: Orchestrator,
    pub embedder: Arc<dyn TextEmbedder>,
    pub executor: Arc<dyn SqlExecutor>,
    pub provider: Arc<dyn SchemaProvider>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: ServerConfig,
        catalog: SchemaCatalog,
        overlay: CatalogOverlay,
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn SqlExecutor>,
        provider: Arc<dyn SchemaProvider>,
    ) -> SharedState {
        let orchestrator = Orchestrator::new(
            Arc::clone(&embedder),
            generator,
            Arc::clone(&executor),
            &config,
        );
        Arc::new(Self {
            sessions: SessionRegistry::new(config.session_ttl_secs),
            orchestrator,
            catalog: RwLock::new(Arc::new(catalog)),
            overlay,
            embedder,
            executor,
            provider,
            config,
        })
    }

    /// Current catalog snapshot. Callers hold the Arc, not the lock.
    pub fn catalog_snapshot(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Build the router. Factored out of [`run_with_config`] so tests can drive
/// it directly with `tower::ServiceExt::oneshot`.
pub fn app(state: SharedState) -> Router {
    // Worst case a turn spends the full capability timeout on each of
    // generate, execute, and summarize per attempt.
    let turn_budget = state.config.capability_timeout_secs
        * (u64::from(state.config.max_attempts) * 3 + 2);
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
        .route("/schema", get(handlers::schema))
        .route("/schema/reload", post(handlers::reload_schema))
        .route("/session/{session_id}", delete(handlers::clear_session))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(turn_budget)))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

/// Connect the real capabilities, build the initial catalog, and serve until
/// shutdown. A catalog build failure here is fatal: the service cannot
/// answer questions without a consistent schema snapshot.
pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    let mysql = Arc::new(MySqlCapability::connect(&config).await?);
    let gemini = Arc::new(GeminiClient::new(&config));

    let overlay = match &config.catalog_overlay {
        Some(path) => {
            log::info!("Loading catalog overlay from {}", path);
            CatalogOverlay::load(path)?
        }
        None => CatalogOverlay::default(),
    };

    let metadata = mysql.fetch().await?;
    let catalog = SchemaCatalog::build(metadata, &overlay, gemini.as_ref()).await?;

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let state = AppState::new(
        config,
        catalog,
        overlay,
        Arc::clone(&gemini) as Arc<dyn TextEmbedder>,
        gemini as Arc<dyn SqlGenerator>,
        Arc::clone(&mysql) as Arc<dyn SqlExecutor>,
        mysql as Arc<dyn SchemaProvider>,
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
