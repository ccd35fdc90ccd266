use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use session_control_plane::clients::{
    HttpExecutionClient, LedgerSettlementRecorder, LocalChannelService,
};
use session_control_plane::db::{self, MemoryStore, PgStore};
use session_control_plane::{
    app, AgentCatalog, AppState, MetricsCollector, SessionOrchestrator, SessionStore, Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::load().context("loading settings")?;

    // Initialize logging
    let level = settings.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting session control plane ({:?})...", settings.environment);
    settings.validate().context("validating settings")?;

    let store: Arc<dyn SessionStore> = match &settings.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = db::init_db(url).await?;
            let store = PgStore::new(pool);
            info!("Running migrations...");
            store.migrate().await?;
            info!("✓ Database ready");
            Arc::new(store)
        }
        None => {
            warn!("Using in-memory session store");
            Arc::new(MemoryStore::new())
        }
    };

    let agents = Arc::new(match &settings.agents_file {
        Some(path) => AgentCatalog::from_json_file(path)?,
        None => AgentCatalog::builtin(),
    });
    info!("Loaded {} agents", agents.len());

    let timeouts = settings.call_timeouts();
    let execution_url = settings
        .execution_service_url
        .as_deref()
        .context("execution service URL not configured")?;
    // Client-level timeout is a backstop; each call is bounded separately
    let execution = HttpExecutionClient::new(execution_url, timeouts.execution + Duration::from_secs(1))?;

    let metrics = MetricsCollector::new();
    let orchestrator = SessionOrchestrator::new(
        store.clone(),
        agents.clone(),
        Arc::new(LocalChannelService::new()),
        Arc::new(execution),
        Arc::new(LedgerSettlementRecorder::new()),
    )
    .with_timeouts(timeouts)
    .with_retry(settings.retry_config())
    .with_metrics(metrics.clone());

    let state = Arc::new(AppState {
        store,
        agents,
        orchestrator: Arc::new(orchestrator),
        metrics,
        session_defaults: settings.session_defaults.clone(),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!("🚀 Session control plane listening on port {}", settings.port);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
