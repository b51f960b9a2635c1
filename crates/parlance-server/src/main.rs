//! Parlance server binary.
//!
//! Starts an axum HTTP server with structured logging, database initialization,
//! and graceful shutdown on SIGTERM/SIGINT.

use parlance_agent::{EchoGenerator, OpenAiGenerator, ResponseGenerator};
use parlance_db::DbPool;
use parlance_server::middleware::TokenVerifier;
use parlance_server::pipeline::MessagePipeline;
use parlance_server::{app, config, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PARLANCE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn build_generator(config: &config::Config) -> Arc<dyn ResponseGenerator> {
    if !config.agent.is_enabled() {
        tracing::warn!("agent.base_url or agent.api_key not set, replies will echo the user");
        return Arc::new(EchoGenerator::new(config.agent.persona.clone()));
    }

    let generator = OpenAiGenerator::new(&config.agent, &config.uploads.dir)
        .expect("failed to build the agent HTTP client");
    tracing::info!(
        model = %config.agent.model,
        speech = config.agent.speech_model.is_some(),
        persona = %config.agent.persona.name,
        "agent backend configured"
    );
    Arc::new(generator)
}

fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Opens the pool and brings the schema up to date before serving.
fn open_database(database: &config::DatabaseConfig) -> DbPool {
    let settings = parlance_db::DbRuntimeSettings {
        busy_timeout_ms: database.busy_timeout_ms,
        pool_max_size: database.pool_max_size,
    };
    let pool = parlance_db::create_pool(&database.path, settings)
        .expect("cannot open the conversation database; check database.path");

    let conn = pool
        .get()
        .expect("no database connection available for migrations");
    match parlance_db::run_migrations(&conn) {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, path = %database.path, "schema migrated"),
        Err(e) => panic!("schema migration failed: {}", e),
    }
    drop(conn);

    pool
}

#[tokio::main]
async fn main() {
    let (cli_or_env_path, config_source) = resolve_config_path();
    let config_path = cli_or_env_path.as_deref().unwrap_or("config.toml");

    let config = config::load_config(Some(config_path))
        .expect("invalid configuration; refusing to start");

    init_tracing(&config.logging);
    tracing::info!(source = config_source, path = config_path, "configuration loaded");

    if config.auth.uses_dev_secret() {
        tracing::warn!(
            "auth.jwt_secret is the built-in development secret; set PARLANCE_JWT_SECRET in production"
        );
    }

    let pool = open_database(&config.database);
    let pipeline = MessagePipeline::new(
        pool,
        build_generator(&config),
        config.agent.timeout(),
    );

    let router = app(AppState {
        pipeline: Arc::new(pipeline),
        tokens: TokenVerifier::from_secret(&config.auth.jwt_secret),
        upload_dir: config.uploads.dir.clone(),
        cors_origins: config.server.cors_origins.clone(),
    });

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("cannot listen on {}: {}", addr, e));
    tracing::info!(%addr, "parlance server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server terminated abnormally");

    tracing::info!("parlance server stopped");
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("cannot install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received, draining connections"),
            _ = term.recv() => tracing::info!("SIGTERM received, draining connections"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Ctrl+C received, draining connections");
    }
}
