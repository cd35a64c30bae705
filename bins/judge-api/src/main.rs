mod config;
mod handlers;
mod routes;

use anyhow::Context;
use config::ApiConfig;
use judge_common::problems::ProblemStore;
use judge_common::redis::RedisStore;
use judge_common::store::JobStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub problems: ProblemStore,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Judge API booting...");

    let config = ApiConfig::from_env();

    let store = RedisStore::connect(&config.common.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis: {}", config.common.redis_url);

    let problems = ProblemStore::new(&config.common.problems_dir);
    info!("Serving problems from {}", problems.dir().display());

    let state = Arc::new(AppState {
        store: Arc::new(store),
        problems,
    });

    let app = routes::app(state, &config.allowed_origins);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!(origins = ?config.allowed_origins, "Ready to accept submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
