mod config;
mod docker;
mod engine;
mod evaluator;
mod executor;
mod sandbox;
mod worker;

#[cfg(test)]
mod sandbox_tests;

use config::WorkerConfig;
use docker::DockerProvider;
use engine::SandboxExecutor;
use judge_common::problems::ProblemStore;
use judge_common::redis::RedisStore;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use worker::{Worker, WorkerSettings};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

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

    info!("Judge Worker booting...");

    let config = WorkerConfig::load().map_err(|e| {
        error!("Failed to load worker configuration: {:#}", e);
        e
    })?;

    info!(
        image = %config.sandbox.image,
        timeout_ms = config.sandbox.timeout_ms,
        memory_mb = config.sandbox.memory_limit_mb,
        pids_limit = config.sandbox.pids_limit,
        cpu_limit = config.sandbox.cpu_limit,
        "Sandbox configured"
    );

    let provider = DockerProvider::connect().await?;
    if let Err(e) = provider.ensure_image(&config.sandbox.image).await {
        // The first run will fail with RTE if the image is really missing
        warn!(image = %config.sandbox.image, error = %e, "Failed to pre-pull sandbox image");
    }

    let store = RedisStore::connect(&config.common.redis_url)
        .await?
        .with_result_ttl(config.result_ttl_secs);
    info!(
        redis_url = %config.common.redis_url,
        result_ttl_secs = ?config.result_ttl_secs,
        "Connected to Redis"
    );
    match store.queue_depth().await {
        Ok(depth) => info!(queue_depth = depth, "Queue inspected"),
        Err(e) => warn!(error = %e, "Failed to inspect queue"),
    }

    let problems = ProblemStore::new(&config.common.problems_dir);
    let runner = SandboxExecutor::new(Arc::new(provider), &config.sandbox);

    let worker = Worker::new(
        Arc::new(store),
        problems,
        Arc::new(runner),
        WorkerSettings::from(&config),
    );

    // ctrl-c stops the loop between jobs; the in-flight job still completes
    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received shutdown signal, finishing in-flight job...");
                stop.send_replace(true);
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    worker.run(shutdown).await?;

    info!("Worker shutdown complete");
    Ok(())
}
