use std::{process, sync::Arc, time::Duration};

use sander::{
    cache::{CacheConfig, CachePopulator, CacheState, HttpResponseCache},
    config,
    error::AppError,
    http,
    infra::{error::InfraError, telemetry},
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()))
    {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(HttpResponseCache::from_config(&cache_config));
    let (populator, populator_handle) = CachePopulator::spawn(Arc::clone(&cache), &cache_config);

    info!(
        enabled = cache_config.enabled,
        capacity = cache.capacity(),
        "Response cache ready"
    );

    let state = CacheState {
        config: cache_config,
        cache,
        populator,
    };

    let result = serve_http(&settings, state).await;

    // The router and its populator handles are gone; let queued inserts finish.
    drain_populator(populator_handle, settings.server.graceful_shutdown).await;

    result
}

async fn serve_http(settings: &config::Settings, state: CacheState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(addr = %settings.server.addr, "Listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn drain_populator(handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "cache populator ended abnormally"),
        Err(_) => warn!(
            timeout_secs = timeout.as_secs(),
            "cache populator did not drain before shutdown timeout"
        ),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
