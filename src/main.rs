use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use axum::Router;
use beacon_cache_proxy::{
    application::{
        convert::convert_file,
        error::AppError,
        jobs::{CacheWarmer, PeriodicTask, RetentionPruner},
    },
    cache::CommitteeCache,
    config,
    infra::{
        error::InfraError,
        http::{self, ProxyState},
        telemetry,
        upstream::UpstreamProxy,
    },
};
use tokio::{net::TcpListener, signal, sync::oneshot};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        report_application_error(&err);
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Convert(args) => run_convert(args).await,
    }
}

async fn run_convert(args: config::ConvertArgs) -> Result<(), AppError> {
    convert_file(&args.file).await?;
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let upstream_url = settings.upstream.url.clone().ok_or_else(|| {
        AppError::validation("an upstream beacon node is required (--bn-url or upstream.url)")
    })?;

    let cache = Arc::new(CommitteeCache::open(settings.cache_config())?);
    let upstream = Arc::new(
        UpstreamProxy::new(upstream_url, settings.upstream.connect_timeout)
            .map_err(InfraError::from)?,
    );

    let router = http::build_router(ProxyState {
        cache: Arc::clone(&cache),
        upstream: Arc::clone(&upstream),
    });

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        addr = %settings.server.addr,
        upstream = %upstream.base(),
        data_dir = %settings.cache.data_dir.display(),
        retain = settings.cache.retain,
        "listening"
    );

    let pruner = PeriodicTask::spawn(
        RetentionPruner::new(Arc::clone(&cache), settings.cache.retain),
        settings.jobs.prune_interval,
    );
    let warmer = PeriodicTask::spawn(
        CacheWarmer::new(Arc::clone(&cache), Arc::clone(&upstream)),
        settings.jobs.warm_interval,
    );

    let served = serve_http(listener, router, settings.server.graceful_shutdown).await;

    warmer.stop().await;
    pruner.stop().await;
    info!("bye");

    served
}

/// Serve until a shutdown signal arrives, then drain in-flight requests for
/// at most `drain_timeout`.
async fn serve_http(
    listener: TcpListener,
    router: Router,
    drain_timeout: Duration,
) -> Result<(), AppError> {
    let (draining_tx, draining_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();

    let drain_deadline = async move {
        if draining_rx.await.is_ok() {
            tokio::time::sleep(drain_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result
            .map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        () = drain_deadline => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "graceful shutdown timed out; dropping in-flight requests"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received; draining connections");
}
