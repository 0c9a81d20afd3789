use std::{process, sync::Arc, time::Duration};

use gitfolio::{
    app::{AppOptions, Application, Collaborators},
    application::{
        auth::IdentityProvider,
        error::AppError,
    },
    cache::{CacheConfig, ContentCache, ContentKey},
    config,
    infra::{
        error::InfraError, github::GithubStore, http, identity::SupabaseIdentity,
        local::LocalContent, telemetry,
    },
};
use tokio::signal;
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

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Read(args) => run_read(settings, &args.key).await,
    }
}

fn build_application(settings: &config::Settings) -> Result<Application, AppError> {
    let cache = Arc::new(ContentCache::new(&CacheConfig::from(&settings.cache)));
    let store = Arc::new(GithubStore::new(&settings.github)?);
    let mirror = Arc::new(LocalContent::new(settings.content.local_dir.clone()));
    let identity = SupabaseIdentity::from_settings(&settings.identity)?
        .map(|provider| Arc::new(provider) as Arc<dyn IdentityProvider>);

    if identity.is_none() {
        warn!(
            target = "gitfolio::startup",
            "no identity provider configured; admin writes are disabled"
        );
    }
    if settings.github.repo.is_none() {
        info!(
            target = "gitfolio::startup",
            "no fallback repository configured; reads use the local copy until one is set"
        );
    }

    Ok(Application::assemble(
        Collaborators {
            cache,
            store,
            mirror,
            identity,
        },
        AppOptions::from(settings),
    ))
}

async fn run_read(settings: config::Settings, raw_key: &str) -> Result<(), AppError> {
    let key = ContentKey::parse(raw_key)
        .ok_or_else(|| AppError::validation(format!("unknown content key `{raw_key}`")))?;
    let app = build_application(&settings)?;

    let value = app.content.read_json(&key).await?;
    let rendered = serde_json::to_string_pretty(&value)
        .map_err(|err| AppError::unexpected(format!("failed to render `{key}`: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application(&settings)?;
    serve_http(&settings, &app).await
}

async fn serve_http(settings: &config::Settings, app: &Application) -> Result<(), AppError> {
    let router = http::build_router(app.http_state());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "gitfolio::startup",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, then arms a hard deadline for in-flight
/// requests.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "gitfolio::shutdown", error = %err, "ctrl-c handler unavailable");
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
                warn!(target = "gitfolio::shutdown", error = %err, "SIGTERM handler unavailable");
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

    info!(
        target = "gitfolio::shutdown",
        grace_seconds = grace.as_secs(),
        "shutdown requested; draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "gitfolio::shutdown", "grace period elapsed; exiting");
        process::exit(0);
    });
}
