//! # NGO Portal Binary
//!
//! Loads settings, opens the file-backed stores and serves the API until
//! Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use np_api::{build_router, AppState, HttpOptions, ResourceLayout, EVENTS, MEDIA_EVENTS, MEMBERS};
use np_auth_simple::SimpleAuthProvider;
use np_config::{LogFormat, Settings};
use np_core::traits::Record;
use np_media_local::LocalAssetStore;
use np_services::ResourceService;
use np_store_json::JsonFileStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn open_resource<R: Record>(settings: &Settings, layout: ResourceLayout) -> ResourceService<R> {
    let store = JsonFileStore::<R>::new(settings.data_dir.join(layout.data_file));
    let assets = LocalAssetStore::new(
        &settings.public_dir,
        layout.asset_dir,
        &settings.asset_base_url,
        layout.fallback_image,
    );
    info!(
        resource = R::KIND,
        data = %store.path().display(),
        assets = %assets.directory().display(),
        "opened store"
    );
    ResourceService::new(Arc::new(store), Arc::new(assets))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = np_config::load_dotenv();
    let mut settings = Settings::load().context("failed to load settings")?;
    init_tracing(settings.log_format);

    info!("Starting ngo-portal v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv {
        info!(path = %path.display(), "loaded .env");
    }

    if !settings.auth_enabled() {
        warn!("admin_token_hash is not set: mutating API routes are unauthenticated");
    }

    let auth = SimpleAuthProvider::new(settings.admin_token_hash.take());
    let state = AppState {
        members: open_resource(&settings, MEMBERS),
        events: open_resource(&settings, EVENTS),
        media: open_resource(&settings, MEDIA_EVENTS),
        auth: Arc::new(auth),
        http: HttpOptions {
            public_dir: settings.public_dir.clone(),
            max_upload_bytes: settings.max_upload_bytes,
            cors_allow_any_origin: settings.cors_allow_any_origin,
        },
    };
    state
        .initialize()
        .await
        .with_context(|| format!("failed to initialize data in {}", settings.data_dir.display()))?;

    if !settings.public_dir.is_dir() {
        warn!(path = %settings.public_dir.display(), "public directory does not exist yet");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("ngo-portal listening on http://{}", settings.bind_addr);
    info!("Health check: http://{}/health", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("ngo-portal stopped");
    Ok(())
}
