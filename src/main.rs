use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use visitrack::analytics::{FactExtractor, GeoIpService, UserAgentClassifier};
use visitrack::api::{self, AppState};
use visitrack::auth::AuthService;
use visitrack::config::Config;
use visitrack::live::LiveBroadcaster;
use visitrack::storage;
use visitrack::tracking::Tracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visitrack=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let admin = config
        .admin
        .clone()
        .context("ADMIN_USER and ADMIN_PASSWORD must be set")?;

    // Initialize storage
    let store = storage::connect(&config.store)
        .await
        .context("failed to connect to the visit store")?;
    info!("Visit store initialized successfully");

    // Initialize tracking
    let tracking = config.tracking.clone();
    let geoip = GeoIpService::new(tracking.geoip_city_db_path.as_deref())?;
    let classifier = UserAgentClassifier::from_regexes(tracking.ua_regexes_path.as_deref())?;

    if tracking.enabled {
        info!(
            "📊 Visitor tracking enabled (geoip: {}, anonymize ips: {}, ttl: {}s)",
            geoip.is_enabled(),
            tracking.ip_anonymization,
            tracking.visitor_ttl_secs
        );
    } else {
        info!("📊 Visitor tracking is disabled");
    }

    let live = Arc::new(LiveBroadcaster::new());
    let tracker = Arc::new(Tracker::new(
        FactExtractor::new(tracking, classifier, geoip),
        Arc::clone(&store),
        Arc::clone(&live),
    ));
    let state = Arc::new(AppState::new(Arc::clone(&store), live));
    let auth_service = Arc::new(AuthService::new(admin));

    let app = api::create_router(state, auth_service, tracker, &config.frontend);

    info!("🎨 Serving site from {}", config.frontend.public_dir);
    info!("🎨 Serving admin dashboard from {}", config.frontend.admin_dir);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server listening on http://{}", addr);
    info!("   - Admin dashboard available at http://{}/admin", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, closing visit store");
    store.close().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
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
}
