mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::info;

use duet_api::auth::{AppState, AppStateInner, AuthConfig};
use duet_api::avatars::DiskAvatarStore;
use duet_api::router;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,duet_api=debug,duet_db=info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database and avatar storage
    let db = duet_db::Database::open(&config.db_path)?;
    let avatars = DiskAvatarStore::new(
        config.avatar_dir.clone(),
        format!("{}/avatars", config.public_url.trim_end_matches('/')),
    )
    .await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        auth: AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            token_name: config.token_name.clone(),
            secure_cookies: config.production,
        },
        avatars: Arc::new(avatars),
    });

    let app = router::app(state, &config.avatar_dir).layer(CorsLayer::permissive());

    info!("Duet server listening on {}", config.addr);
    if !config.production {
        info!("Session cookies are not marked Secure (DUET_ENV != production)");
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            ctrl_c.await.ok();
            info!("Received Ctrl+C, shutting down...");
            return;
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
