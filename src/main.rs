use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_web_app::{
    build_router, AppState, AuthConfig, AuthService, Config, Database, GoogleOAuth,
    SessionManager, UserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_web_app=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("Configuration loaded successfully");

    let database = Database::new(&config.database_url)
        .await
        .context("failed to initialize database")?;
    tracing::info!("Database initialized and migrations completed");

    let user_repository = UserRepository::new(database.pool().clone());

    let google = GoogleOAuth::from_config(&config).context("invalid Google OAuth settings")?;
    if google.is_none() {
        tracing::warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set, Google sign-in disabled");
    }

    let auth_service = AuthService::new(google, Arc::new(user_repository));
    let auth_config = AuthConfig::from_config(&config);
    tracing::info!("Enabled providers: {:?}", auth_config.providers);

    let session_manager = SessionManager::new(config.secure_cookies);
    let app_state = AppState::new(auth_config, auth_service, &config.auth_secret);
    let app = build_router(app_state, &session_manager);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
