#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Paychat API Server
//!
//! Serves the web pages, the chat relay and the Stripe endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paychat_api::{create_router, security::security_headers_middleware, AppState, Config};
use paychat_shared::{create_pool, run_migrations, PgUserStore, RestUserStores, UserStores};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paychat_api=debug,paychat_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Paychat API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Configuration loaded");

    // No overall request timeout: chat streams stay open as long as the
    // provider keeps sending. Stalls are caught by the relay's read timeout.
    let http = reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()?;

    let stores: Arc<dyn UserStores> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(database_url).await?;
            tracing::info!("Database connection established");

            if config.run_migrations {
                tracing::info!("Running database migrations...");
                run_migrations(&pool).await?;
            } else {
                tracing::info!("Database migrations skipped");
            }
            Arc::new(PgUserStore::new(pool))
        }
        None => {
            tracing::info!("Using Supabase REST API for user records");
            Arc::new(RestUserStores::new(
                http.clone(),
                &config.supabase_url,
                config.supabase_anon_key.clone(),
                config.supabase_service_role_key.clone(),
            ))
        }
    };

    let state = AppState::new(config.clone(), stores, http);

    let origin: HeaderValue = config.app_origin().parse()?;
    tracing::info!(allowed_origin = ?origin, "CORS configured");
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .expose_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
