//! Biblioteca Server - Library Management System
//!
//! REST API server for the school library.

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use biblioteca_server::{
    api,
    config::{AppConfig, LoggingConfig},
    models::TaxonomyKind,
    repository::Repository,
    services::{redis::RedisService, Services},
    AppState,
};

/// Extra room for multipart framing around the credential file
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Held until shutdown so buffered file logs get flushed
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Biblioteca Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let redis_service = RedisService::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    tracing::info!("Connected to Redis");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid host address")?;

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Services::new(repository, &config, redis_service);

    if let Some(bootstrap) = services
        .users
        .ensure_bootstrap_admin(&config.auth.bootstrap_admin_matricula)
        .await
        .context("Failed to prepare the bootstrap administrator")?
    {
        tracing::warn!(
            matricula = %bootstrap.user.matricula,
            activation_url = %bootstrap.activation_url,
            "No active administrator; activate the bootstrap account with this link"
        );
    }

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state)?;

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the per-IP login limiter
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Console output in the configured format, plus an optional daily log file
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("biblioteca_server={},tower_http=debug", logging.level).into());

    let (json, pretty) = if logging.format.eq_ignore_ascii_case("json") {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    let (file, guard) = match logging.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "biblioteca-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(file)
        .init();

    guard
}

/// Routes shared by `/categories`, `/publishers` and `/genres`
fn taxonomy_routes(kind: TaxonomyKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::taxonomy::list_terms).post(api::taxonomy::create_term),
        )
        .route("/quick", post(api::taxonomy::quick_create_term))
        .route(
            "/:id",
            get(api::taxonomy::get_term)
                .put(api::taxonomy::update_term)
                .delete(api::taxonomy::delete_term),
        )
        .layer(Extension(kind))
}

/// Create the application router with all routes
fn create_router(state: AppState) -> anyhow::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Per-IP limiter in front of the unauthenticated credential endpoints
    let governor = GovernorConfigBuilder::default()
        .per_second(state.config.auth.login_rate_per_second)
        .burst_size(state.config.auth.login_burst_size)
        .finish()
        .context("Invalid login rate limit configuration")?;

    let auth_routes = Router::new()
        .route("/auth/login", post(api::auth::login))
        .route(
            "/auth/activate/:token",
            get(api::auth::show_activation).post(api::auth::activate),
        )
        .layer(GovernorLayer {
            config: Box::leak(Box::new(governor)),
        });

    let credential_limit = state.config.storage.max_credential_bytes + MULTIPART_OVERHEAD_BYTES;

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .merge(auth_routes)
        .route("/auth/me", get(api::auth::me))
        // Users (admin)
        .route(
            "/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route("/users/:id/activation", post(api::users::regenerate_activation))
        .route(
            "/users/:id/verify-credential",
            post(api::reservations::verify_credential),
        )
        // Public catalog
        .route("/catalog", get(api::books::search_catalog))
        .route("/catalog/:id", get(api::books::get_catalog_book))
        // Books
        .route(
            "/books",
            get(api::books::list_books).post(api::books::create_book),
        )
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        // Authors
        .route(
            "/authors",
            get(api::authors::list_authors).post(api::authors::create_author),
        )
        .route("/authors/quick", post(api::authors::quick_create_author))
        .route(
            "/authors/:id",
            get(api::authors::get_author)
                .put(api::authors::update_author)
                .delete(api::authors::delete_author),
        )
        // Categories, publishers, genres
        .nest("/categories", taxonomy_routes(TaxonomyKind::Categories))
        .nest("/publishers", taxonomy_routes(TaxonomyKind::Publishers))
        .nest("/genres", taxonomy_routes(TaxonomyKind::Genres))
        // Inventory
        .route(
            "/inventory/:book_id",
            get(api::inventory::get_inventory).put(api::inventory::update_inventory),
        )
        // Reservations
        .route(
            "/reservations",
            get(api::reservations::list_reservations).post(api::reservations::create_reservation),
        )
        .route("/reservations/expire", post(api::reservations::expire_reservations))
        .route("/reservations/:id", get(api::reservations::get_reservation))
        .route("/reservations/:id/approve", post(api::reservations::approve_reservation))
        .route("/reservations/:id/reject", post(api::reservations::reject_reservation))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        .route("/reservations/:id/collect", post(api::reservations::collect_reservation))
        .route(
            "/reservations/:id/not-collected",
            post(api::reservations::not_collected_reservation),
        )
        // Loans
        .route(
            "/loans",
            get(api::loans::list_loans).post(api::loans::create_loan),
        )
        .route("/loans/overdue-sweep", post(api::loans::sweep_overdue))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .route("/loans/:id/lost", post(api::loans::mark_lost))
        .route("/loans/:id/overdue", post(api::loans::mark_overdue))
        .route("/loans/:id/fine", put(api::loans::set_fine))
        // Reader self-service
        .route("/me/loans", get(api::me::my_loans))
        .route("/me/reservations", get(api::me::my_reservations))
        .route(
            "/me/credential",
            post(api::me::upload_credential).layer(DefaultBodyLimit::max(credential_limit)),
        )
        // Reports
        .route("/reports/books", get(api::reports::books_report))
        .route("/reports/loans", get(api::reports::loans_report))
        .route("/reports/reservations", get(api::reports::reservations_report))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Ok(Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblioteca_server::config::AuthConfig;

    #[test]
    fn login_limiter_builds_from_default_settings() {
        let auth = AuthConfig::default();
        let governor = GovernorConfigBuilder::default()
            .per_second(auth.login_rate_per_second)
            .burst_size(auth.login_burst_size)
            .finish()
            .unwrap();

        let layer = GovernorLayer {
            config: Box::leak(Box::new(governor)),
        };
        let _router: Router = Router::new()
            .route("/auth/login", post(|| async { "ok" }))
            .layer(layer);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(GovernorConfigBuilder::default().per_second(0).finish().is_none());
    }
}
