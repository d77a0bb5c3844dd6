//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, oauth::HttpOAuthProvider},
    config::Config,
    error::ApiError,
    expiration::start_expiry_sweep,
    web::{
        auth::{
            delete_account_handler, forgot_password_handler, login_handler, logout_handler,
            me_handler, reset_password_handler, signup_handler,
        },
        grounding,
        oauth::{oauth_callback_handler, oauth_login_handler},
        restructuring,
        rest::ApiDoc,
        state::AppState,
        require_auth,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use dose_core::SystemClock;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let mut app_state = AppState::new(db_adapter, Arc::new(SystemClock), config.clone());
    let http = reqwest::Client::new();
    for (kind, client) in &config.oauth_clients {
        info!("OAuth sign-in enabled for {}", kind);
        app_state = app_state.with_oauth_provider(Arc::new(HttpOAuthProvider::new(
            *kind,
            client.clone(),
            http.clone(),
        )));
    }
    let app_state = Arc::new(app_state);

    // --- 4. Start the Expiry Sweep ---
    let shutdown = CancellationToken::new();
    let sweep = start_expiry_sweep(
        app_state.credentials.clone(),
        config.cleanup_interval,
        shutdown.clone(),
    );

    // --- 5. Create the Web Router ---
    let allowed_origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid ALLOWED_ORIGIN '{}': {}", config.allowed_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/forgot-password", post(forgot_password_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .route("/auth/oauth/{provider}/login", get(oauth_login_handler))
        .route("/auth/oauth/{provider}/callback", get(oauth_callback_handler))
        .route("/grounding/actions", get(grounding::list_actions));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/auth/account", delete(delete_account_handler))
        .route(
            "/restructuring/sessions",
            post(restructuring::create_restructuring_session)
                .get(restructuring::list_restructuring_sessions),
        )
        .route(
            "/restructuring/sessions/{id}",
            get(restructuring::get_restructuring_session)
                .delete(restructuring::delete_restructuring_session),
        )
        .route(
            "/restructuring/sessions/{id}/steps",
            put(restructuring::set_restructuring_step),
        )
        .route(
            "/restructuring/sessions/{id}/complete",
            post(restructuring::complete_restructuring_session),
        )
        .route(
            "/grounding/sessions",
            post(grounding::create_grounding_session).get(grounding::list_grounding_sessions),
        )
        .route(
            "/grounding/sessions/{id}",
            get(grounding::get_grounding_session).delete(grounding::delete_grounding_session),
        )
        .route("/grounding/sessions/{id}/checkin", put(grounding::set_check_in))
        .route("/grounding/sessions/{id}/acceptance", put(grounding::set_acceptance))
        .route("/grounding/sessions/{id}/action", put(grounding::set_action))
        .route(
            "/grounding/sessions/{id}/action/complete",
            put(grounding::complete_action),
        )
        .route(
            "/grounding/sessions/{id}/complete",
            post(grounding::complete_grounding_session),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {:?}", e);
            }
            server_shutdown.cancel();
        })
        .await?;

    // --- 7. Stop Background Work ---
    shutdown.cancel();
    if let Err(e) = sweep.await {
        tracing::error!("Expiry sweep ended abnormally: {:?}", e);
    }
    info!("Server stopped.");

    Ok(())
}
