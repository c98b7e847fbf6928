use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer, cookie::Key};

// Import everything from the library crate (no duplicate module declarations)
use gatherly_server::{
    AppState, auth, config::Config, constants::*, database, entitlements, events, friends,
    messages,
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Load and validate configuration
    let config = Config::from_env().map_err(|e| format!("Configuration error: {}", e))?;

    // Initialize main database
    let main_db = database::init_main_db(&config.data_path)
        .await
        .map_err(|e| format!("Failed to initialize main database: {}", e))?;

    // Create application state
    let app_state = AppState { main_db };

    // Create session store
    let store = MemoryStore::default();

    // Create session key with proper error handling
    let session_key = Key::try_from(config.session_secret.as_bytes())
        .map_err(|e| format!("Invalid session secret: {}", e))?;

    // Only use secure cookies when explicitly in production with HTTPS
    let is_production = std::env::var("PRODUCTION")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(is_production)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(session_key);

    // Configure CORS to allow frontend requests
    let frontend_origin =
        std::env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let frontend_origin_header = frontend_origin
        .parse::<axum::http::HeaderValue>()
        .map_err(|e| format!("Invalid FRONTEND_ORIGIN '{}': {}", frontend_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(frontend_origin_header)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::COOKIE,
        ])
        .allow_credentials(true);

    // Build application router
    let app = Router::new()
        .route("/", get(root))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/entitlements",
            get(entitlements::get_entitlements),
        )
        .route("/entitlements/toggle", post(entitlements::toggle_flag))
        .route("/entitlements/reset", post(entitlements::reset_flags))
        .route(
            "/entitlements/restrictions/{key}",
            get(entitlements::get_restriction),
        )
        .route(
            "/events",
            post(events::create_event).get(events::get_events),
        )
        .route("/events/{id}", get(events::get_event))
        .route("/events/{id}/cancel", post(events::cancel_event))
        .route(
            "/events/{id}/register",
            post(events::register_for_event).delete(events::unregister_from_event),
        )
        .route(
            "/events/{id}/favorite",
            post(events::favorite_event).delete(events::unfavorite_event),
        )
        .route("/friends/request", post(friends::send_friend_request))
        .route("/friends/accept", post(friends::accept_friend_request))
        .route("/friends/reject", post(friends::reject_friend_request))
        .route("/friends/requests", get(friends::list_friend_requests))
        .route("/friends/list", get(friends::list_friends))
        .route("/friends/quota", get(friends::quota_status))
        .route("/messages", post(messages::send_message))
        .route("/messages/conversation", get(messages::get_conversation))
        .layer(cors)
        .layer(session_layer)
        .with_state(app_state);

    // Create TCP listener with proper error handling
    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_address, e))?;

    println!("Server running on http://{}", bind_address);

    // Start server with proper error handling
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

async fn root(session: Session) -> Html<String> {
    let count: usize = session
        .get("visitor_count")
        .await
        .unwrap_or(Some(0))
        .unwrap_or(0);
    let new_count = count + 1;

    // Ignore session update errors for this simple endpoint
    let _ = session.insert("visitor_count", new_count).await;

    Html(format!(
        "<h1>Gatherly Server</h1><p>API Ready - Visit count: {}</p>",
        new_count
    ))
}
