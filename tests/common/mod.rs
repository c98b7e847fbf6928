use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use gatherly_server::{AppState, auth, constants::*, database, entitlements};
use time::Duration;
use tower::util::ServiceExt;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use uuid::Uuid;

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    let test_config = TestConfig::new()?;

    let data_path = test_config.data_path();
    std::fs::create_dir_all(&data_path)?;

    let main_db = database::init_main_db(&data_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize main database: {}", e))?;

    let app_state = AppState { main_db };

    let store = MemoryStore::default();

    let session_secret = "test_secret_key_at_least_64_chars_long_test_secret_key_at_least_64_";
    let session_key = Key::try_from(session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(session_key);

    let router = Router::new()
        .route("/auth/register", axum::routing::post(auth::register))
        .route("/auth/login", axum::routing::post(auth::login))
        .route("/auth/me", axum::routing::get(auth::me))
        .route("/auth/logout", axum::routing::post(auth::logout))
        .route(
            "/entitlements",
            axum::routing::get(gatherly_server::entitlements::get_entitlements),
        )
        .route(
            "/entitlements/toggle",
            axum::routing::post(gatherly_server::entitlements::toggle_flag),
        )
        .route(
            "/entitlements/reset",
            axum::routing::post(gatherly_server::entitlements::reset_flags),
        )
        .route(
            "/entitlements/restrictions/{key}",
            axum::routing::get(gatherly_server::entitlements::get_restriction),
        )
        .route(
            "/events",
            axum::routing::post(gatherly_server::events::create_event)
                .get(gatherly_server::events::get_events),
        )
        .route(
            "/events/{id}",
            axum::routing::get(gatherly_server::events::get_event),
        )
        .route(
            "/events/{id}/cancel",
            axum::routing::post(gatherly_server::events::cancel_event),
        )
        .route(
            "/events/{id}/register",
            axum::routing::post(gatherly_server::events::register_for_event)
                .delete(gatherly_server::events::unregister_from_event),
        )
        .route(
            "/events/{id}/favorite",
            axum::routing::post(gatherly_server::events::favorite_event)
                .delete(gatherly_server::events::unfavorite_event),
        )
        .route(
            "/friends/request",
            axum::routing::post(gatherly_server::friends::send_friend_request),
        )
        .route(
            "/friends/accept",
            axum::routing::post(gatherly_server::friends::accept_friend_request),
        )
        .route(
            "/friends/reject",
            axum::routing::post(gatherly_server::friends::reject_friend_request),
        )
        .route(
            "/friends/requests",
            axum::routing::get(gatherly_server::friends::list_friend_requests),
        )
        .route(
            "/friends/list",
            axum::routing::get(gatherly_server::friends::list_friends),
        )
        .route(
            "/friends/quota",
            axum::routing::get(gatherly_server::friends::quota_status),
        )
        .route(
            "/messages",
            axum::routing::post(gatherly_server::messages::send_message),
        )
        .route(
            "/messages/conversation",
            axum::routing::get(gatherly_server::messages::get_conversation),
        )
        .layer(session_layer)
        .with_state(app_state.clone());

    Ok(TestApp {
        router,
        state: app_state,
    })
}

pub async fn create_test_user(
    app_state: &AppState,
    username: &str,
    password: &str,
) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use password_hash::rand_core::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4().to_string();
    let now = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)?;

    let conn = app_state.main_db.write().await;
    conn.execute(
        "INSERT INTO users (id, name, password_hash) VALUES (?, ?, ?)",
        (user_id.as_str(), username, hash.as_str()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create test user: {}", e))?;

    entitlements::seed_default_flags(&conn, &user_id, &now)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to seed entitlement flags: {}", e))?;

    Ok(user_id)
}

/// Flips the premium flag directly in the database.
#[allow(dead_code)]
pub async fn make_premium(app_state: &AppState, user_id: &str) -> anyhow::Result<()> {
    let conn = app_state.main_db.write().await;
    conn.execute(
        "UPDATE entitlement_flags SET value = TRUE WHERE user_id = ? AND key = ?",
        (user_id, FLAG_IS_PREMIUM),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to set premium flag: {}", e))?;
    Ok(())
}

pub async fn login_user(app: &Router, username: &str, password: &str) -> anyhow::Result<String> {
    let payload = serde_json::json!({
        "username": username,
        "password": password
    });

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("No session cookie in response"))?;

    Ok(set_cookie.to_string())
}

#[allow(dead_code)]
pub async fn auth_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::empty())
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
    let body_str = String::from_utf8(body.to_vec())?;

    Ok((status, body_str))
}

#[allow(dead_code)]
pub async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    payload: serde_json::Value,
) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
    let body_str = String::from_utf8(body.to_vec())?;

    Ok((status, body_str))
}
