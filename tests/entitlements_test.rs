mod common;

use axum::http::StatusCode;
use gatherly_server::constants::{DEFAULT_ENTITLEMENT_FLAGS, FLAG_IS_PREMIUM};
use serde_json::{Value, json};

async fn get_entitlements(app: &axum::Router, cookie: &str) -> Value {
    let (status, body) = common::auth_request(app, "GET", "/entitlements", cookie)
        .await
        .expect("entitlements request failed");
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).expect("invalid entitlements response")
}

fn flag_value(response: &Value, key: &str) -> bool {
    response["flags"]
        .as_array()
        .expect("flags must be an array")
        .iter()
        .find(|f| f["key"] == key)
        .unwrap_or_else(|| panic!("flag {} missing", key))["value"]
        .as_bool()
        .expect("flag value must be a bool")
}

#[tokio::test]
async fn test_defaults_seeded_on_register() {
    let app = common::setup_test_app().await.expect("setup failed");

    let payload = json!({"username": "alice", "password": "password123"});
    let (status, _) = common::json_request(&app.router, "POST", "/auth/register", "", payload)
        .await
        .expect("register failed");
    assert_eq!(status, StatusCode::CREATED);

    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let response = get_entitlements(&app.router, &cookie).await;

    let flags = response["flags"].as_array().expect("flags missing");
    assert_eq!(flags.len(), DEFAULT_ENTITLEMENT_FLAGS.len());

    for (key, value, category, is_togglable) in DEFAULT_ENTITLEMENT_FLAGS {
        let flag = flags
            .iter()
            .find(|f| f["key"] == *key)
            .unwrap_or_else(|| panic!("default flag {} missing", key));
        assert_eq!(flag["value"].as_bool().unwrap(), *value);
        assert_eq!(flag["category"].as_str().unwrap(), *category);
        assert_eq!(flag["is_togglable"].as_bool().unwrap(), *is_togglable);
    }

    assert_eq!(response["is_premium"], false);
}

#[tokio::test]
async fn test_toggle_flag_persists() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let before = get_entitlements(&app.router, &cookie).await;
    assert!(!flag_value(&before, "restrict_profile_badges"));

    let payload = json!({"key": "restrict_profile_badges"});
    let (status, body) = common::json_request(
        &app.router,
        "POST",
        "/entitlements/toggle",
        &cookie,
        payload,
    )
    .await
    .expect("toggle failed");
    assert_eq!(status, StatusCode::OK);

    let toggled: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(toggled["value"], true);

    // Re-read to confirm the change was persisted, not just echoed
    let after = get_entitlements(&app.router, &cookie).await;
    assert!(flag_value(&after, "restrict_profile_badges"));
}

#[tokio::test]
async fn test_toggle_unknown_key_is_an_error() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let payload = json!({"key": "no_such_flag"});
    let (status, body) = common::json_request(
        &app.router,
        "POST",
        "/entitlements/toggle",
        &cookie,
        payload,
    )
    .await
    .expect("toggle failed");

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Unknown entitlement flag"));
}

#[tokio::test]
async fn test_toggle_non_togglable_flag_forbidden() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let payload = json!({"key": "show_ads"});
    let (status, _) = common::json_request(
        &app.router,
        "POST",
        "/entitlements/toggle",
        &cookie,
        payload,
    )
    .await
    .expect("toggle failed");

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reset_restores_defaults() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    for key in ["restrict_profile_badges", FLAG_IS_PREMIUM] {
        let (status, _) = common::json_request(
            &app.router,
            "POST",
            "/entitlements/toggle",
            &cookie,
            json!({ "key": key }),
        )
        .await
        .expect("toggle failed");
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = common::auth_request(&app.router, "POST", "/entitlements/reset", &cookie)
        .await
        .expect("reset failed");
    assert_eq!(status, StatusCode::OK);

    let response = get_entitlements(&app.router, &cookie).await;
    for (key, value, _, _) in DEFAULT_ENTITLEMENT_FLAGS {
        assert_eq!(
            flag_value(&response, key),
            *value,
            "flag {} not restored to default",
            key
        );
    }
    assert_eq!(response["is_premium"], false);
}

#[tokio::test]
async fn test_premium_disables_every_restriction() {
    let app = common::setup_test_app().await.expect("setup failed");
    let user_id = common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    // While free, the stored value applies
    let (status, body) = common::auth_request(
        &app.router,
        "GET",
        "/entitlements/restrictions/restrict_event_creation",
        &cookie,
    )
    .await
    .expect("restriction request failed");
    assert_eq!(status, StatusCode::OK);
    let evaluated: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(evaluated["restricted"], true);

    common::make_premium(&app.state, &user_id)
        .await
        .expect("premium upgrade failed");

    // Premium short-circuits every key to unrestricted, stored values included
    for (key, _, _, _) in DEFAULT_ENTITLEMENT_FLAGS {
        let uri = format!("/entitlements/restrictions/{}", key);
        let (status, body) = common::auth_request(&app.router, "GET", &uri, &cookie)
            .await
            .expect("restriction request failed");
        assert_eq!(status, StatusCode::OK);
        let evaluated: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(evaluated["restricted"], false, "key {} not unrestricted", key);
    }
}

#[tokio::test]
async fn test_unknown_restriction_reads_as_unrestricted() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let (status, body) = common::auth_request(
        &app.router,
        "GET",
        "/entitlements/restrictions/no_such_flag",
        &cookie,
    )
    .await
    .expect("restriction request failed");

    assert_eq!(status, StatusCode::OK);
    let evaluated: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(evaluated["restricted"], false);
}

#[tokio::test]
async fn test_limit_profile_follows_premium_status() {
    let app = common::setup_test_app().await.expect("setup failed");
    let user_id = common::create_test_user(&app.state, "alice", "password123")
        .await
        .expect("create alice failed");
    let cookie = common::login_user(&app.router, "alice", "password123")
        .await
        .expect("login failed");

    let free = get_entitlements(&app.router, &cookie).await;
    common::make_premium(&app.state, &user_id)
        .await
        .expect("premium upgrade failed");
    let premium = get_entitlements(&app.router, &cookie).await;

    assert_eq!(premium["is_premium"], true);
    for field in [
        "max_participants",
        "max_registrations",
        "max_favorites",
        "max_active_events",
    ] {
        let free_value = free["limits"][field].as_u64().unwrap();
        let premium_value = premium["limits"][field].as_u64().unwrap();
        assert!(
            premium_value > free_value,
            "premium {} must exceed free",
            field
        );
    }
}
