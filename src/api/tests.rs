use super::*;
use crate::config::Config;
use crate::db::{create_test_pool, migrations::run_migrations};
use crate::services::user::tests::PASSWORD;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

async fn test_server() -> (TestServer, TempDir) {
    test_server_with(Config::default()).await
}

async fn test_server_with(mut config: Config) -> (TestServer, TempDir) {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    config.upload.path = dir.path().join("uploads");

    let state = AppState::new(pool, &config).unwrap();
    let app = build_router(state, &config.server.cors_origin);
    (TestServer::new(app).unwrap(), dir)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn forwarded_for(ip: &str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static("x-forwarded-for"), HeaderValue::from_str(ip).unwrap())
}

async fn user_id(server: &TestServer, token: &str) -> i64 {
    server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(token))
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap()
}

/// Register through the API and return the session token
async fn register(server: &TestServer, first: &str, email: &str) -> String {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "first_name": first,
            "last_name": "Tester",
            "email": email,
            "password": PASSWORD,
            "confirm_password": PASSWORD,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_register_login_and_me() {
    let (server, _dir) = test_server().await;

    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "password": PASSWORD,
            "confirm_password": PASSWORD,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
    let body = response.json::<Value>();
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password_hash").is_none());

    let login = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ADA@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(login.status_code(), StatusCode::OK);
    let token = login.json::<Value>()["token"].as_str().unwrap().to_string();

    let me = server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(&token))
        .await;
    assert_eq!(me.status_code(), StatusCode::OK);
    assert_eq!(me.json::<Value>()["first_name"], "Ada");

    let logout = server
        .post("/api/v1/auth/logout")
        .add_header(HeaderName::from_static("authorization"), bearer(&token))
        .await;
    assert_eq!(logout.status_code(), StatusCode::NO_CONTENT);

    let after = server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(&token))
        .await;
    assert_eq!(after.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (server, _dir) = test_server().await;
    register(&server, "Ada", "ada@example.com").await;

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ada@example.com", "password": "Wrong1234" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let (server, _dir) = test_server().await;

    let response = server
        .post("/api/v1/messages")
        .json(&json!({ "content": "hello" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server.get("/api/v1/friends").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_like_and_read_messages() {
    let (server, _dir) = test_server().await;
    let ada = register(&server, "Ada", "ada@example.com").await;
    let bob = register(&server, "Bob", "bob@example.com").await;

    let created = server
        .post("/api/v1/messages")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .json(&json!({ "content": "Hello #rust" }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let message = created.json::<Value>();
    assert_eq!(message["hashtags"], json!(["rust"]));
    let id = message["id"].as_i64().unwrap();

    let liked = server
        .post(&format!("/api/v1/messages/{}/like", id))
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .await;
    assert_eq!(liked.status_code(), StatusCode::OK);
    assert_eq!(liked.json::<Value>()["result"], "added");

    let reply = server
        .post(&format!("/api/v1/messages/{}/reply", id))
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .json(&json!({ "content": "Hi Ada" }))
        .await;
    assert_eq!(reply.status_code(), StatusCode::CREATED);

    let fetched = server.get(&format!("/api/v1/messages/{}", id)).await;
    assert_eq!(fetched.status_code(), StatusCode::OK);
    let fetched = fetched.json::<Value>();
    assert_eq!(fetched["likes"], 1);
    assert_eq!(fetched["replies"].as_array().unwrap().len(), 1);

    let feed = server.get("/api/v1/feed").await.json::<Value>();
    assert_eq!(feed["total"], 1);

    let trending = server.get("/api/v1/feed/trending").await.json::<Value>();
    assert_eq!(trending[0]["tag"], "rust");

    // Only the author may delete
    let denied = server
        .delete(&format!("/api/v1/messages/{}", id))
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let notifications = server
        .get("/api/v1/notifications/unread-count")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .await
        .json::<Value>();
    assert_eq!(notifications["count"], 2);
}

#[tokio::test]
async fn test_missing_message_is_not_found() {
    let (server, _dir) = test_server().await;
    let response = server.get("/api/v1/messages/999").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_friend_request_flow() {
    let (server, _dir) = test_server().await;
    let ada = register(&server, "Ada", "ada@example.com").await;
    let bob = register(&server, "Bob", "bob@example.com").await;

    let bob_id = server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap();
    let ada_id = server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap();

    let sent = server
        .post(&format!("/api/v1/friends/{}", bob_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .await;
    assert_eq!(sent.status_code(), StatusCode::CREATED);

    let again = server
        .post(&format!("/api/v1/friends/{}", bob_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);

    let accepted = server
        .post(&format!("/api/v1/friends/{}/accept", ada_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .await;
    assert_eq!(accepted.status_code(), StatusCode::OK);

    let list = server
        .get("/api/v1/friends")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .await
        .json::<Value>();
    assert_eq!(list["friends"][0]["id"], bob_id);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let (server, _dir) = test_server().await;
    // The first account becomes the administrator
    let admin = register(&server, "Ada", "ada@example.com").await;
    let member = register(&server, "Bob", "bob@example.com").await;

    let denied = server
        .get("/api/v1/admin/dashboard")
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let dashboard = server
        .get("/api/v1/admin/dashboard")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(dashboard.status_code(), StatusCode::OK);
    assert_eq!(dashboard.json::<Value>()["total_users"], 2);

    let stats = server
        .get("/api/v1/admin/stats")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(stats.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_external_api_uses_app_credentials() {
    let (server, _dir) = test_server().await;
    let ada = register(&server, "Ada", "ada@example.com").await;

    let status = server.get("/api/status").await.json::<Value>();
    assert_eq!(status["status"], "ok");
    assert_eq!(status["database"], "connected");

    let anonymous = server.get("/api/me").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let created = server
        .post("/api/v1/apps")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .json(&json!({ "name": "Poster", "permissions": ["read:profile"] }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let credentials = created.json::<Value>()["credentials"].clone();
    let key = HeaderValue::from_str(credentials["api_key"].as_str().unwrap()).unwrap();
    let secret = HeaderValue::from_str(credentials["api_secret"].as_str().unwrap()).unwrap();

    let me = server
        .get("/api/me")
        .add_header(HeaderName::from_static("x-api-key"), key.clone())
        .add_header(HeaderName::from_static("x-api-secret"), secret.clone())
        .await;
    assert_eq!(me.status_code(), StatusCode::OK);
    assert_eq!(me.json::<Value>()["first_name"], "Ada");

    // Not granted write:messages
    let post = server
        .post("/api/messages")
        .add_header(HeaderName::from_static("x-api-key"), key.clone())
        .add_header(HeaderName::from_static("x-api-secret"), secret)
        .json(&json!({ "content": "from an app" }))
        .await;
    assert_eq!(post.status_code(), StatusCode::FORBIDDEN);

    let bad_secret = server
        .get("/api/me")
        .add_header(HeaderName::from_static("x-api-key"), key)
        .add_header(HeaderName::from_static("x-api-secret"), HeaderValue::from_static("nope"))
        .await;
    assert_eq!(bad_secret.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_pages_render_for_visitors_and_members() {
    let (server, _dir) = test_server().await;

    let home = server.get("/").await;
    assert_eq!(home.status_code(), StatusCode::OK);
    assert!(home.text().contains("Socialnet"));

    let login_page = server.get("/login").await;
    assert_eq!(login_page.status_code(), StatusCode::OK);

    // Anonymous visitors are sent to the login page
    let friends = server.get("/friends").await;
    assert_eq!(friends.status_code(), StatusCode::SEE_OTHER);

    let token = register(&server, "Ada", "ada@example.com").await;
    let cookie = HeaderValue::from_str(&format!("session={}", token)).unwrap();

    let profile = server
        .get("/profile")
        .add_header(HeaderName::from_static("cookie"), cookie.clone())
        .await;
    assert_eq!(profile.status_code(), StatusCode::OK);
    assert!(profile.text().contains("Ada"));

    let admin = server
        .get("/admin")
        .add_header(HeaderName::from_static("cookie"), cookie)
        .await;
    assert_eq!(admin.status_code(), StatusCode::OK);

    let missing = server.get("/profile/999").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_form_errors_rerender_page() {
    let (server, _dir) = test_server().await;
    register(&server, "Ada", "ada@example.com").await;

    let failed = server
        .post("/login")
        .form(&[("email", "ada@example.com"), ("password", "Wrong1234")])
        .await;
    assert_eq!(failed.status_code(), StatusCode::UNAUTHORIZED);
    assert!(failed.text().contains("ada@example.com"));

    let ok = server
        .post("/login")
        .form(&[("email", "ada@example.com"), ("password", PASSWORD)])
        .await;
    assert_eq!(ok.status_code(), StatusCode::SEE_OTHER);
    let cookie = ok.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("session="));
}

#[tokio::test]
async fn test_admin_moderates_users_messages_and_apps() {
    let (server, _dir) = test_server().await;
    let admin = register(&server, "Ada", "ada@example.com").await;
    let member = register(&server, "Bob", "bob@example.com").await;
    let admin_id = user_id(&server, &admin).await;
    let member_id = user_id(&server, &member).await;

    let message_id = server
        .post("/api/v1/messages")
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .json(&json!({ "content": "for friends", "visibility": "friends" }))
        .await
        .json::<Value>()["id"]
        .as_i64()
        .unwrap();

    // Moderation views include what the public listing hides
    let public = server.get("/api/v1/messages").await.json::<Value>();
    assert_eq!(public["total"], 0);
    let listed = server
        .get("/api/v1/admin/messages")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(listed.status_code(), StatusCode::OK);
    assert_eq!(listed.json::<Value>()["total"], 1);

    let not_admin = server
        .delete(&format!("/api/v1/admin/messages/{}", message_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .await;
    assert_eq!(not_admin.status_code(), StatusCode::FORBIDDEN);

    let removed = server
        .delete(&format!("/api/v1/admin/messages/{}", message_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(removed.status_code(), StatusCode::NO_CONTENT);
    let gone = server.get(&format!("/api/v1/messages/{}", message_id)).await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);

    let created = server
        .post("/api/v1/apps")
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .json(&json!({ "name": "Poster" }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let created = created.json::<Value>();
    let app_id = created["app"]["id"].as_i64().unwrap();
    let key = HeaderValue::from_str(created["credentials"]["api_key"].as_str().unwrap()).unwrap();
    let secret = HeaderValue::from_str(created["credentials"]["api_secret"].as_str().unwrap()).unwrap();

    let apps = server
        .get("/api/v1/admin/apps")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await
        .json::<Value>();
    assert_eq!(apps["total"], 1);

    let toggled = server
        .post(&format!("/api/v1/admin/apps/{}/toggle", app_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(toggled.status_code(), StatusCode::OK);
    assert_eq!(toggled.json::<Value>()["is_active"], false);
    let disabled = server
        .get("/api/me")
        .add_header(HeaderName::from_static("x-api-key"), key)
        .add_header(HeaderName::from_static("x-api-secret"), secret)
        .await;
    assert_eq!(disabled.status_code(), StatusCode::UNAUTHORIZED);

    let deleted_app = server
        .delete(&format!("/api/v1/admin/apps/{}", app_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(deleted_app.status_code(), StatusCode::NO_CONTENT);
    let missing_app = server
        .post(&format!("/api/v1/admin/apps/{}/toggle", app_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(missing_app.status_code(), StatusCode::NOT_FOUND);

    let own_account = server
        .delete(&format!("/api/v1/admin/users/{}", admin_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(own_account.status_code(), StatusCode::BAD_REQUEST);

    let deleted_user = server
        .delete(&format!("/api/v1/admin/users/{}", member_id))
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(deleted_user.status_code(), StatusCode::NO_CONTENT);
    let signed_out = server
        .get("/api/v1/auth/me")
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .await;
    assert_eq!(signed_out.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sixth_login_from_one_ip_is_throttled() {
    let (server, _dir) = test_server().await;
    register(&server, "Ada", "ada@example.com").await;
    let (name, ip) = forwarded_for("10.0.0.9");

    for _ in 0..5 {
        let ok = server
            .post("/api/v1/auth/login")
            .add_header(name.clone(), ip.clone())
            .json(&json!({ "email": "ada@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(ok.status_code(), StatusCode::OK);
    }

    let throttled = server
        .post("/api/v1/auth/login")
        .add_header(name.clone(), ip)
        .json(&json!({ "email": "ada@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.json::<Value>()["error"]["code"], "RATE_LIMITED");

    let (name, other) = forwarded_for("10.0.0.10");
    let elsewhere = server
        .post("/api/v1/auth/login")
        .add_header(name, other)
        .json(&json!({ "email": "ada@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(elsewhere.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_failed_logins_throttle_the_email_across_ips() {
    let (server, _dir) = test_server().await;
    register(&server, "Ada", "ada@example.com").await;

    for i in 1..=5 {
        let (name, ip) = forwarded_for(&format!("10.0.1.{}", i));
        let failed = server
            .post("/api/v1/auth/login")
            .add_header(name, ip)
            .json(&json!({ "email": "ada@example.com", "password": "Wrong1234" }))
            .await;
        assert_eq!(failed.status_code(), StatusCode::UNAUTHORIZED);
    }

    // Even the right password waits out the window
    let (name, ip) = forwarded_for("10.0.1.6");
    let throttled = server
        .post("/api/v1/auth/login")
        .add_header(name, ip)
        .json(&json!({ "email": "ada@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_eleventh_post_within_a_minute_is_throttled() {
    let (server, _dir) = test_server().await;
    let ada = register(&server, "Ada", "ada@example.com").await;
    let bob = register(&server, "Bob", "bob@example.com").await;

    for i in 0..10 {
        let created = server
            .post("/api/v1/messages")
            .add_header(HeaderName::from_static("authorization"), bearer(&ada))
            .json(&json!({ "content": format!("post {}", i) }))
            .await;
        assert_eq!(created.status_code(), StatusCode::CREATED);
    }

    let throttled = server
        .post("/api/v1/messages")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .json(&json!({ "content": "one too many" }))
        .await;
    assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        throttled.json::<Value>()["error"]["message"],
        "You are posting too fast, please slow down"
    );

    // The limit is per author
    let other = server
        .post("/api/v1/messages")
        .add_header(HeaderName::from_static("authorization"), bearer(&bob))
        .json(&json!({ "content": "my first" }))
        .await;
    assert_eq!(other.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_external_api_limits_by_ip_and_by_authenticated_key() {
    let mut config = Config::default();
    config.rate_limit.api_max = 3;
    let (server, _dir) = test_server_with(config).await;
    let ada = register(&server, "Ada", "ada@example.com").await;

    let credentials = server
        .post("/api/v1/apps")
        .add_header(HeaderName::from_static("authorization"), bearer(&ada))
        .json(&json!({ "name": "Poster" }))
        .await
        .json::<Value>()["credentials"]
        .clone();
    let key = HeaderValue::from_str(credentials["api_key"].as_str().unwrap()).unwrap();
    let secret = HeaderValue::from_str(credentials["api_secret"].as_str().unwrap()).unwrap();

    // Public routes count against the caller's IP
    let (name, ip) = forwarded_for("10.0.2.1");
    for _ in 0..3 {
        let ok = server.get("/api/status").add_header(name.clone(), ip.clone()).await;
        assert_eq!(ok.status_code(), StatusCode::OK);
    }
    let throttled = server.get("/api/status").add_header(name.clone(), ip).await;
    assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);

    // Guessing secrets for a key exhausts only the guesser's IP
    let (name, attacker) = forwarded_for("10.0.2.66");
    for _ in 0..3 {
        let wrong = server
            .get("/api/me")
            .add_header(name.clone(), attacker.clone())
            .add_header(HeaderName::from_static("x-api-key"), key.clone())
            .add_header(HeaderName::from_static("x-api-secret"), HeaderValue::from_static("guess"))
            .await;
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
    }
    let blocked = server
        .get("/api/me")
        .add_header(name, attacker)
        .add_header(HeaderName::from_static("x-api-key"), key.clone())
        .add_header(HeaderName::from_static("x-api-secret"), HeaderValue::from_static("guess"))
        .await;
    assert_eq!(blocked.status_code(), StatusCode::TOO_MANY_REQUESTS);

    // Authenticated calls count against the key wherever they come from
    for i in 1..=3 {
        let (name, ip) = forwarded_for(&format!("10.0.3.{}", i));
        let ok = server
            .get("/api/me")
            .add_header(name, ip)
            .add_header(HeaderName::from_static("x-api-key"), key.clone())
            .add_header(HeaderName::from_static("x-api-secret"), secret.clone())
            .await;
        assert_eq!(ok.status_code(), StatusCode::OK);
    }
    let (name, ip) = forwarded_for("10.0.3.4");
    let key_exhausted = server
        .get("/api/me")
        .add_header(name, ip)
        .add_header(HeaderName::from_static("x-api-key"), key)
        .add_header(HeaderName::from_static("x-api-secret"), secret)
        .await;
    assert_eq!(key_exhausted.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_admin_reloads_theme_from_disk() {
    let themes = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.theme.path = themes.path().to_path_buf();
    config.theme.active = "live".to_string();
    let (server, _dir) = test_server_with(config).await;
    let admin = register(&server, "Ada", "ada@example.com").await;
    let member = register(&server, "Bob", "bob@example.com").await;

    let theme_dir = themes.path().join("live");
    std::fs::create_dir_all(&theme_dir).unwrap();
    std::fs::write(theme_dir.join("login.html"), "<p>custom login</p>").unwrap();
    assert!(!server.get("/login").await.text().contains("custom login"));

    let denied = server
        .post("/api/v1/admin/theme/reload")
        .add_header(HeaderName::from_static("authorization"), bearer(&member))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let reloaded = server
        .post("/api/v1/admin/theme/reload")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(reloaded.status_code(), StatusCode::OK);
    assert_eq!(reloaded.json::<Value>()["theme"], "live");
    assert!(server.get("/login").await.text().contains("custom login"));

    // A broken template is rejected and the working set stays
    std::fs::write(theme_dir.join("index.html"), "{% if %}").unwrap();
    let broken = server
        .post("/api/v1/admin/theme/reload")
        .add_header(HeaderName::from_static("authorization"), bearer(&admin))
        .await;
    assert_eq!(broken.status_code(), StatusCode::BAD_REQUEST);
    assert!(server.get("/login").await.text().contains("custom login"));
}
