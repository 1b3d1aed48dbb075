//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the upstream API and run the
//! full cycle end-to-end: session acquisition, paginated feeds, profile
//! lookups and JSON artifacts.

use hashtag_crawler::config::{ApiSettings, CrawlConfig};
use hashtag_crawler::crawler::{run_batch, CancelHandle, CancelToken, CrawlDriver, RetryPolicy};
use hashtag_crawler::model::Target;
use hashtag_crawler::output::{load_posts, JsonFileSink};
use hashtag_crawler::session::{Credentials, LoginSource, Session, SessionManager, SessionState};
use hashtag_crawler::{AuthError, CrawlError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_settings(server: &MockServer) -> ApiSettings {
    ApiSettings {
        base_url: format!("{}/", server.uri()),
        ..ApiSettings::default()
    }
}

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

/// Writes a session file for `chef` holding the given session id
fn stored_session(server: &MockServer, session_file: &std::path::Path, session_id: &str) {
    let cookies: BTreeMap<String, String> = [
        ("sessionid", session_id),
        ("csrftoken", "tok"),
        ("ds_user_id", "42"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    SessionState::from_cookies(cookies, &base_url(server), Some("chef".to_string()))
        .unwrap()
        .save(session_file)
        .unwrap();
}

/// Builds a feed item the way the upstream lists it
fn item(code: &str, owner: u64, taken_at: i64, caption: &str) -> Value {
    json!({
        "code": code,
        "taken_at": taken_at,
        "media_type": 1,
        "user": { "pk": owner, "username": format!("user{}", owner) },
        "like_count": 10,
        "comment_count": 2,
        "caption": { "text": caption },
        "image_versions2": { "candidates": [ { "url": format!("https://cdn.test/{}.jpg", code) } ] }
    })
}

fn feed_page(items: Vec<Value>, next: Option<&str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "items": items,
        "more_available": next.is_some(),
        "next_max_id": next,
    }))
}

fn user_info(username: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "user": {
            "username": username,
            "full_name": format!("{} Full", username),
            "profile_pic_url": format!("https://cdn.test/{}.png", username),
            "media_count": 12,
            "follower_count": 340,
            "following_count": 56
        }
    }))
}

async fn mount_profiles(server: &MockServer, owners: &[u64]) {
    for owner in owners {
        Mock::given(method("GET"))
            .and(path(format!("/users/{}/info/", owner)))
            .respond_with(user_info(&format!("user{}", owner)))
            .mount(server)
            .await;
    }
}

/// Creates a session from cookies directly, validated against the mock server
async fn cookie_session(server: &MockServer, dir: &TempDir) -> Arc<Session> {
    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "pk": 42, "username": "chef" }
        })))
        .mount(server)
        .await;

    let cookie_file = dir.path().join("cookies.json");
    std::fs::write(
        &cookie_file,
        r#"{"sessionid": "sid", "csrftoken": "tok", "ds_user_id": "42"}"#,
    )
    .unwrap();

    let manager = SessionManager::new(&api_settings(server)).unwrap();
    let session = manager
        .acquire(&LoginSource::CookieFile(cookie_file), None)
        .await
        .unwrap();
    Arc::new(session)
}

fn crawl_config(dir: &TempDir, min_posts: usize, max_posts: usize) -> CrawlConfig {
    CrawlConfig::new(dir.path().join("out"))
        .with_posts(min_posts, max_posts)
        .with_retry(RetryPolicy::immediate(3))
        .with_profile_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_login_persists_session_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .and(body_string_contains("username=chef"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "sessionid=sid; Path=/; HttpOnly")
                .append_header("set-cookie", "csrftoken=tok; Path=/")
                .set_body_json(json!({
                    "status": "ok",
                    "authenticated": true,
                    "user_id": 42
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let session = manager.acquire(&source, Some(&session_file)).await.unwrap();

    assert!(session.is_valid());
    assert_eq!(session.user_id(), "42");
    assert_eq!(session.username(), Some("chef"));

    let saved = SessionState::load(&session_file).unwrap().unwrap();
    assert_eq!(saved.user_id, "42");
    assert_eq!(saved.cookie("sessionid"), Some("sid"));
    assert!(saved.saved_at.is_some());
}

#[tokio::test]
async fn test_restored_session_skips_login() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");

    stored_session(&server, &session_file, "stored");

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .and(header_regex("cookie", "sessionid=stored"))
        .and(header_regex("x-csrftoken", "^tok$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "pk": "42", "username": "chef" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let session = manager.acquire(&source, Some(&session_file)).await.unwrap();

    assert_eq!(session.user_id(), "42");
}

#[tokio::test]
async fn test_login_challenge() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "challenge_required",
            "checkpoint_url": "https://example.test/challenge/",
            "status": "fail"
        })))
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let err = manager.acquire(&source, None).await.unwrap_err();

    match err {
        AuthError::ChallengeRequired { checkpoint_url, .. } => {
            assert_eq!(checkpoint_url.as_deref(), Some("https://example.test/challenge/"));
        }
        other => panic!("expected a challenge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "The password you entered is incorrect.",
            "authenticated": false,
            "status": "fail"
        })))
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "wrong"));
    let err = manager.acquire(&source, None).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials { .. }));
}

#[tokio::test]
async fn test_restore_matches_username_case_insensitively() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");
    stored_session(&server, &session_file, "stored");

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "pk": 42, "username": "chef" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("Chef", "secret"));
    let session = manager.acquire(&source, Some(&session_file)).await.unwrap();

    assert_eq!(session.username(), Some("chef"));
}

#[tokio::test]
async fn test_unreachable_upstream_keeps_session_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");
    stored_session(&server, &session_file, "stored");

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server))
        .unwrap()
        .with_retry(RetryPolicy::immediate(2));
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let err = manager.acquire(&source, Some(&session_file)).await.unwrap_err();

    assert!(matches!(err, AuthError::Unavailable(_)), "got {:?}", err);
    let kept = SessionState::load(&session_file).unwrap().unwrap();
    assert_eq!(kept.cookie("sessionid"), Some("stored"));
}

#[tokio::test]
async fn test_session_check_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");
    stored_session(&server, &session_file, "stored");

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "pk": 42, "username": "chef" }
        })))
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server))
        .unwrap()
        .with_retry(RetryPolicy::immediate(2));
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let session = manager.acquire(&source, Some(&session_file)).await.unwrap();

    assert!(session.is_valid());
}

#[tokio::test]
async fn test_rejected_session_falls_back_to_login() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("session.json");
    stored_session(&server, &session_file, "stale");

    Mock::given(method("GET"))
        .and(path("/accounts/current_user/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "login_required",
            "status": "fail"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "sessionid=fresh; Path=/")
                .append_header("set-cookie", "csrftoken=tok2; Path=/")
                .append_header("set-cookie", "ds_user_id=42; Path=/")
                .set_body_json(json!({ "authenticated": true, "user_id": "42" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let session = manager.acquire(&source, Some(&session_file)).await.unwrap();

    assert_eq!(session.cookie("sessionid").as_deref(), Some("fresh"));
    let saved = SessionState::load(&session_file).unwrap().unwrap();
    assert_eq!(saved.cookie("sessionid"), Some("fresh"));
}

#[tokio::test]
async fn test_login_with_unreadable_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>Please enable JavaScript</body></html>"),
        )
        .mount(&server)
        .await;

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let source = LoginSource::Credentials(Credentials::new("chef", "secret"));
    let err = manager.acquire(&source, None).await.unwrap_err();

    match err {
        AuthError::Unexpected(message) => {
            assert!(message.contains("HTTP 200"));
            assert!(message.contains("unreadable body"));
        }
        other => panic!("expected an unexpected-response error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cookie_file_missing_session_cookie() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cookie_file = dir.path().join("cookies.json");
    std::fs::write(&cookie_file, r#"{"csrftoken": "tok", "ds_user_id": "42"}"#).unwrap();

    let manager = SessionManager::new(&api_settings(&server)).unwrap();
    let err = manager
        .acquire(&LoginSource::CookieFile(cookie_file), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::MissingCookies(ref names) if names == &["sessionid"]));
}

#[tokio::test]
async fn test_single_tag_crawl_writes_artifact() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/foodporn/feed/"))
        .and(query_param("max_id", "page2"))
        .respond_with(feed_page(
            vec![item("C3", 2, 1_700_000_100, "dessert #sweet")],
            None,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/foodporn/feed/"))
        .respond_with(feed_page(
            vec![
                item("A1", 1, 1_700_000_300, "lunch #FoodPorn"),
                item("B2", 1, 1_700_000_200, "dinner"),
            ],
            Some("page2"),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/1/info/"))
        .respond_with(user_info("user1"))
        .expect(1)
        .mount(&server)
        .await;
    mount_profiles(&server, &[2]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);
    let targets = vec![Target::parse("#FoodPorn").unwrap()];

    let summary = run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(summary.written(), 1);
    assert_eq!(summary.total_posts(), 3);

    let posts = load_posts(&dir.path().join("out").join("foodporn.json")).unwrap();
    let codes: Vec<&str> = posts.iter().map(|p| p.shortcode.as_str()).collect();
    assert_eq!(codes, vec!["A1", "B2", "C3"]);

    let dessert = &posts[2];
    assert_eq!(dessert.username, "user2");
    assert!(dessert.tags.contains("foodporn"));
    assert!(dessert.tags.contains("sweet"));
    assert_eq!(dessert.pic_url, "https://cdn.test/C3.jpg");
    assert_eq!(dessert.date.timestamp(), 1_700_000_100);
    assert_eq!(dessert.profile.as_ref().unwrap().follower_count, 340);
}

#[tokio::test]
async fn test_and_group_writes_intersection() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(
            vec![
                item("A", 1, 1_700_000_400, "#food"),
                item("B", 2, 1_700_000_300, "#food #pizza"),
                item("C", 3, 1_700_000_200, "#food #pizza"),
            ],
            None,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/pizza/feed/"))
        .respond_with(feed_page(
            vec![
                item("B", 2, 1_700_000_300, "#food #pizza"),
                item("C", 3, 1_700_000_200, "#food #pizza"),
                item("D", 4, 1_700_000_100, "#pizza"),
            ],
            None,
        ))
        .mount(&server)
        .await;
    mount_profiles(&server, &[1, 2, 3, 4]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);
    let targets = vec![Target::parse("pizza+food").unwrap()];

    run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap();

    let posts = load_posts(&dir.path().join("out").join("food_AND_pizza.json")).unwrap();
    let mut codes: Vec<&str> = posts.iter().map(|p| p.shortcode.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["B", "C"]);
    assert!(posts
        .iter()
        .all(|p| p.tags.contains("food") && p.tags.contains("pizza")));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "Please wait a few minutes before you try again.",
            "status": "fail"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(vec![item("A", 1, 1_700_000_000, "#food")], None))
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);

    let summary = run_batch(
        &driver,
        &[Target::single("food").unwrap()],
        &sink,
        true,
        &CancelToken::never(),
    )
    .await
    .unwrap();

    assert_eq!(summary.written(), 1);
    assert_eq!(summary.total_posts(), 1);
}

#[tokio::test]
async fn test_missing_tag_is_unavailable_and_batch_continues() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/nosuchtag/feed/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(vec![item("A", 1, 1_700_000_000, "")], None))
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);
    let targets = vec![
        Target::single("nosuchtag").unwrap(),
        Target::single("food").unwrap(),
    ];

    let summary = run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(summary.unavailable(), 1);
    assert_eq!(summary.written(), 1);
    assert!(!dir.path().join("out").join("nosuchtag.json").exists());
    assert!(dir.path().join("out").join("food.json").is_file());
}

#[tokio::test]
async fn test_profile_failure_keeps_post_without_profile() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(
            vec![
                item("A", 1, 1_700_000_200, "#food"),
                item("B", 7, 1_700_000_100, "#food"),
            ],
            None,
        ))
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    Mock::given(method("GET"))
        .and(path("/users/7/info/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);

    let summary = run_batch(
        &driver,
        &[Target::single("food").unwrap()],
        &sink,
        true,
        &CancelToken::never(),
    )
    .await
    .unwrap();
    assert_eq!(summary.profile_failures(), 1);

    let raw = std::fs::read_to_string(dir.path().join("out").join("food.json")).unwrap();
    let records: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(records[0]["profile"]["username"], "user1");
    assert_eq!(records[1]["username"], "user7");
    assert!(records[1]["profile"].is_null());
}

#[tokio::test]
async fn test_expired_session_aborts_batch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session.clone(), config);
    let targets = vec![
        Target::single("food").unwrap(),
        Target::single("pizza").unwrap(),
    ];

    let err = run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap_err();

    assert_eq!(err.target_key, "food");
    assert!(matches!(err.source, CrawlError::Auth(_)));
    assert!(!session.is_valid());
}

#[tokio::test]
async fn test_resume_skips_written_targets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(vec![item("A", 1, 1_700_000_000, "")], None))
        .expect(1)
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session, config);
    let targets = vec![Target::single("food").unwrap()];

    let first = run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(first.written(), 1);

    let second = run_batch(&driver, &targets, &sink, true, &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(second.skipped(), 1);
    assert_eq!(second.written(), 0);
}

#[tokio::test]
async fn test_rotated_cookie_is_sent_and_persisted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .and(query_param("max_id", "page2"))
        .and(header_regex("cookie", "sessionid=rotated"))
        .respond_with(feed_page(vec![item("B", 1, 1_700_000_100, "#food")], None))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(
            feed_page(vec![item("A", 1, 1_700_000_200, "#food")], Some("page2"))
                .append_header("set-cookie", "sessionid=rotated; Path=/"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    let config = crawl_config(&dir, 1, 10);
    let sink = JsonFileSink::new(&config.output_dir).unwrap();
    let driver = CrawlDriver::for_session(session.clone(), config);

    let summary = run_batch(
        &driver,
        &[Target::single("food").unwrap()],
        &sink,
        true,
        &CancelToken::never(),
    )
    .await
    .unwrap();
    assert_eq!(summary.total_posts(), 2);

    let session_file = dir.path().join("session.json");
    session.persist(&session_file).unwrap();
    let saved = SessionState::load(&session_file).unwrap().unwrap();
    assert_eq!(saved.cookie("sessionid"), Some("rotated"));
}

#[tokio::test]
async fn test_cancel_during_slow_page_leaves_session_usable() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session = cookie_session(&server, &dir).await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .and(query_param("max_id", "page2"))
        .respond_with(
            feed_page(vec![item("B", 1, 1_700_000_100, "#food")], None)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/food/feed/"))
        .respond_with(feed_page(
            vec![item("A", 1, 1_700_000_200, "#food")],
            Some("page2"),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tags/pizza/feed/"))
        .respond_with(feed_page(vec![item("P", 1, 1_700_000_300, "#pizza")], None))
        .mount(&server)
        .await;
    mount_profiles(&server, &[1]).await;

    let config = crawl_config(&dir, 1, 10);
    let driver = CrawlDriver::for_session(session.clone(), config);

    let cancel = CancelHandle::new();
    let token = cancel.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = driver
        .run(&Target::single("food").unwrap(), &token)
        .await
        .unwrap_err();
    assert!(matches!(err.source, CrawlError::Cancelled { .. }), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(session.is_valid());

    let result = driver
        .run(&Target::single("pizza").unwrap(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(result.posts.len(), 1);
    assert_eq!(result.posts[0].shortcode, "P");
}
