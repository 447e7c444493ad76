//! End-to-end redemption runs: engine plus real storefront client against a mock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redeemer_core::auth::{SessionAuthenticator, SessionCookie};
use redeemer_core::redeem::{ErrorTaxonomyEntry, Sleeper};
use redeemer_core::{
    AuthError, Authenticator, BrowserCookieLogin, EncryptedSessionStore, EngineError,
    RedeemError, RedemptionEngine, RedemptionKey, RedemptionReporter, Session, SessionStore,
    StorefrontClient, WaitSchedule,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const REDEEM_PATH: &str = "/account/ajaxregisterkey/";

fn session_for(server: &MockServer, token: &str) -> Session {
    let url = url::Url::parse(&server.uri()).unwrap();
    Session::new(
        vec![SessionCookie::new(
            url.host_str().unwrap().to_string(),
            false,
            "/".to_string(),
            false,
            0,
            "sessionid".to_string(),
            token.to_string(),
        )],
        None,
    )
}

/// Hands out a fixed replacement session and counts calls.
struct FixedAuthenticator {
    session: Option<Session>,
    calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for FixedAuthenticator {
    async fn authenticate(&self) -> Result<Session, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.session
            .clone()
            .ok_or_else(|| AuthError::cancelled("no replacement session"))
    }
}

#[derive(Default)]
struct CountingSleeper {
    slept: Mutex<Duration>,
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
    }
}

#[derive(Default)]
struct Transcript {
    lines: Mutex<Vec<String>>,
}

impl Transcript {
    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl RedemptionReporter for Transcript {
    fn key_skipped(&self, index: usize) {
        self.push(format!("skipped {index}"));
    }
    fn redeemed(&self, key: &RedemptionKey, items: &[String]) {
        self.push(format!("redeemed {key} {}", items.join(",")));
    }
    fn rejected(&self, key: &RedemptionKey, entry: &ErrorTaxonomyEntry) {
        self.push(format!("rejected {key} {}", entry.code));
    }
    fn rate_limited(&self, key: &RedemptionKey, _entry: &ErrorTaxonomyEntry) {
        self.push(format!("rate_limited {key}"));
    }
    fn waiting(&self, _key: &RedemptionKey, _frame: char, _elapsed: Duration) {}
    fn wait_finished(&self, key: &RedemptionKey) {
        self.push(format!("wait_finished {key}"));
    }
    fn transport_failed(&self, key: &RedemptionKey, _error: &RedeemError) {
        self.push(format!("transport_failed {key}"));
    }
    fn reauthenticated(&self, key: &RedemptionKey) {
        self.push(format!("reauthenticated {key}"));
    }
}

fn engine_for(
    server: &MockServer,
    authenticator: Arc<FixedAuthenticator>,
    sleeper: Arc<CountingSleeper>,
) -> RedemptionEngine {
    let client = StorefrontClient::new(url::Url::parse(&server.uri()).unwrap()).unwrap();
    RedemptionEngine::new(Arc::new(client), authenticator)
        .with_sleeper(sleeper)
        .with_schedule(WaitSchedule::new(
            Duration::from_secs(1),
            Duration::from_secs(3),
        ))
}

fn no_reauth() -> Arc<FixedAuthenticator> {
    Arc::new(FixedAuthenticator {
        session: None,
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn test_mixed_batch_reports_each_key_in_order() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("product_key=GOOD-KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": 1,
            "purchase_receipt_info": {"line_items": [{"line_item_description": "Half-Life 2"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("product_key=USED-KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": 2,
            "purchase_result_details": 15
        })))
        .mount(&server)
        .await;

    let sleeper = Arc::new(CountingSleeper::default());
    let engine = engine_for(&server, no_reauth(), sleeper.clone());
    let transcript = Transcript::default();
    let keys = vec![
        "GOOD-KEY".to_string(),
        "   ".to_string(),
        "USED-KEY".to_string(),
    ];

    let stats = engine
        .run(session_for(&server, "token"), &keys, &transcript)
        .await
        .unwrap();

    assert_eq!(
        transcript.lines(),
        vec!["redeemed GOOD-KEY Half-Life 2", "skipped 1", "rejected USED-KEY 15"]
    );
    assert_eq!(stats.redeemed(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.skipped(), 1);
    assert_eq!(*sleeper.slept.lock().unwrap(), Duration::ZERO);
}

#[tokio::test]
async fn test_rate_limit_waits_then_retries_same_key() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": 2,
            "purchase_result_details": 53
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": 1,
            "purchase_receipt_info": {"line_items": [{"line_item_description": "Portal"}]}
        })))
        .mount(&server)
        .await;

    let sleeper = Arc::new(CountingSleeper::default());
    let engine = engine_for(&server, no_reauth(), sleeper.clone());
    let transcript = Transcript::default();

    let stats = engine
        .run(
            session_for(&server, "token"),
            &["SLOW-KEY".to_string()],
            &transcript,
        )
        .await
        .unwrap();

    assert_eq!(
        transcript.lines(),
        vec![
            "rate_limited SLOW-KEY",
            "wait_finished SLOW-KEY",
            "redeemed SLOW-KEY Portal"
        ]
    );
    assert_eq!(stats.rate_limit_retries(), 2);
    assert_eq!(*sleeper.slept.lock().unwrap(), Duration::from_secs(6));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_expired_session_is_replaced_and_key_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("sessionid=stale"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login/"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("sessionid=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(2)
        .mount(&server)
        .await;

    let authenticator = Arc::new(FixedAuthenticator {
        session: Some(session_for(&server, "fresh")),
        calls: AtomicUsize::new(0),
    });
    let engine = engine_for(
        &server,
        authenticator.clone(),
        Arc::new(CountingSleeper::default()),
    );
    let transcript = Transcript::default();

    let stats = engine
        .run(
            session_for(&server, "stale"),
            &["KEY-ONE".to_string(), "KEY-TWO".to_string()],
            &transcript,
        )
        .await
        .unwrap();

    assert_eq!(authenticator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.redeemed(), 2);
    assert_eq!(stats.reauthentications(), 1);
    assert_eq!(
        transcript.lines(),
        vec!["reauthenticated KEY-ONE", "redeemed KEY-ONE ", "redeemed KEY-TWO "]
    );
}

#[tokio::test]
async fn test_failed_reauthentication_aborts_run() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, no_reauth(), Arc::new(CountingSleeper::default()));
    let error = engine
        .run(
            session_for(&server, "stale"),
            &["KEY-ONE".to_string(), "KEY-TWO".to_string()],
            &Transcript::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::Auth(_)));
}

#[tokio::test]
async fn test_storefront_outage_fails_key_and_continues() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("product_key=KEY-ONE"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("product_key=KEY-TWO"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .mount(&server)
        .await;

    let engine = engine_for(&server, no_reauth(), Arc::new(CountingSleeper::default()));
    let transcript = Transcript::default();
    let stats = engine
        .run(
            session_for(&server, "token"),
            &["KEY-ONE".to_string(), "KEY-TWO".to_string()],
            &transcript,
        )
        .await
        .unwrap();

    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.redeemed(), 1);
    assert_eq!(
        transcript.lines(),
        vec!["transport_failed KEY-ONE", "redeemed KEY-TWO "]
    );
}

#[tokio::test]
async fn test_saved_session_rejected_by_redemption_falls_back_to_login() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    // The key page still renders for the saved session; only redemption refuses it.
    Mock::given(method("GET"))
        .and(path("/account/registerkey"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("sessionid=stale"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REDEEM_PATH))
        .and(body_string_contains("sessionid=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(EncryptedSessionStore::with_key_material(
        dir.path().join("session.enc"),
        "engine-test-key",
    ));
    assert!(store.save(&session_for(&server, "stale")));

    let storefront = url::Url::parse(&server.uri()).unwrap();
    let host = storefront.host_str().unwrap().to_string();
    let login = Arc::new(BrowserCookieLogin::with_reader(
        storefront.clone(),
        Some("gaben".to_string()),
        std::io::Cursor::new(format!("{host}\tFALSE\t/\tFALSE\t0\tsessionid\tfresh\n\n")),
    ));
    let client = Arc::new(StorefrontClient::new(storefront).unwrap());
    let authenticator = Arc::new(SessionAuthenticator::new(
        store.clone(),
        login,
        client.clone(),
    ));

    let session = authenticator.authenticate().await.unwrap();
    assert_eq!(session.session_id(), Some("stale"));

    let transcript = Transcript::default();
    let stats = RedemptionEngine::new(client, authenticator)
        .run(session, &["KEY-ONE".to_string()], &transcript)
        .await
        .unwrap();

    assert_eq!(stats.redeemed(), 1);
    assert_eq!(stats.reauthentications(), 1);
    assert_eq!(
        transcript.lines(),
        vec!["reauthenticated KEY-ONE", "redeemed KEY-ONE "]
    );
    assert_eq!(store.load().unwrap().session_id(), Some("fresh"));
}
