//! End-to-end launch scenarios: the full orchestrator stack against a mock
//! configuration endpoint and an in-memory state store.

use anyhow::Result;
use coldstart::BootstrapOutcome;
use coldstart::attribution::{AttributionPayload, AttributionStore};
use coldstart::connectivity::ConnectivityMonitor;
use coldstart::device::DeviceProfile;
use coldstart::orchestrator::Orchestrator;
use coldstart::permission::{PermissionAuthority, PermissionGate, PermissionStatus};
use coldstart::resolver::ConfigResolver;
use coldstart::session::{ContentSession, CookieRecord, ExternalOpener, ResponseDecision};
use coldstart::store::{MemoryStateStore, StateStore, keys};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StubAuthority {
    status: PermissionStatus,
    grant: bool,
}

impl PermissionAuthority for StubAuthority {
    fn status(&self) -> Pin<Box<dyn Future<Output = Result<PermissionStatus>> + Send + '_>> {
        let status = self.status;
        Box::pin(async move { Ok(status) })
    }

    fn request(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let grant = self.grant;
        Box::pin(async move { Ok(grant) })
    }
}

struct NoopOpener;

impl ExternalOpener for NoopOpener {
    fn can_open(&self, _url: &Url) -> bool {
        false
    }

    fn open(&self, _url: &Url) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

struct Harness {
    store: Arc<MemoryStateStore>,
    connectivity: ConnectivityMonitor,
    attribution: Arc<AttributionStore>,
    orchestrator: Orchestrator,
}

fn harness(endpoint: &str, online: bool, authority: StubAuthority) -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let connectivity = ConnectivityMonitor::new(online);
    let attribution = Arc::new(AttributionStore::new(store.clone()));
    let gate = Arc::new(PermissionGate::new(store.clone(), Arc::new(authority)));
    let device = DeviceProfile::new("com.harvestledger.app", "id0000000000", "proj-1", "en_US");
    let resolver = Arc::new(ConfigResolver::new(
        store.clone() as Arc<dyn StateStore>,
        attribution.clone(),
        device,
        endpoint,
    ));
    let orchestrator = Orchestrator::new(&connectivity, attribution.clone(), gate, resolver);
    Harness {
        store,
        connectivity,
        attribution,
        orchestrator,
    }
}

fn granted() -> StubAuthority {
    StubAuthority {
        status: PermissionStatus::Granted,
        grant: true,
    }
}

async fn report_conversion(attribution: &AttributionStore, organic: bool) {
    let mut fields = BTreeMap::new();
    fields.insert(
        "af_status".to_string(),
        serde_json::json!(if organic { "Organic" } else { "Non-organic" }),
    );
    attribution
        .record_conversion(&AttributionPayload::new(fields))
        .await
        .unwrap();
}

fn content_mock(url: &str) -> Mock {
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200).set_body_json(
        serde_json::json!({
            "ok": true,
            "url": url,
            "expires": chrono::Utc::now().timestamp() + 3600,
        }),
    ))
}

#[tokio::test]
async fn organic_first_launch_resolves_to_content() {
    let server = MockServer::start().await;
    content_mock("https://x").expect(1).mount(&server).await;

    let h = harness(&server.uri(), true, granted());
    report_conversion(&h.attribution, true).await;

    let outcome = h.orchestrator.run().await;
    assert_eq!(outcome, BootstrapOutcome::ShowContent("https://x".into()));
    assert_eq!(
        h.store.get(keys::CONFIG_URL).await.unwrap().as_deref(),
        Some("https://x")
    );
}

#[tokio::test]
async fn latched_install_shows_main_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true, granted());
    h.store.seed(keys::CONFIG_NO_MORE_REQUESTS, "true");
    report_conversion(&h.attribution, false).await;

    let outcome = h.orchestrator.run().await;
    assert_eq!(outcome, BootstrapOutcome::ShowMain);
}

#[tokio::test]
async fn endpoint_failure_latches_and_stays_latched_across_launches() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&failing)
        .await;

    let first = harness(&failing.uri(), true, granted());
    report_conversion(&first.attribution, true).await;
    assert_eq!(first.orchestrator.run().await, BootstrapOutcome::ShowMain);
    assert_eq!(
        first
            .store
            .get(keys::CONFIG_NO_MORE_REQUESTS)
            .await
            .unwrap()
            .as_deref(),
        Some("true")
    );

    // Relaunch over the same persisted state: a healthy endpoint must still
    // never be contacted.
    let healthy = MockServer::start().await;
    content_mock("https://x").expect(0).mount(&healthy).await;

    let connectivity = ConnectivityMonitor::new(true);
    let attribution = Arc::new(AttributionStore::new(first.store.clone()));
    let gate = Arc::new(PermissionGate::new(first.store.clone(), Arc::new(granted())));
    let device = DeviceProfile::new("com.harvestledger.app", "id0000000000", "proj-1", "en_US");
    let resolver = Arc::new(ConfigResolver::new(
        first.store.clone() as Arc<dyn StateStore>,
        attribution.clone(),
        device,
        &healthy.uri(),
    ));
    let relaunch = Orchestrator::new(&connectivity, attribution.clone(), gate, resolver);
    report_conversion(&attribution, true).await;

    assert_eq!(relaunch.run().await, BootstrapOutcome::ShowMain);
}

#[tokio::test]
async fn offline_launch_recovers_exactly_once_on_reconnect() {
    let server = MockServer::start().await;
    content_mock("https://x").expect(1).mount(&server).await;

    let h = harness(&server.uri(), false, granted());
    report_conversion(&h.attribution, true).await;

    let mut outcomes = h.orchestrator.outcome();
    let connectivity = h.connectivity;
    let run = tokio::spawn(h.orchestrator.run());

    outcomes
        .wait_for(|outcome| outcome == &Some(BootstrapOutcome::ShowOffline))
        .await
        .unwrap();

    connectivity.set_online(true);

    let final_outcome = run.await.unwrap();
    assert_eq!(final_outcome, BootstrapOutcome::ShowContent("https://x".into()));
}

#[tokio::test]
async fn deep_link_preempts_pending_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "ok": true,
                    "url": "https://resolved",
                    "expires": chrono::Utc::now().timestamp() + 3600,
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true, granted());
    report_conversion(&h.attribution, true).await;

    let handle = h.orchestrator.handle();
    let run = tokio::spawn(h.orchestrator.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.deep_link("https://deep");

    let outcome = run.await.unwrap();
    assert_eq!(outcome, BootstrapOutcome::ShowContent("https://deep".into()));
}

#[tokio::test]
async fn hung_endpoint_falls_back_to_main() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), true, granted());
    report_conversion(&h.attribution, true).await;

    let outcome = h
        .orchestrator
        .with_fallback_timeout(Duration::from_millis(100))
        .run()
        .await;
    assert_eq!(outcome, BootstrapOutcome::ShowMain);
}

#[tokio::test]
async fn non_organic_denial_is_recorded_and_pipeline_continues() {
    let server = MockServer::start().await;
    content_mock("https://x").mount(&server).await;

    let h = harness(
        &server.uri(),
        true,
        StubAuthority {
            status: PermissionStatus::NotDetermined,
            grant: false,
        },
    );
    report_conversion(&h.attribution, false).await;

    let outcome = h.orchestrator.run().await;
    assert_eq!(outcome, BootstrapOutcome::ShowContent("https://x".into()));
    assert!(
        h.store
            .get(keys::LAST_NOTIFICATION_DENIED)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn cookies_persist_after_first_successful_page() {
    let server = MockServer::start().await;
    content_mock("https://x").mount(&server).await;

    let h = harness(&server.uri(), true, granted());
    report_conversion(&h.attribution, true).await;

    let outcome = h.orchestrator.run().await;
    let BootstrapOutcome::ShowContent(url) = outcome else {
        panic!("expected content outcome");
    };

    let mut session = ContentSession::new(h.store.clone(), Arc::new(NoopOpener));
    session.start().await.unwrap();

    assert_eq!(session.decide_response(200), ResponseDecision::AllowAndReveal);
    session
        .finish_navigation(
            &url,
            &[CookieRecord {
                name: "sid".into(),
                value: "abc".into(),
                domain: "x".into(),
                path: "/".into(),
                expires_at: None,
                secure: true,
                http_only: true,
            }],
        )
        .await
        .unwrap();

    assert!(h.store.get(keys::COOKIE).await.unwrap().is_some());
    assert_eq!(
        h.store.get(keys::LAST_URL).await.unwrap().as_deref(),
        Some("https://x")
    );
}
