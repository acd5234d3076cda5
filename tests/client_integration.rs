//! Integration tests for the high-level client.
//!
//! These tests run against a local single-purpose HTTP stub on a loopback
//! port, so they exercise the full request/retry/delivery path without any
//! external network access.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use sovads::observer::{AdElement, IntersectionStream, ObserverConfig, Rect, Viewport};
use sovads::prelude::*;

const VIEWPORT: Viewport = Viewport {
    width: 1280.0,
    height: 720.0,
};

// ─── HTTP stub ───────────────────────────────────────────────────────────────

/// What the stub answers on `GET /ads`.
#[derive(Clone)]
struct AdsRoute {
    status: u16,
    body: String,
}

struct StubServer {
    addr: SocketAddr,
    /// Request lines seen, e.g. `"POST /events"`.
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(ads: AdsRoute) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let hits_accept = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let hits = Arc::clone(&hits_accept);
                let ads = ads.clone();
                tokio::spawn(handle_connection(stream, hits, ads));
            }
        });

        Self { addr, hits }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn count(&self, method_and_path_prefix: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with(method_and_path_prefix))
            .count()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    hits: Arc<Mutex<Vec<String>>>,
    ads: AdsRoute,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // Read headers.
    let header_end = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let request_line = headers.lines().next().unwrap_or("").to_string();
    let method_and_path = request_line
        .rsplitn(2, ' ')
        .last()
        .unwrap_or("")
        .to_string();

    // Drain the body so the client never sees a connection reset mid-write.
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let mut body_read = buf.len() - (header_end + 4);
    while body_read < content_length {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        body_read += n;
    }

    let (status, body) = if method_and_path.starts_with("GET /ads") {
        (ads.status, ads.body.clone())
    } else {
        (200u16, "{}".to_string())
    };

    hits.lock().unwrap().push(method_and_path);

    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ─── Test fixtures ───────────────────────────────────────────────────────────

fn valid_ad_json() -> String {
    serde_json::json!({
        "id": "ad_1",
        "campaignId": "cmp_1",
        "bannerUrl": "https://cdn.sovads.network/banners/1.png",
        "targetUrl": "https://advertiser.example/landing",
        "description": "Test creative",
    })
    .to_string()
}

fn client_for(server: &StubServer) -> SovAdsClient {
    SovAdsClient::builder()
        .site_id("integration-test")
        .api_url(&server.base_url())
        .observer_config(ObserverConfig {
            visibility_threshold: 0.5,
            poll_interval: Duration::from_millis(10),
            max_poll_duration: Duration::from_millis(500),
        })
        .build()
        .expect("client builds")
}

/// Test element with mutable geometry and no intersection capability,
/// driving the observer's polling fallback.
struct TestElement {
    bounds: Mutex<Option<Rect>>,
}

impl TestElement {
    fn new(bounds: Option<Rect>) -> Arc<Self> {
        Arc::new(Self {
            bounds: Mutex::new(bounds),
        })
    }

    fn set_bounds(&self, bounds: Option<Rect>) {
        *self.bounds.lock().unwrap() = bounds;
    }
}

impl AdElement for TestElement {
    fn bounds(&self) -> Option<Rect> {
        *self.bounds.lock().unwrap()
    }

    fn viewport(&self) -> Viewport {
        VIEWPORT
    }
}

fn on_screen() -> Rect {
    Rect {
        x: 100.0,
        y: 100.0,
        width: 300.0,
        height: 250.0,
    }
}

fn off_screen() -> Rect {
    Rect {
        x: 0.0,
        y: 5000.0,
        width: 300.0,
        height: 250.0,
    }
}

/// Give spawned observer/beacon tasks time to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

// ─── Ad loading ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn load_ad_returns_validated_creative() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.expect("creative loads");
    assert_eq!(ad.id.as_str(), "ad_1");
    assert_eq!(ad.campaign_id.as_str(), "cmp_1");
    assert_eq!(ad.target_url, "https://advertiser.example/landing");
}

#[tokio::test]
async fn load_ad_rejects_malformed_target_url() {
    let mut body: serde_json::Value = serde_json::from_str(&valid_ad_json()).unwrap();
    body["targetUrl"] = serde_json::Value::String("not a url".into());

    let server = StubServer::start(AdsRoute {
        status: 200,
        body: body.to_string(),
    })
    .await;
    let client = client_for(&server);

    assert!(client.load_ad(None).await.is_none());
}

#[tokio::test]
async fn load_ad_absorbs_network_exhaustion() {
    let server = StubServer::start(AdsRoute {
        status: 500,
        body: "{}".into(),
    })
    .await;
    let client = client_for(&server);

    // Degrades to None, never an error into the host page.
    assert!(client.load_ad(None).await.is_none());
}

// ─── Retry behavior ──────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_bound_is_exact() {
    let server = StubServer::start(AdsRoute {
        status: 500,
        body: "{}".into(),
    })
    .await;

    let http = SovHttp::new(&server.base_url()).unwrap();
    let err = http
        .get_ad(&SiteId::from("integration-test"), None)
        .await
        .expect_err("always-failing server must exhaust retries");

    // Idempotent policy: 1 initial + 3 retries.
    assert!(
        matches!(err, HttpError::MaxRetriesExceeded { attempts: 4, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(server.count("GET /ads"), 4);
}

#[tokio::test]
async fn non_retryable_status_fails_immediately() {
    let server = StubServer::start(AdsRoute {
        status: 400,
        body: "{}".into(),
    })
    .await;

    let http = SovHttp::new(&server.base_url()).unwrap();
    let err = http
        .get_ad(&SiteId::from("integration-test"), None)
        .await
        .expect_err("4xx must not be retried");

    assert!(matches!(err, HttpError::BadRequest(_)));
    assert_eq!(server.count("GET /ads"), 1);
}

#[tokio::test]
async fn close_cancels_pending_retries() {
    let server = StubServer::start(AdsRoute {
        status: 500,
        body: "{}".into(),
    })
    .await;

    let http = SovHttp::new(&server.base_url()).unwrap();
    let http2 = http.clone();
    let call = tokio::spawn(async move {
        http2.get_ad(&SiteId::from("integration-test"), None).await
    });

    // First attempt fires immediately; close during the first backoff window.
    tokio::time::sleep(Duration::from_millis(50)).await;
    http.close();

    let err = call.await.unwrap().expect_err("cancelled call must fail");
    assert!(matches!(err, HttpError::Cancelled), "got: {err:?}");
    assert_eq!(server.count("GET /ads"), 1);
}

// ─── Impression tracking ─────────────────────────────────────────────────────

#[tokio::test]
async fn visible_slot_tracks_exactly_one_impression() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    // Already visible at registration: the callback must still fire.
    let element = TestElement::new(Some(on_screen()));
    client.observe_slot(&slot, element).await.unwrap();

    settle().await;
    assert_eq!(server.count("POST /events"), 1);
}

/// Test element exposing the platform's push-based intersection capability.
struct StreamingElement {
    events: Mutex<Option<IntersectionStream>>,
}

impl AdElement for StreamingElement {
    fn bounds(&self) -> Option<Rect> {
        Some(off_screen())
    }

    fn viewport(&self) -> Viewport {
        VIEWPORT
    }

    fn intersection_events(&self) -> Option<IntersectionStream> {
        self.events.lock().unwrap().take()
    }
}

#[tokio::test]
async fn intersection_stream_drives_impression() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    // The creative scrolls into view after two partial intersections.
    let events: IntersectionStream = Box::pin(async_stream::stream! {
        yield 0.0;
        tokio::time::sleep(Duration::from_millis(20)).await;
        yield 0.3;
        tokio::time::sleep(Duration::from_millis(20)).await;
        yield 0.8;
    });
    let element = Arc::new(StreamingElement {
        events: Mutex::new(Some(events)),
    });
    client.observe_slot(&slot, element).await.unwrap();

    settle().await;
    assert_eq!(server.count("POST /events"), 1);
}

#[tokio::test]
async fn impression_dedupe_survives_repeat_claims() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let ad_id = ad.id.clone();
    let campaign_id = ad.campaign_id.clone();
    client
        .add_component(ContainerId::from("slot-1"), ad)
        .await
        .unwrap();

    let info = RenderInfo {
        rendered: true,
        viewport_visible: true,
        render_time_ms: 42,
    };

    // Two concurrent claims plus two sequential repeats: one delivery total.
    let first = client
        .tracker()
        .track_event(EventKind::Impression, &ad_id, &campaign_id, Some(info));
    let second = client
        .tracker()
        .track_event(EventKind::Impression, &ad_id, &campaign_id, Some(info));
    futures_util::join!(first, second);

    for _ in 0..2 {
        client
            .tracker()
            .track_event(EventKind::Impression, &ad_id, &campaign_id, Some(info))
            .await;
    }

    settle().await;
    assert_eq!(server.count("POST /events"), 1);
}

#[tokio::test]
async fn invisible_slot_never_tracks() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    // Stays below the fold until the polling bound expires.
    let element = TestElement::new(Some(off_screen()));
    client.observe_slot(&slot, element).await.unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(server.count("POST /events"), 0);
}

#[tokio::test]
async fn click_is_not_visibility_gated() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    // No observation, no visibility verdict: the click still goes out.
    client.track_click(&slot).await;

    settle().await;
    assert_eq!(server.count("POST /events"), 1);
}

#[tokio::test]
async fn post_event_uses_retrying_path() {
    use sovads::domain::event::wire::EventBody;

    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;

    let event = TrackingEvent::new(
        EventKind::Click,
        AdId::from("ad_1"),
        CampaignId::from("cmp_1"),
        None,
        ClientMetadata {
            fingerprint: sovads::fingerprint::generate(&EnvSignals),
            site_id: SiteId::from("integration-test"),
            timestamp: chrono::Utc::now(),
            consumer_id: None,
        },
    );

    let http = SovHttp::new(&server.base_url()).unwrap();
    http.post_event(&EventBody::from(&event)).await.unwrap();

    assert_eq!(server.count("POST /events"), 1);
}

// ─── Teardown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn destroy_halts_pending_visibility_tracking() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    let element = TestElement::new(Some(off_screen()));
    let observed: Arc<dyn AdElement> = Arc::clone(&element) as Arc<dyn AdElement>;
    client
        .observe_slot(&slot, observed)
        .await
        .unwrap();

    client.destroy().await;

    // The slot becomes visible only after teardown; nothing may deliver.
    element.set_bounds(Some(on_screen()));
    settle().await;

    assert_eq!(server.count("POST /events"), 0);
    assert!(client.is_destroyed());
}

#[tokio::test]
async fn destroy_silences_direct_tracking_calls() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let ad_id = ad.id.clone();
    let campaign_id = ad.campaign_id.clone();
    client
        .add_component(ContainerId::from("slot-1"), ad)
        .await
        .unwrap();

    client.destroy().await;

    let info = RenderInfo {
        rendered: true,
        viewport_visible: true,
        render_time_ms: 42,
    };
    client
        .tracker()
        .track_event(EventKind::Impression, &ad_id, &campaign_id, Some(info))
        .await;
    client.track_click(&ContainerId::from("slot-1")).await;

    settle().await;
    assert_eq!(server.count("POST /events"), 0);
}

#[tokio::test]
async fn removed_slot_stops_observing_and_frees_id() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let ad = client.load_ad(None).await.unwrap();
    let slot = ContainerId::from("slot-1");
    client.add_component(slot.clone(), ad).await.unwrap();

    let element = TestElement::new(Some(off_screen()));
    let observed: Arc<dyn AdElement> = Arc::clone(&element) as Arc<dyn AdElement>;
    client
        .observe_slot(&slot, observed)
        .await
        .unwrap();

    client.remove_component(&slot).await;

    element.set_bounds(Some(on_screen()));
    settle().await;
    assert_eq!(server.count("POST /events"), 0);

    // The container id is reusable for a fresh render cycle.
    let ad2 = client.load_ad(None).await.unwrap();
    client.add_component(slot.clone(), ad2).await.unwrap();
    assert!(client.get_component(&slot).await.is_some());
}

// ─── Debug channel ───────────────────────────────────────────────────────────

#[tokio::test]
async fn debug_mode_posts_debug_logs() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;

    let client = SovAdsClient::builder()
        .site_id("integration-test")
        .api_url(&server.base_url())
        .debug(true)
        .build()
        .unwrap();

    let _ = client.load_ad(None).await;
    settle().await;
    assert_eq!(server.count("POST /debug/log"), 1);
}

#[tokio::test]
async fn debug_logs_suppressed_by_default() {
    let server = StubServer::start(AdsRoute {
        status: 200,
        body: valid_ad_json(),
    })
    .await;
    let client = client_for(&server);

    let _ = client.load_ad(None).await;
    settle().await;
    assert_eq!(server.count("POST /debug/log"), 0);
}
