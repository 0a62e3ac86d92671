#![allow(dead_code)]

use std::{
    collections::HashMap,
    future::IntoFuture,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU16, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use beacon_cache_proxy::{
    cache::{CacheConfig, CommitteeCache},
    infra::{
        http::{ProxyState, build_router},
        upstream::UpstreamProxy,
    },
};
use tempfile::TempDir;
use url::Url;

pub const COMMITTEES: &str = "/eth/v1/beacon/states/head/committees";
pub const FINALITY: &str = "/eth/v1/beacon/states/head/finality_checkpoints";

/// Committees body the mock upstream returns for `epoch`, byte for byte.
pub fn committees_body(epoch: u64) -> String {
    format!(
        r#"{{"execution_optimistic":false,"finalized":true,"data":[{{"index":"0","slot":"{}","validators":["1","2","3"]}}]}}"#,
        epoch * 32
    )
}

#[derive(Default)]
struct MockState {
    finalized: Mutex<String>,
    committees_status: AtomicU16,
    committees_empty: Mutex<bool>,
    committees_calls: AtomicUsize,
    finality_calls: AtomicUsize,
    other_calls: AtomicUsize,
}

/// In-process beacon node that counts requests per route.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            finalized: Mutex::new("0".to_string()),
            committees_status: AtomicU16::new(200),
            ..Default::default()
        });

        let router = Router::new()
            .route(FINALITY, get(finality))
            .route(COMMITTEES, any(committees))
            .fallback(echo)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock upstream binds");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(axum::serve(listener, router).into_future());

        Self { addr, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("mock url")
    }

    pub fn set_finalized(&self, epoch: &str) {
        *self.state.finalized.lock().expect("lock") = epoch.to_string();
    }

    pub fn set_committees_status(&self, status: StatusCode) {
        self.state
            .committees_status
            .store(status.as_u16(), Ordering::SeqCst);
    }

    pub fn set_committees_empty(&self, empty: bool) {
        *self.state.committees_empty.lock().expect("lock") = empty;
    }

    pub fn committees_calls(&self) -> usize {
        self.state.committees_calls.load(Ordering::SeqCst)
    }

    pub fn finality_calls(&self) -> usize {
        self.state.finality_calls.load(Ordering::SeqCst)
    }

    pub fn other_calls(&self) -> usize {
        self.state.other_calls.load(Ordering::SeqCst)
    }
}

async fn finality(State(state): State<Arc<MockState>>) -> Response {
    state.finality_calls.fetch_add(1, Ordering::SeqCst);
    let epoch = state.finalized.lock().expect("lock").clone();
    let body = format!(
        r#"{{"execution_optimistic":false,"finalized":true,"data":{{"previous_justified":{{"epoch":"0","root":"0x00"}},"current_justified":{{"epoch":"0","root":"0x00"}},"finalized":{{"epoch":"{epoch}","root":"0x00"}}}}}}"#
    );
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn committees(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.committees_calls.fetch_add(1, Ordering::SeqCst);

    let status = StatusCode::from_u16(state.committees_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status != StatusCode::OK {
        return (status, "upstream unavailable").into_response();
    }
    if *state.committees_empty.lock().expect("lock") {
        return StatusCode::OK.into_response();
    }

    let epoch = query
        .get("epoch")
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "application/json")],
        committees_body(epoch),
    )
        .into_response()
}

async fn echo(State(state): State<Arc<MockState>>, request: Request<Body>) -> Response {
    state.other_calls.fetch_add(1, Ordering::SeqCst);
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let method = request.method().clone();
    let received = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map(|body| body.len())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [
            ("x-upstream", "mock".to_string()),
            ("x-body-bytes", received.to_string()),
        ],
        format!("{method} {path}"),
    )
        .into_response()
}

/// Proxy router wired to a mock upstream and a temporary data directory.
pub struct Harness {
    pub dir: TempDir,
    pub cache: Arc<CommitteeCache>,
    pub upstream: Arc<UpstreamProxy>,
    pub mock: MockUpstream,
    pub router: Router,
}

impl Harness {
    pub async fn start() -> Self {
        let mock = MockUpstream::start().await;
        Self::with_upstream(mock.clone(), mock.url()).await
    }

    pub async fn with_upstream(mock: MockUpstream, url: Url) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let cache = Arc::new(
            CommitteeCache::open(CacheConfig::with_data_dir(dir.path())).expect("cache opens"),
        );
        let upstream =
            Arc::new(UpstreamProxy::new(url, Duration::from_secs(2)).expect("client builds"));
        let router = build_router(ProxyState {
            cache: Arc::clone(&cache),
            upstream: Arc::clone(&upstream),
        });
        Self {
            dir,
            cache,
            upstream,
            mock,
            router,
        }
    }

    pub fn record(&self, epoch: u64) -> PathBuf {
        self.dir.path().join(format!("{epoch}.pb"))
    }

    /// Wait for a background write to publish the record for `epoch`.
    pub async fn wait_for_record(&self, epoch: u64) -> bool {
        for _ in 0..200 {
            if self.record(epoch).exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub fn record_count(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .expect("read data dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".pb"))
            .count()
    }
}
