// crates/link-locker-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Harness
// Description: In-process HTTP server over the in-memory store.
// Purpose: Drive the real router over loopback with deterministic time.
// Dependencies: axum, link-locker-core, link-locker-server, reqwest, tokio
// ============================================================================

//! ## Overview
//! The harness serves the router on `127.0.0.1:0` from a dedicated thread
//! with its own runtime, so tests stay synchronous and use the blocking HTTP
//! client. The clock is pinned and the audit sink captures every record.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::Router;
use link_locker_core::CatalogStore;
use link_locker_core::CountryCode;
use link_locker_core::EngineConfig;
use link_locker_core::FixedClock;
use link_locker_core::GeoInfo;
use link_locker_core::GeoResolver;
use link_locker_core::InMemoryLockerStore;
use link_locker_core::Locker;
use link_locker_core::LockerEngine;
use link_locker_core::Money;
use link_locker_core::SharedLockerStore;
use link_locker_core::StaticGeoResolver;
use link_locker_core::Task;
use link_locker_core::Timestamp;
use link_locker_core::Tier;
use link_locker_server::AppState;
use link_locker_server::MemoryAuditSink;
use link_locker_server::build_router;
use reqwest::blocking::Client;
use tokio::runtime::Builder;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Fixed start time for the harness clock.
pub const START_MILLIS: i64 = 1_700_000_000_000;
/// Publisher owning the fixture locker.
pub const PUBLISHER: &str = "pub-1";
/// Fixture locker id.
pub const LOCKER: &str = "locker-1";
/// Unsigned fixture task.
pub const TASK: &str = "task-1";
/// Fixture task with a postback secret.
pub const SIGNED_TASK: &str = "task-signed";
/// Postback secret of [`SIGNED_TASK`].
pub const SECRET: &str = "s3cret";
/// Visitor IP sent in `X-Forwarded-For`.
pub const VISITOR_IP: &str = "203.0.113.10";
/// Desktop Chrome user agent.
pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Task paying 4.50 CPM in tier 1 with a 30 second dwell time.
pub fn task(task_id: &str) -> Task {
    let mut task = Task::new(task_id, "survey");
    task.title = format!("Fixture {task_id}");
    task.completion_time_seconds = 30;
    task.cpm_tier1 = money("4.50");
    task.cpm_tier2 = money("2.00");
    task.cpm_tier3 = money("0.50");
    task.ad_url = Some("https://ads.example/offer?src=locker".to_string());
    task
}

/// Parses a money literal.
pub fn money(value: &str) -> Money {
    Money::parse(value).unwrap()
}

// ============================================================================
// SECTION: Server Handle
// ============================================================================

/// Running server plus direct handles on its collaborators.
pub struct TestServer {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Store shared with the engine.
    pub store: InMemoryLockerStore,
    /// Clock shared with the engine.
    pub clock: Arc<FixedClock>,
    /// Captured audit records.
    pub audit: Arc<MemoryAuditSink>,
    /// Blocking HTTP client.
    pub client: Client,
    /// Shutdown trigger.
    shutdown: Option<oneshot::Sender<()>>,
    /// Server thread.
    join: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    /// Starts a server with default settings and a US tier-1 geolocation.
    pub fn start() -> Self {
        let geo = StaticGeoResolver::new(GeoInfo::fallback(CountryCode::us(), Tier::Tier1));
        Self::start_with(EngineConfig::default(), Arc::new(geo), 65_536)
    }

    /// Starts a server with explicit engine settings, resolver, and body limit.
    pub fn start_with(
        config: EngineConfig,
        geo: Arc<dyn GeoResolver>,
        max_body_bytes: usize,
    ) -> Self {
        let store = InMemoryLockerStore::new();
        store.put_task(&task(TASK)).unwrap();
        let mut signed = task(SIGNED_TASK);
        signed.postback_secret = Some(SECRET.to_string());
        store.put_task(&signed).unwrap();
        store
            .put_locker(&Locker::new(LOCKER, PUBLISHER, "https://publisher.example/file"))
            .unwrap();
        let clock = Arc::new(FixedClock::new(Timestamp::from_unix_millis(START_MILLIS)));
        let engine =
            LockerEngine::new(SharedLockerStore::from_store(store.clone()), clock.clone(), config);
        let audit = Arc::new(MemoryAuditSink::new());
        let state = AppState::new(engine, geo, audit.clone(), Duration::from_secs(5));
        let router = build_router(state, max_body_bytes);
        let (base_url, shutdown, join) = spawn_router(router);
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(0)
            .build()
            .unwrap();
        Self {
            base_url,
            store,
            clock,
            audit,
            client,
            shutdown: Some(shutdown),
            join: Some(join),
        }
    }

    /// Returns an absolute URL for a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Serves a router on a loopback port from a dedicated runtime thread.
pub fn spawn_router(router: Router) -> (String, oneshot::Sender<()>, thread::JoinHandle<()>) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let join = thread::spawn(move || {
        let runtime = Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            let server = axum::serve(listener, service).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });
    });
    (format!("http://{addr}"), shutdown_tx, join)
}
