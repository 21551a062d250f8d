/// Integration tests: controller driven through ready → late-startup → quitting.
mod common;

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;

use jsbridge_lib::{
    config::TransportPolicy,
    error::{BridgeError, Result},
    lifecycle::{HostSignal, LifecycleState},
    probe::wait_for_bridge,
    server::ServerState,
    transport::{
        ReleaseWatch, ThreadedTransport, Transport, TransportKind, DEGRADED_MODE_NOTICE,
    },
};

/// Threaded listener whose `stop` releases the port but still reports failure.
#[derive(Debug, Default)]
struct FailingStopTransport {
    inner: ThreadedTransport,
}

impl Transport for FailingStopTransport {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        self.inner.start(addr)
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()?;
        Err(BridgeError::Stop {
            message: "listener refused to close".to_string(),
        })
    }

    fn release_watch(&self) -> ReleaseWatch {
        self.inner.release_watch()
    }
}

fn failing_stop_factory() -> Result<Box<dyn Transport>> {
    Ok(Box::new(FailingStopTransport::default()))
}

fn unavailable() -> Result<Box<dyn Transport>> {
    Err(BridgeError::TransportUnavailable {
        message: "no listener support".to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Full lifecycle on the preferred transport
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_full_lifecycle_starts_and_stops_server() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::Auto);

    assert_eq!(
        controller.observe(HostSignal::EnvironmentReady),
        LifecycleState::Initialized
    );
    assert_eq!(
        controller.registered_hooks(),
        vec![HostSignal::LateStartupComplete, HostSignal::ApplicationQuitting]
    );
    assert!(controller.server().is_none(), "server must wait for late startup");

    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Running
    );
    let server = controller.server().expect("server should be owned while running");
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(server.kind(), TransportKind::Preferred);
    assert_eq!(server.port(), port);

    let addr = server.local_addr().unwrap();
    let _client = wait_for_bridge(addr, Duration::from_secs(5)).await.unwrap();

    assert_eq!(
        controller.observe(HostSignal::ApplicationQuitting),
        LifecycleState::Terminated
    );
    assert!(controller.registered_hooks().is_empty());
    assert!(controller.server().is_none());

    tokio::time::timeout(Duration::from_secs(5), controller.wait_for_release())
        .await
        .unwrap();
    assert!(std::net::TcpListener::bind(addr).is_ok(), "port should be released");

    let log = common::read_log(dir.path());
    let ready = log.find("---environment-ready---").unwrap();
    let late = log.find("---late-startup-complete---").unwrap();
    let quit = log.find("---application-quitting---").unwrap();
    let stopped = log.find("jsbridge server stopped").unwrap();
    let terminated = log.find("jsbridge lifecycle terminated").unwrap();
    assert!(ready < late && late < quit && quit < stopped && stopped < terminated);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Quitting before late startup never touches a server
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_quitting_before_late_startup_skips_stop() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::Auto);

    controller.observe(HostSignal::EnvironmentReady);
    assert_eq!(
        controller.observe(HostSignal::ApplicationQuitting),
        LifecycleState::Terminated
    );
    assert!(controller.registered_hooks().is_empty());

    // A late-startup arriving after teardown must not bind anything.
    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Terminated
    );
    assert!(controller.server().is_none());
    controller.wait_for_release().await;

    let log = common::read_log(dir.path());
    assert!(!log.contains("jsbridge server stopped"));
    assert!(!log.contains("---late-startup-complete---"));
    assert!(log.contains("jsbridge lifecycle terminated"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Duplicate late-startup starts the server once
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_duplicate_late_startup_starts_once() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::Auto);

    controller.observe(HostSignal::EnvironmentReady);
    controller.observe(HostSignal::LateStartupComplete);
    let first_addr = controller.server().unwrap().local_addr();

    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Running
    );
    assert_eq!(controller.server().unwrap().local_addr(), first_addr);
    assert!(controller
        .registered_hooks()
        .contains(&HostSignal::LateStartupComplete));

    let log = common::read_log(dir.path());
    assert_eq!(log.matches("jsbridge server listening on").count(), 1);
    assert!(!log.contains("failed to start"));

    controller.observe(HostSignal::ApplicationQuitting);
    controller.wait_for_release().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: A busy port keeps the controller initialized
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_bind_failure_keeps_controller_initialized() {
    let dir = TempDir::new().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::Auto);

    controller.observe(HostSignal::EnvironmentReady);
    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Initialized
    );
    assert!(controller.server().is_none());
    assert!(controller.server_status().is_none());

    let log = common::read_log(dir.path());
    assert!(log.contains("jsbridge server failed to start"));

    assert_eq!(
        controller.observe(HostSignal::ApplicationQuitting),
        LifecycleState::Terminated
    );
    assert!(controller.registered_hooks().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: Without a runtime the controller degrades to the fallback transport
// ─────────────────────────────────────────────────────────────────────────────
#[test]
fn test_lifecycle_without_runtime_uses_fallback() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::Auto);

    controller.observe(HostSignal::EnvironmentReady);
    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Running
    );

    let status = controller.server_status().unwrap();
    assert!(status.running);
    assert_eq!(status.transport, TransportKind::Fallback);
    let addr = status.local_addr.unwrap();
    assert!(std::net::TcpStream::connect(addr).is_ok());

    controller.observe(HostSignal::ApplicationQuitting);
    assert!(std::net::TcpListener::bind(addr).is_ok());

    let log = common::read_log(dir.path());
    assert_eq!(log.matches(DEGRADED_MODE_NOTICE).count(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: Repeated quitting signals are absorbed
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_repeated_quitting_is_noop() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller = common::make_controller(port, dir.path(), TransportPolicy::FallbackOnly);

    controller.observe(HostSignal::EnvironmentReady);
    controller.observe(HostSignal::LateStartupComplete);
    assert_eq!(controller.server().unwrap().kind(), TransportKind::Fallback);

    for _ in 0..3 {
        assert_eq!(
            controller.observe(HostSignal::ApplicationQuitting),
            LifecycleState::Terminated
        );
    }

    let log = common::read_log(dir.path());
    assert_eq!(log.matches("---application-quitting---").count(), 1);
    assert_eq!(log.matches("jsbridge lifecycle terminated").count(), 1);
    assert!(!log.contains(DEGRADED_MODE_NOTICE));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: A failing stop is logged and shutdown still completes
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_stop_failure_still_terminates() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller =
        common::make_controller_with_factories(port, dir.path(), None, failing_stop_factory);

    controller.observe(HostSignal::EnvironmentReady);
    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Running
    );
    let addr = controller.server().unwrap().local_addr().unwrap();

    assert_eq!(
        controller.observe(HostSignal::ApplicationQuitting),
        LifecycleState::Terminated
    );
    assert!(controller.registered_hooks().is_empty());
    assert!(controller.server().is_none());

    tokio::time::timeout(Duration::from_secs(5), controller.wait_for_release())
        .await
        .unwrap();
    assert!(std::net::TcpListener::bind(addr).is_ok());

    let log = common::read_log(dir.path());
    let failed = log.find("jsbridge server stop failed").unwrap();
    let terminated = log.find("jsbridge lifecycle terminated").unwrap();
    assert!(failed < terminated);
    assert!(log.contains("listener refused to close"));
    assert!(!log.contains("jsbridge server stopped"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: No constructible transport keeps the controller initialized
// ─────────────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn test_transport_unavailable_keeps_controller_initialized() {
    let dir = TempDir::new().unwrap();
    let port = common::free_port();
    let mut controller =
        common::make_controller_with_factories(port, dir.path(), Some(unavailable), unavailable);

    controller.observe(HostSignal::EnvironmentReady);
    assert_eq!(
        controller.observe(HostSignal::LateStartupComplete),
        LifecycleState::Initialized
    );
    assert!(controller.server().is_none());
    assert!(controller.server_status().is_none());
    assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());

    let log = common::read_log(dir.path());
    assert!(log.contains("jsbridge server unavailable"));
    assert_eq!(log.matches(DEGRADED_MODE_NOTICE).count(), 1);
    assert!(!log.contains("jsbridge server listening on"));

    assert_eq!(
        controller.observe(HostSignal::ApplicationQuitting),
        LifecycleState::Terminated
    );
    assert!(controller.registered_hooks().is_empty());
    controller.wait_for_release().await;
}
