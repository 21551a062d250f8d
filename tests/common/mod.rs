#![allow(dead_code)]
//! Shared test helpers for integration tests.
//!
//! Include in each test file with:
//!   mod common;
//! then call `common::free_port()` and `common::make_controller(port, dir)`.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use jsbridge_lib::{
    config::{BridgeConfig, TransportPolicy},
    diagnostics::DiagnosticSink,
    lifecycle::LifecycleController,
    transport::{TransportFactory, TransportSelector},
};

/// Reserve an ephemeral loopback port and release it for the test to bind.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn log_path(dir: &Path) -> PathBuf {
    dir.join("jsbridge.log")
}

pub fn read_log(dir: &Path) -> String {
    fs::read_to_string(log_path(dir)).unwrap_or_default()
}

/// Create a controller whose diagnostics land in `dir` and whose server binds `port`.
pub fn make_controller(port: u16, dir: &Path, transport: TransportPolicy) -> LifecycleController {
    let config = BridgeConfig {
        port: Some(port.to_string()),
        log_file: Some(log_path(dir)),
        transport,
        ..BridgeConfig::default()
    };
    let sink = DiagnosticSink::open(&log_path(dir)).unwrap();
    LifecycleController::new(config, sink)
}

/// Like [`make_controller`], but with injected transport factories.
pub fn make_controller_with_factories(
    port: u16,
    dir: &Path,
    preferred: Option<TransportFactory>,
    fallback: TransportFactory,
) -> LifecycleController {
    let config = BridgeConfig {
        port: Some(port.to_string()),
        log_file: Some(log_path(dir)),
        ..BridgeConfig::default()
    };
    let sink = DiagnosticSink::open(&log_path(dir)).unwrap();
    let selector = TransportSelector::with_factories(
        IpAddr::from([127, 0, 0, 1]),
        preferred,
        fallback,
        sink.clone(),
    );
    LifecycleController::with_selector(config, selector, sink)
}
