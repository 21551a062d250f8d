//! Listener transports and the selection between them.
//!
//! The preferred transport drives its accept loop on the ambient tokio runtime.
//! When no runtime is reachable, the selector degrades to a std-socket listener
//! driven by a dedicated thread.
//!
//! # Notes
//!
//! Both transports bind the same host and hold connections the same way; the
//! fallback only trades the runtime task for a polling thread. `run_bridge_cli`
//! always builds the selector inside a runtime, so the binary never degrades.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::{BridgeConfig, TransportPolicy};
use crate::diagnostics::DiagnosticSink;
use crate::error::{BridgeError, Result};
use crate::server::BridgeServer;

pub mod async_listener;
pub mod threaded;

pub use async_listener::AsyncTransport;
pub use threaded::ThreadedTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Preferred,
    Fallback,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Preferred => "preferred",
            TransportKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listening socket implementation owned by a [`BridgeServer`].
pub trait Transport: Send + fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Binds `addr` and launches the accept loop. Returns the bound address.
    fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr>;

    /// Stops accepting, closes accepted sessions and releases the port.
    /// Calling it without a running listener is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Resolves once the most recently started listener has let go of its port.
    fn release_watch(&self) -> ReleaseWatch;
}

/// Completion signal for a listener releasing its port.
#[derive(Debug, Clone)]
pub struct ReleaseWatch {
    rx: watch::Receiver<bool>,
}

impl ReleaseWatch {
    pub(crate) fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub(crate) fn released_now() -> Self {
        let (_, rx) = watch::channel(true);
        Self { rx }
    }

    pub fn is_released(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn released(mut self) {
        // A dropped sender means the loop is gone along with its listener.
        let _ = self.rx.wait_for(|released| *released).await;
    }
}

pub type TransportFactory = fn() -> Result<Box<dyn Transport>>;

fn preferred_factory() -> Result<Box<dyn Transport>> {
    Ok(Box::new(AsyncTransport::try_new()?))
}

fn fallback_factory() -> Result<Box<dyn Transport>> {
    Ok(Box::new(ThreadedTransport::new()))
}

pub const DEGRADED_MODE_NOTICE: &str =
    "jsbridge has no async runtime, falling back to a threaded std socket listener";

#[derive(Debug, Clone)]
pub struct TransportSelector {
    host: IpAddr,
    preferred: Option<TransportFactory>,
    fallback: TransportFactory,
    sink: DiagnosticSink,
}

impl TransportSelector {
    pub fn new(config: &BridgeConfig, sink: DiagnosticSink) -> Self {
        let preferred = match config.transport {
            TransportPolicy::Auto => Some(preferred_factory as TransportFactory),
            TransportPolicy::FallbackOnly => None,
        };
        Self::with_factories(config.host, preferred, fallback_factory, sink)
    }

    pub fn with_factories(
        host: IpAddr,
        preferred: Option<TransportFactory>,
        fallback: TransportFactory,
        sink: DiagnosticSink,
    ) -> Self {
        Self {
            host,
            preferred,
            fallback,
            sink,
        }
    }

    /// Builds a stopped server for `port`, degrading to the fallback transport
    /// when the preferred one cannot be constructed.
    pub fn create_server(&self, port: u16) -> Result<BridgeServer> {
        let addr = SocketAddr::new(self.host, port);

        let preferred_error = match self.preferred {
            Some(factory) => match factory() {
                Ok(transport) => return Ok(BridgeServer::new(addr, transport)),
                Err(e) => Some(e),
            },
            None => None,
        };

        if let Some(e) = &preferred_error {
            log::warn!("Preferred bridge transport unavailable: {}", e);
            self.sink.write(&format!("{} ({})", DEGRADED_MODE_NOTICE, e));
        }

        match (self.fallback)() {
            Ok(transport) => Ok(BridgeServer::new(addr, transport)),
            Err(fallback_error) => {
                let message = match preferred_error {
                    Some(e) => format!("preferred: {}; fallback: {}", e, fallback_error),
                    None => format!("fallback: {}", fallback_error),
                };
                log::error!("No bridge transport for {}: {}", addr, message);
                Err(BridgeError::TransportUnavailable { message })
            }
        }
    }
}
