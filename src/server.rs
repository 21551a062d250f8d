use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use serde::Serialize;

use crate::error::Result;
use crate::transport::{ReleaseWatch, Transport, TransportKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub state: ServerState,
    pub port: u16,
    pub transport: TransportKind,
    pub local_addr: Option<SocketAddr>,
    pub uptime_seconds: u64,
}

/// The listening endpoint remote harnesses connect to.
#[derive(Debug)]
pub struct BridgeServer {
    state: ServerState,
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    started_at: Option<Instant>,
    transport: Box<dyn Transport>,
}

impl BridgeServer {
    pub fn new(addr: SocketAddr, transport: Box<dyn Transport>) -> Self {
        Self {
            state: ServerState::Stopped,
            addr,
            local_addr: None,
            started_at: None,
            transport,
        }
    }

    /// Binds and starts accepting. A server that is already listening is left
    /// untouched; a failed bind leaves it stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ServerState::Stopped {
            return Ok(());
        }

        self.state = ServerState::Starting;
        match self.transport.start(self.addr) {
            Ok(local_addr) => {
                self.state = ServerState::Listening;
                self.local_addr = Some(local_addr);
                self.started_at = Some(Instant::now());
                log::info!(
                    "Bridge server listening on {} ({} transport)",
                    local_addr,
                    self.transport.kind()
                );
                Ok(())
            }
            Err(e) => {
                self.state = ServerState::Stopped;
                log::error!("Bridge server failed to start on {}: {}", self.addr, e);
                Err(e)
            }
        }
    }

    /// Stops accepting and releases the port. Stopping a stopped server is a
    /// no-op. The server ends up stopped even when the release reports an error.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == ServerState::Stopped {
            return Ok(());
        }

        let result = self.transport.stop();
        self.state = ServerState::Stopped;
        self.local_addr = None;
        self.started_at = None;

        match &result {
            Ok(()) => log::info!("Bridge server on port {} stopped", self.addr.port()),
            Err(e) => log::warn!(
                "Bridge server on port {} stopped with error: {}",
                self.addr.port(),
                e
            ),
        }
        result
    }

    /// Resolves once the accept loop has exited and the port is free.
    pub fn wait_until_stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        self.transport.release_watch().released()
    }

    pub fn release_watch(&self) -> ReleaseWatch {
        self.transport.release_watch()
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == ServerState::Listening
    }

    /// The configured port. See [`BridgeServer::local_addr`] for the bound one.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.is_listening(),
            state: self.state,
            port: self.addr.port(),
            transport: self.transport.kind(),
            local_addr: self.local_addr,
            uptime_seconds: self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        }
    }
}
