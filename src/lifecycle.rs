//! Host lifecycle state machine driving the bridge server.
//!
//! The controller is fed host signals one at a time. Duplicate, late or
//! out-of-order signals are absorbed by the state guards rather than by
//! trusting the host to deliver each signal exactly once.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::constants::events;
use crate::diagnostics::DiagnosticSink;
use crate::server::{BridgeServer, ServerStatus};
use crate::transport::{ReleaseWatch, TransportSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostSignal {
    EnvironmentReady,
    LateStartupComplete,
    ApplicationQuitting,
}

impl HostSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostSignal::EnvironmentReady => events::ENVIRONMENT_READY,
            HostSignal::LateStartupComplete => events::LATE_STARTUP_COMPLETE,
            HostSignal::ApplicationQuitting => events::APPLICATION_QUITTING,
        }
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown host signal: {0}")]
pub struct UnknownSignal(pub String);

impl FromStr for HostSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            events::ENVIRONMENT_READY => Ok(HostSignal::EnvironmentReady),
            events::LATE_STARTUP_COMPLETE => Ok(HostSignal::LateStartupComplete),
            events::APPLICATION_QUITTING => Ok(HostSignal::ApplicationQuitting),
            other => Err(UnknownSignal(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug)]
pub struct LifecycleController {
    state: LifecycleState,
    registered_hooks: BTreeSet<HostSignal>,
    server: Option<BridgeServer>,
    released: Option<ReleaseWatch>,
    config: BridgeConfig,
    selector: TransportSelector,
    sink: DiagnosticSink,
}

impl LifecycleController {
    pub fn new(config: BridgeConfig, sink: DiagnosticSink) -> Self {
        let selector = TransportSelector::new(&config, sink.clone());
        Self::with_selector(config, selector, sink)
    }

    pub fn with_selector(
        config: BridgeConfig,
        selector: TransportSelector,
        sink: DiagnosticSink,
    ) -> Self {
        sink.write("jsbridge lifecycle controller created");
        Self {
            state: LifecycleState::Uninitialized,
            registered_hooks: BTreeSet::new(),
            server: None,
            released: None,
            config,
            selector,
            sink,
        }
    }

    /// Delivers one host signal and returns the resulting state. Never fails:
    /// every error is logged and absorbed here.
    pub fn observe(&mut self, signal: HostSignal) -> LifecycleState {
        let subscribed = self.registered_hooks.contains(&signal)
            || (self.state == LifecycleState::Uninitialized
                && signal == HostSignal::EnvironmentReady);
        if !subscribed {
            log::debug!("Ignoring {} in state {:?}", signal, self.state);
            return self.state;
        }

        self.sink.write_event(signal.as_str());

        match (self.state, signal) {
            (LifecycleState::Uninitialized, HostSignal::EnvironmentReady) => {
                self.on_environment_ready()
            }
            (LifecycleState::Initialized, HostSignal::LateStartupComplete) => {
                self.on_late_startup()
            }
            (
                LifecycleState::Initialized | LifecycleState::Running,
                HostSignal::ApplicationQuitting,
            ) => self.on_quitting(),
            (state, signal) => {
                log::debug!("{} has no effect in state {:?}", signal, state);
            }
        }

        self.state
    }

    fn on_environment_ready(&mut self) {
        self.registered_hooks.insert(HostSignal::ApplicationQuitting);
        self.registered_hooks.insert(HostSignal::LateStartupComplete);
        self.state = LifecycleState::Initialized;

        log::info!("jsbridge registered for shutdown and late-startup signals");
        self.sink
            .write("jsbridge observing application-quitting and late-startup-complete");
    }

    fn on_late_startup(&mut self) {
        let server_config = self.config.server_config();
        let mut server = match self.selector.create_server(server_config.port) {
            Ok(server) => server,
            Err(e) => {
                log::error!("jsbridge server unavailable: {}", e);
                self.sink.write(&format!("jsbridge server unavailable: {}", e));
                return;
            }
        };

        match server.start() {
            Ok(()) => {
                let bound = server
                    .local_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| server_config.port.to_string());
                self.sink.write(&format!(
                    "jsbridge server listening on {} ({} transport)",
                    bound,
                    server.kind()
                ));
                self.server = Some(server);
                self.state = LifecycleState::Running;
            }
            Err(e) => {
                log::error!("jsbridge server failed to start: {}", e);
                self.sink
                    .write(&format!("jsbridge server failed to start: {}", e));
            }
        }
    }

    fn on_quitting(&mut self) {
        self.state = LifecycleState::ShuttingDown;

        // Quitting first, so late-startup cannot fire mid-teardown.
        for hook in [HostSignal::ApplicationQuitting, HostSignal::LateStartupComplete] {
            if self.registered_hooks.remove(&hook) {
                log::debug!("jsbridge unregistered from {}", hook);
            }
        }

        if let Some(mut server) = self.server.take() {
            self.released = Some(server.release_watch());
            match server.stop() {
                Ok(()) => self.sink.write("jsbridge server stopped"),
                Err(e) => {
                    log::warn!("jsbridge server stop failed: {}", e);
                    self.sink
                        .write(&format!("jsbridge server stop failed: {}", e));
                }
            }
        }

        self.sink.write("jsbridge lifecycle terminated");
        self.state = LifecycleState::Terminated;
    }

    /// Waits for the port of a stopped server to be released. Returns at once
    /// when no server was ever stopped.
    pub fn wait_for_release(&self) -> impl Future<Output = ()> + Send + 'static {
        let released = self.released.clone();
        async move {
            if let Some(released) = released {
                released.released().await;
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn registered_hooks(&self) -> Vec<HostSignal> {
        self.registered_hooks.iter().copied().collect()
    }

    pub fn server(&self) -> Option<&BridgeServer> {
        self.server.as_ref()
    }

    pub fn server_status(&self) -> Option<ServerStatus> {
        self.server.as_ref().map(BridgeServer::status)
    }
}
