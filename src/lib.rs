pub mod cli;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod server;
pub mod transport;

use std::future::Future;

use config::BridgeConfig;
use diagnostics::DiagnosticSink;
use lifecycle::{HostSignal, LifecycleController};

/// Runs the bridge under an emulated host: startup signals on launch,
/// `application-quitting` on Ctrl-C.
pub fn run_bridge_cli(config: BridgeConfig) -> std::result::Result<(), String> {
    let sink = match &config.log_file {
        Some(path) => DiagnosticSink::open(path).unwrap_or_else(|e| {
            log::warn!(
                "Diagnostic log {} unavailable, continuing without it: {}",
                path.display(),
                e
            );
            DiagnosticSink::disabled()
        }),
        None => DiagnosticSink::disabled(),
    };

    let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    let result = rt.block_on(async {
        let mut controller = LifecycleController::new(config, sink.clone());

        controller.observe(HostSignal::EnvironmentReady);
        controller.observe(HostSignal::LateStartupComplete);

        match controller.server_status() {
            Some(status) => match serde_json::to_string(&status) {
                Ok(json) => log::info!("jsbridge status: {}", json),
                Err(e) => log::warn!("Failed to serialize jsbridge status: {}", e),
            },
            None => log::warn!("jsbridge is running without a reachable server"),
        }

        run_until_shutdown(&mut controller, tokio::signal::ctrl_c()).await
    });

    sink.close();
    result
}

/// Waits for `shutdown`, then delivers `application-quitting` and awaits the
/// port release. A failed shutdown wait still tears the server down before
/// its error is returned.
pub async fn run_until_shutdown<F>(
    controller: &mut LifecycleController,
    shutdown: F,
) -> std::result::Result<(), String>
where
    F: Future<Output = std::io::Result<()>>,
{
    let result = match shutdown.await {
        Ok(()) => {
            log::info!("Shutdown requested");
            Ok(())
        }
        Err(e) => {
            log::error!("Failed to wait for shutdown signal, shutting down: {}", e);
            Err(e.to_string())
        }
    };

    controller.observe(HostSignal::ApplicationQuitting);
    controller.wait_for_release().await;
    result
}
