use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use super::{ReleaseWatch, Transport, TransportKind};
use crate::constants::limits::SESSION_READ_BUFFER;
use crate::constants::timing::ACCEPT_ERROR_BACKOFF;
use crate::error::{BridgeError, Result};

/// Accept loop running as a task on the tokio runtime that constructed it.
#[derive(Debug)]
pub struct AsyncTransport {
    handle: Handle,
    stop_tx: Option<broadcast::Sender<()>>,
    released: ReleaseWatch,
}

impl AsyncTransport {
    /// Fails with `TransportUnavailable` outside a tokio runtime.
    pub fn try_new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| BridgeError::TransportUnavailable {
            message: format!("no async runtime available: {}", e),
        })?;
        Ok(Self {
            handle,
            stop_tx: None,
            released: ReleaseWatch::released_now(),
        })
    }
}

impl Transport for AsyncTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Preferred
    }

    fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.stop_tx.is_some() {
            return Err(BridgeError::Bind {
                addr,
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "listener already running",
                ),
            });
        }

        // Bind synchronously so a busy port is reported to the caller.
        let std_listener =
            std::net::TcpListener::bind(addr).map_err(|source| BridgeError::Bind { addr, source })?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let listener = {
            let _guard = self.handle.enter();
            TcpListener::from_std(std_listener)?
        };

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (released_tx, released) = ReleaseWatch::channel();
        self.handle
            .spawn(accept_loop(listener, local_addr, stop_rx, released_tx));

        self.stop_tx = Some(stop_tx);
        self.released = released;
        log::info!("Bridge listener task started on {}", local_addr);
        Ok(local_addr)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.stop_tx.take() {
            // No receivers means the loop already exited on its own.
            let _ = tx.send(());
        }
        Ok(())
    }

    fn release_watch(&self) -> ReleaseWatch {
        self.released.clone()
    }
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    mut stop_rx: broadcast::Receiver<()>,
    released_tx: watch::Sender<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            accept_res = listener.accept() => {
                match accept_res {
                    Ok((stream, peer)) => {
                        log::info!("Bridge client connected: {}", peer);
                        sessions.spawn(drain_session(stream, stop_rx.resubscribe()));
                    }
                    Err(e) => {
                        log::warn!("Bridge listener error on {}: {}", local_addr, e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}

    log::info!("Bridge listener on {} released", local_addr);
    let _ = released_tx.send(true);
}

/// Holds a client connection open until the peer or the transport closes it.
async fn drain_session(mut stream: TcpStream, mut stop_rx: broadcast::Receiver<()>) {
    let mut buf = [0u8; SESSION_READ_BUFFER];
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }
    let _ = stream.shutdown().await;
}
