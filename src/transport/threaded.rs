use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::watch;

use super::{ReleaseWatch, Transport, TransportKind};
use crate::constants::limits::SESSION_READ_BUFFER;
use crate::constants::timing::{ACCEPT_ERROR_BACKOFF, ACCEPT_POLL_INTERVAL, SESSION_READ_TIMEOUT};
use crate::error::{BridgeError, Result};

#[derive(Debug)]
struct AcceptWorker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Std-socket listener polled by a dedicated thread.
///
/// `stop` joins the accept thread, so the port is free once it returns.
#[derive(Debug)]
pub struct ThreadedTransport {
    worker: Option<AcceptWorker>,
    released: ReleaseWatch,
}

impl ThreadedTransport {
    pub fn new() -> Self {
        Self {
            worker: None,
            released: ReleaseWatch::released_now(),
        }
    }
}

impl Default for ThreadedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ThreadedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Fallback
    }

    fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.worker.is_some() {
            return Err(BridgeError::Bind {
                addr,
                source: std::io::Error::new(ErrorKind::AlreadyExists, "listener already running"),
            });
        }

        let listener =
            TcpListener::bind(addr).map_err(|source| BridgeError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (released_tx, released) = ReleaseWatch::channel();
        let stop_for_thread = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("jsbridge-accept-{}", local_addr.port()))
            .spawn(move || accept_loop(listener, local_addr, stop_for_thread, released_tx))?;

        self.worker = Some(AcceptWorker { stop, thread });
        self.released = released;
        log::info!("Bridge listener thread started on {}", local_addr);
        Ok(local_addr)
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::SeqCst);
        worker.thread.join().map_err(|_| BridgeError::Stop {
            message: "bridge accept thread panicked".to_string(),
        })
    }

    fn release_watch(&self) -> ReleaseWatch {
        self.released.clone()
    }
}

impl Drop for ThreadedTransport {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Bridge listener did not shut down cleanly: {}", e);
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    released_tx: watch::Sender<bool>,
) {
    let mut sessions: Vec<(TcpStream, JoinHandle<()>)> = Vec::new();

    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Bridge client connected: {}", peer);
                match spawn_session(stream, Arc::clone(&stop)) {
                    Ok(session) => sessions.push(session),
                    Err(e) => log::warn!("Failed to start bridge session for {}: {}", peer, e),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                sessions.retain(|(_, handle)| !handle.is_finished());
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::warn!("Bridge listener error on {}: {}", local_addr, e);
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    drop(listener);
    for (stream, handle) in sessions {
        let _ = stream.shutdown(Shutdown::Both);
        let _ = handle.join();
    }

    log::info!("Bridge listener on {} released", local_addr);
    let _ = released_tx.send(true);
}

fn spawn_session(
    stream: TcpStream,
    stop: Arc<AtomicBool>,
) -> std::io::Result<(TcpStream, JoinHandle<()>)> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(SESSION_READ_TIMEOUT))?;
    let control = stream.try_clone()?;

    let handle = thread::Builder::new()
        .name("jsbridge-session".to_string())
        .spawn(move || drain_session(stream, stop))?;
    Ok((control, handle))
}

/// Holds a client connection open until the peer closes it or the listener stops.
fn drain_session(mut stream: TcpStream, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; SESSION_READ_BUFFER];
    while !stop.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => break,
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}
