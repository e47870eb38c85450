use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use protocol::{
    codec::FrameCodec,
    msg::{Request, Response},
    time::now_ms,
};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{watch, Mutex as AsyncMutex, Notify},
    task::JoinHandle,
    time::{interval, sleep, timeout},
};
use tokio_util::codec::Framed;

use crate::error::Error;

const ACCEPT_RETRY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub listen_addr: SocketAddr,
    /// How long a request may wait for its response before the connection is
    /// declared dead.
    pub request_timeout: Duration,
    /// Interval of the endpoint-owned liveness ping, `None` to disable.
    pub ping_interval: Option<Duration>,
}

impl EndpointConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            request_timeout: Duration::from_secs(3),
            ping_interval: Some(Duration::from_secs(2)),
        }
    }
}

type SignerConn = Framed<TcpStream, FrameCodec<Request, Response>>;

struct Shared {
    running: AtomicBool,
    last_heartbeat_ms: AtomicU64,
    conn: AsyncMutex<Option<SignerConn>>,
    connected_tx: watch::Sender<bool>,
    close_notify: Notify,
}

impl Shared {
    fn set_connected(&self, connected: bool) {
        self.connected_tx.send_replace(connected);
    }
}

/// Owns the listening socket and the single logical channel to a remote
/// signer. The remote signer dials in; this side never dials out.
///
/// The wire protocol has no correlation ids, so the endpoint enforces the one
/// in-flight request invariant itself: the connection slot lock is held for
/// the whole send-then-wait section and every caller is serialized on it.
pub struct SignerListenerEndpoint {
    cfg: EndpointConfig,
    shared: Arc<Shared>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SignerListenerEndpoint {
    pub fn new(cfg: EndpointConfig) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            cfg,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                last_heartbeat_ms: AtomicU64::new(0),
                conn: AsyncMutex::new(None),
                connected_tx,
                close_notify: Notify::new(),
            }),
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Bind the listener and spawn the accept and heartbeat tasks. Calling
    /// this on an endpoint that is already running is a no-op.
    pub async fn start(&self) -> Result<(), Error> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let listener = match TcpListener::bind(self.cfg.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                log::error!("[SignerEndpoint] bind {} error: {e}", self.cfg.listen_addr);
                return Err(e.into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        log::info!("[SignerEndpoint] listening for remote signers on {local_addr}");
        *self.local_addr.lock() = Some(local_addr);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(accept_loop(self.shared.clone(), listener)));
        if let Some(ping_interval) = self.cfg.ping_interval {
            tasks.push(tokio::spawn(heartbeat_loop(
                self.shared.clone(),
                ping_interval,
                self.cfg.request_timeout,
            )));
        }
        Ok(())
    }

    /// Stop the endpoint: wake any in-flight request with an error, drop the
    /// connection and release the listener. Safe to call more than once.
    pub async fn close(&self) -> Result<(), Error> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("[SignerEndpoint] closing");
        self.shared.close_notify.notify_waiters();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        let mut slot = self.shared.conn.lock().await;
        *slot = None;
        drop(slot);
        self.shared.set_connected(false);
        *self.local_addr.lock() = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a remote signer is currently attached. The listener may be
    /// running without a peer.
    pub fn is_connected(&self) -> bool {
        *self.shared.connected_tx.borrow()
    }

    /// Timestamp of the most recent successful response, `None` before the
    /// first one.
    pub fn last_heartbeat_ms(&self) -> Option<u64> {
        match self.shared.last_heartbeat_ms.load(Ordering::Relaxed) {
            0 => None,
            at_ms => Some(at_ms),
        }
    }

    /// Address the listener is bound on while running. Mostly useful when the
    /// config asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Block until a remote signer attaches or `max_wait` elapses. A zero
    /// wait means check and return immediately.
    pub async fn wait_for_connection(&self, max_wait: Duration) -> Result<(), Error> {
        let mut connected_rx = self.shared.connected_tx.subscribe();
        if *connected_rx.borrow() {
            return Ok(());
        }
        if max_wait.is_zero() {
            return Err(Error::ConnectionTimeout);
        }
        let wait = async move {
            while connected_rx.changed().await.is_ok() {
                if *connected_rx.borrow() {
                    return true;
                }
            }
            false
        };
        match timeout(max_wait, wait).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::NotConnected),
            Err(_) => Err(Error::ConnectionTimeout),
        }
    }

    /// Write one request on the channel and wait for exactly one response.
    /// Any transport failure, decode failure or timeout drops the connection,
    /// so the next call fails fast with `NotConnected` until the remote
    /// signer dials back in.
    pub async fn send_request(&self, request: Request) -> Result<Response, Error> {
        request_on(&self.shared, self.cfg.request_timeout, request).await
    }
}

async fn request_on(shared: &Shared, request_timeout: Duration, request: Request) -> Result<Response, Error> {
    if !shared.running.load(Ordering::SeqCst) {
        return Err(Error::NotConnected);
    }
    let mut slot = shared.conn.lock().await;
    let conn = match slot.as_mut() {
        Some(conn) => conn,
        None => return Err(Error::NotConnected),
    };

    if let Err(e) = conn.send(request).await {
        log::error!("[SignerEndpoint] send request error: {e}");
        *slot = None;
        shared.set_connected(false);
        return Err(Error::Codec(e));
    }

    let received = select! {
        received = timeout(request_timeout, conn.next()) => Some(received),
        _ = shared.close_notify.notified() => None,
    };
    let received = match received {
        Some(received) => received,
        None => {
            *slot = None;
            shared.set_connected(false);
            return Err(Error::NotConnected);
        }
    };

    match received {
        Ok(Some(Ok(response))) => {
            shared.last_heartbeat_ms.store(now_ms(), Ordering::Relaxed);
            Ok(response)
        }
        Ok(Some(Err(e))) => {
            log::error!("[SignerEndpoint] decode response error: {e}");
            *slot = None;
            shared.set_connected(false);
            Err(Error::Codec(e))
        }
        Ok(None) => {
            log::warn!("[SignerEndpoint] connection closed by remote signer");
            *slot = None;
            shared.set_connected(false);
            Err(Error::Connection("connection closed by remote signer".to_string()))
        }
        Err(_elapsed) => {
            log::error!("[SignerEndpoint] request timed out after {request_timeout:?}");
            *slot = None;
            shared.set_connected(false);
            Err(Error::RequestTimeout)
        }
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        let incoming = select! {
            incoming = listener.accept() => incoming,
            _ = shared.close_notify.notified() => break,
        };
        match incoming {
            Ok((stream, remote)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    log::warn!("[SignerEndpoint] set_nodelay for {remote} error: {e}");
                }
                let mut slot = shared.conn.lock().await;
                if slot.is_some() {
                    log::warn!("[SignerEndpoint] remote signer {remote} replaces the current connection");
                } else {
                    log::info!("[SignerEndpoint] remote signer connected from {remote}");
                }
                *slot = Some(Framed::new(stream, FrameCodec::default()));
                drop(slot);
                shared.set_connected(true);
            }
            Err(e) => {
                log::error!("[SignerEndpoint] accept error: {e}");
                sleep(ACCEPT_RETRY).await;
            }
        }
    }
}

/// Periodic ping through the same request path as every other call, so it
/// can never interleave with one. Failures only show up in the connection
/// state and the log.
async fn heartbeat_loop(shared: Arc<Shared>, ping_interval: Duration, request_timeout: Duration) {
    let mut ticker = interval(ping_interval);
    loop {
        select! {
            _ = ticker.tick() => {}
            _ = shared.close_notify.notified() => break,
        }
        if !*shared.connected_tx.borrow() {
            continue;
        }
        match request_on(&shared, request_timeout, Request::Ping).await {
            Ok(Response::Pong) => log::debug!("[SignerEndpoint] heartbeat pong"),
            Ok(other) => log::warn!("[SignerEndpoint] heartbeat got unexpected response {other:?}"),
            Err(e) => log::warn!("[SignerEndpoint] heartbeat error: {e}"),
        }
    }
}
