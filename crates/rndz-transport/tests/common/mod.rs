//! Recording collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rndz_transport::{
    ConnScope, ConnectionScope, Direction, MaConn, MaListener, PeerId, RawListener, RawStream,
    RendezvousClient, RendezvousSession, ResourceManager, RndzTransport, RndzTransportConfig,
    Upgrader,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio_util::sync::CancellationToken;

/// Ordered log of collaborator calls, shared by all mocks of one test.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rndz_transport=debug")
        .with_test_writer()
        .try_init();
}

pub fn peer(s: &str) -> PeerId {
    s.parse().unwrap()
}

// ── Resource manager ────────────────────────────────────────────────

/// Counts opened and released scopes; can be told to refuse either step.
#[derive(Clone, Default)]
pub struct CountingResourceManager {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    refuse_open: Arc<AtomicBool>,
    refuse_peer: Arc<AtomicBool>,
    events: Events,
}

impl CountingResourceManager {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn refuse_open(&self) {
        self.refuse_open.store(true, Ordering::SeqCst);
    }

    pub fn refuse_peer(&self) {
        self.refuse_peer.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.opened() - self.released()
    }
}

impl ResourceManager for CountingResourceManager {
    fn open_connection(
        &self,
        dir: Direction,
        use_fd: bool,
    ) -> anyhow::Result<Box<dyn ConnectionScope>> {
        self.events.push(format!("open({dir}, fd={use_fd})"));
        if self.refuse_open.load(Ordering::SeqCst) {
            anyhow::bail!("connection limit reached");
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingScope {
            manager: self.clone(),
            released: false,
        }))
    }
}

struct CountingScope {
    manager: CountingResourceManager,
    released: bool,
}

impl ConnectionScope for CountingScope {
    fn set_peer(&mut self, peer: &PeerId) -> anyhow::Result<()> {
        self.manager.events.push(format!("set_peer({peer})"));
        if self.manager.refuse_peer.load(Ordering::SeqCst) {
            anyhow::bail!("peer limit reached for {peer}");
        }
        Ok(())
    }

    fn done(&mut self) {
        assert!(!self.released, "scope released twice");
        self.released = true;
        self.manager.released.fetch_add(1, Ordering::SeqCst);
        self.manager.events.push("done");
    }
}

// ── Rendezvous client ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectMode {
    /// Hand back one end of an in-memory pipe.
    Succeed,
    /// Fail with `ConnectionRefused`.
    Fail,
    /// Never answer.
    Hang,
    /// Hand back a stream whose peer address cannot be read.
    Unaddressed,
}

/// Rendezvous client that records every call and answers from `mode`.
#[derive(Clone)]
pub struct MockRendezvous {
    mode: Arc<Mutex<ConnectMode>>,
    events: Events,
    pub closed: Arc<AtomicUsize>,
    /// Far ends of successful connects, kept so the pipes stay open.
    pub remotes: Arc<Mutex<Vec<DuplexStream>>>,
}

impl MockRendezvous {
    pub fn new(events: Events, mode: ConnectMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            events,
            closed: Arc::new(AtomicUsize::new(0)),
            remotes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RendezvousClient for MockRendezvous {
    fn session(
        &self,
        server: SocketAddr,
        local_id: &str,
        local_bind: Option<SocketAddr>,
    ) -> Box<dyn RendezvousSession> {
        let bind = local_bind.map_or_else(|| "-".to_string(), |a| a.to_string());
        self.events
            .push(format!("session({server}, {local_id}, {bind})"));
        Box::new(MockSession {
            client: self.clone(),
            server,
            local_bind,
        })
    }
}

struct MockSession {
    client: MockRendezvous,
    server: SocketAddr,
    local_bind: Option<SocketAddr>,
}

#[async_trait]
impl RendezvousSession for MockSession {
    async fn connect(&mut self, target: &str) -> io::Result<Box<dyn RawStream>> {
        self.client.events.push(format!("connect({target})"));
        let mode = *self.client.mode.lock().unwrap();
        match mode {
            ConnectMode::Succeed | ConnectMode::Unaddressed => {
                let (local, remote) = tokio::io::duplex(1024);
                self.client.remotes.lock().unwrap().push(remote);
                Ok(Box::new(MockStream {
                    inner: local,
                    local: "10.0.0.1:50000".parse().unwrap(),
                    peer: (mode == ConnectMode::Succeed).then_some(self.server),
                }))
            }
            ConnectMode::Fail => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{target} is not registered"),
            )),
            ConnectMode::Hang => std::future::pending().await,
        }
    }

    async fn listen(&mut self) -> io::Result<Box<dyn RawListener>> {
        self.client.events.push("listen");
        let bind = self
            .local_bind
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no local bind"))?;
        let listener = tokio::net::TcpListener::bind(bind).await?;
        Ok(Box::new(listener))
    }

    fn close(&mut self) {
        self.client.closed.fetch_add(1, Ordering::SeqCst);
        self.client.events.push("close");
    }
}

/// In-memory stream with fixed socket addresses.
pub struct MockStream {
    inner: DuplexStream,
    local: SocketAddr,
    peer: Option<SocketAddr>,
}

impl RawStream for MockStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "peer went away"))
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ── In-process rendezvous over loopback TCP ─────────────────────────

/// Rendezvous "server" living in the test process: listeners register their
/// bound address under their id, connects dial that address directly.
#[derive(Clone, Default)]
pub struct LoopbackRendezvous {
    registry: Arc<Mutex<HashMap<(SocketAddr, String), SocketAddr>>>,
}

impl RendezvousClient for LoopbackRendezvous {
    fn session(
        &self,
        server: SocketAddr,
        local_id: &str,
        local_bind: Option<SocketAddr>,
    ) -> Box<dyn RendezvousSession> {
        Box::new(LoopbackSession {
            registry: self.registry.clone(),
            server,
            local_id: local_id.to_string(),
            local_bind,
        })
    }
}

struct LoopbackSession {
    registry: Arc<Mutex<HashMap<(SocketAddr, String), SocketAddr>>>,
    server: SocketAddr,
    local_id: String,
    local_bind: Option<SocketAddr>,
}

#[async_trait]
impl RendezvousSession for LoopbackSession {
    async fn connect(&mut self, target: &str) -> io::Result<Box<dyn RawStream>> {
        let addr = self
            .registry
            .lock()
            .unwrap()
            .get(&(self.server, target.to_string()))
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "peer not registered"))?;
        let stream = tokio::net::TcpStream::connect(addr).await?;
        Ok(Box::new(stream))
    }

    async fn listen(&mut self) -> io::Result<Box<dyn RawListener>> {
        let bind = self
            .local_bind
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no local bind"))?;
        let listener = tokio::net::TcpListener::bind(bind).await?;
        let bound = listener.local_addr()?;
        self.registry
            .lock()
            .unwrap()
            .insert((self.server, self.local_id.clone()), bound);
        Ok(Box::new(listener))
    }

    fn close(&mut self) {}
}

// ── Upgrader ────────────────────────────────────────────────────────

/// "Upgraded" session: the raw connection plus what the upgrader was told.
#[derive(Debug)]
pub struct UpgradedSession {
    pub conn: MaConn,
    pub dir: Direction,
    pub peer: PeerId,
    pub scope: ConnScope,
}

/// Upgrader that records calls and can simulate an identity mismatch by
/// claiming the remote authenticated as someone else.
#[derive(Clone)]
pub struct MockUpgrader {
    events: Events,
    authenticated_as: Arc<Mutex<Option<PeerId>>>,
}

impl MockUpgrader {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            authenticated_as: Arc::new(Mutex::new(None)),
        }
    }

    pub fn authenticate_as(&self, peer: PeerId) {
        *self.authenticated_as.lock().unwrap() = Some(peer);
    }
}

#[async_trait]
impl Upgrader for MockUpgrader {
    type Conn = UpgradedSession;
    type Listener = MaListener;

    async fn upgrade(
        &self,
        conn: MaConn,
        dir: Direction,
        peer: PeerId,
        scope: ConnScope,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<UpgradedSession> {
        self.events.push(format!("upgrade({peer}, {dir})"));
        let authenticated = self.authenticated_as.lock().unwrap().clone();
        if let Some(actual) = authenticated {
            if actual != peer {
                // Dropping the scope releases it.
                drop(scope);
                anyhow::bail!("peer id mismatch: expected {peer}, authenticated {actual}");
            }
        }
        Ok(UpgradedSession {
            conn,
            dir,
            peer,
            scope,
        })
    }

    fn upgrade_listener(&self, listener: MaListener) -> MaListener {
        self.events.push(format!("upgrade_listener({})", listener.multiaddr()));
        listener
    }
}

/// A transport wired to fresh recording mocks.
pub struct Harness {
    pub events: Events,
    pub rcmgr: CountingResourceManager,
    pub rendezvous: MockRendezvous,
    pub upgrader: MockUpgrader,
    pub transport: RndzTransport<MockUpgrader>,
}

impl Harness {
    pub fn new(config: RndzTransportConfig) -> Self {
        init_tracing();
        let events = Events::default();
        let rcmgr = CountingResourceManager::new(events.clone());
        let rendezvous = MockRendezvous::new(events.clone(), ConnectMode::Succeed);
        let upgrader = MockUpgrader::new(events.clone());
        let transport = RndzTransport::new(
            config,
            upgrader.clone(),
            Arc::new(rendezvous.clone()),
            Some(Arc::new(rcmgr.clone())),
        )
        .unwrap();
        Self {
            events,
            rcmgr,
            rendezvous,
            upgrader,
            transport,
        }
    }
}
