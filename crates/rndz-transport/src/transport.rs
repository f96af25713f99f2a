use crate::addr;
use crate::config::{RndzServer, RndzTransportConfig};
use crate::conn::{MaConn, RawStream};
use crate::listener::MaListener;
use crate::rendezvous::{RendezvousClient, RendezvousSession};
use crate::scope::{ConnScope, Direction, NullResourceManager, ResourceManager};
use crate::upgrade::Upgrader;
use crate::{PeerId, RndzTransportError, P_TCP, TRANSPORT_NAME};

use async_trait::async_trait;
use multiaddr::Multiaddr;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capabilities a pluggable transport exposes to the networking stack.
#[async_trait]
pub trait Transport: fmt::Display + Send + Sync {
    type Conn: Send;
    type Listener: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether this transport should handle a dial to `addr`.
    fn can_dial(&self, addr: &Multiaddr) -> bool;

    async fn dial(
        &self,
        addr: &Multiaddr,
        peer: &PeerId,
        cancel: &CancellationToken,
    ) -> Result<Self::Conn, Self::Error>;

    async fn listen(&self, addr: &Multiaddr) -> Result<Self::Listener, Self::Error>;

    /// Multiaddr protocol codes this transport can dial.
    fn protocols(&self) -> &'static [u32];

    /// Whether sessions are proxied rather than direct logical links.
    fn proxy(&self) -> bool;
}

/// TCP transport that sets up connections through a rendezvous server.
///
/// Stateless apart from its immutable configuration: clones share the same
/// collaborators, and concurrent dials are independent.
pub struct RndzTransport<U> {
    config: Arc<RndzTransportConfig>,
    upgrader: Arc<U>,
    rendezvous: Arc<dyn RendezvousClient>,
    rcmgr: Arc<dyn ResourceManager>,
}

impl<U> Clone for RndzTransport<U> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            upgrader: self.upgrader.clone(),
            rendezvous: self.rendezvous.clone(),
            rcmgr: self.rcmgr.clone(),
        }
    }
}

impl<U: Upgrader> RndzTransport<U> {
    /// Create a transport. Without a resource manager every connection is
    /// allowed.
    pub fn new(
        config: RndzTransportConfig,
        upgrader: U,
        rendezvous: Arc<dyn RendezvousClient>,
        rcmgr: Option<Arc<dyn ResourceManager>>,
    ) -> Result<Self, RndzTransportError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            upgrader: Arc::new(upgrader),
            rendezvous,
            rcmgr: rcmgr.unwrap_or_else(|| Arc::new(NullResourceManager)),
        })
    }

    pub fn config(&self) -> &RndzTransportConfig {
        &self.config
    }

    pub fn local_id(&self) -> &PeerId {
        &self.config.local_id
    }

    pub fn can_dial(&self, addr: &Multiaddr) -> bool {
        tracing::debug!("can dial {addr}");
        addr::is_tcp_multiaddr(addr)
    }

    /// Dial `peer` through the rendezvous server at `raddr`.
    ///
    /// Exactly one resource scope is opened per call. It is released here on
    /// every failure before the upgrade, including cancellation; from the
    /// upgrade on it belongs to the upgrader.
    pub async fn dial(
        &self,
        raddr: &Multiaddr,
        peer: &PeerId,
        cancel: &CancellationToken,
    ) -> Result<U::Conn, RndzTransportError> {
        tracing::debug!("dial {raddr} {peer}");

        let inner = self
            .rcmgr
            .open_connection(Direction::Outbound, true)
            .map_err(|e| {
                tracing::debug!(%peer, addr = %raddr, error = %e, "resource manager blocked outgoing connection");
                RndzTransportError::ResourceLimit {
                    peer: peer.clone(),
                    source: e,
                }
            })?;
        let mut scope = ConnScope::new(inner, Direction::Outbound);

        if let Err(e) = scope.set_peer(peer) {
            tracing::debug!(%peer, addr = %raddr, error = %e, "resource manager blocked outgoing connection for peer");
            scope.done();
            return Err(RndzTransportError::ResourceLimit {
                peer: peer.clone(),
                source: e,
            });
        }

        // Any early return from here on drops `scope`, which releases it.
        let server = addr::to_socket_addr(raddr)?;
        tracing::debug!("rndz server {server}");

        let raw = self.rendezvous_connect(server, peer, cancel).await?;
        let conn = MaConn::wrap(raw)?;

        self.upgrader
            .upgrade(conn, Direction::Outbound, peer.clone(), scope, cancel)
            .await
            .map_err(|source| RndzTransportError::Upgrade {
                peer: peer.clone(),
                source,
            })
    }

    /// Run one rendezvous connect, closing the session whatever the outcome.
    async fn rendezvous_connect(
        &self,
        server: SocketAddr,
        peer: &PeerId,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RawStream>, RndzTransportError> {
        let mut session = ClosingSession(self.rendezvous.session(
            server,
            self.config.local_id.as_str(),
            None,
        ));
        let result = connect_until_cancelled(
            session.0.as_mut(),
            peer,
            self.config.dial_timeout,
            cancel,
        )
        .await;
        drop(session);

        if let Err(e) = &result {
            tracing::debug!(%peer, %server, error = %e, "rendezvous connect failed");
        }
        result
    }

    /// Listen for peers dialing this node's id.
    ///
    /// `laddr` is a composite `<server>/p2p-circuit/<local bind>` address, or
    /// a plain local bind when the rendezvous server is fixed.
    pub async fn listen(&self, laddr: &Multiaddr) -> Result<U::Listener, RndzTransportError> {
        let (local, server) = self.listen_halves(laddr)?;
        let (local_raw, server_raw) = addr::to_socket_pair(&local, &server)?;

        tracing::debug!("listen on {local_raw}");
        tracing::debug!("rndz server {server_raw}");

        let mut session =
            self.rendezvous
                .session(server_raw, self.config.local_id.as_str(), Some(local_raw));
        let raw = session
            .listen()
            .await
            .map_err(|source| RndzTransportError::RendezvousListen {
                addr: laddr.clone(),
                source,
            })?;

        let listener = MaListener::wrap(raw)?.via_rendezvous(&server);
        tracing::debug!("listening as {} on {}", self.config.local_id, listener.multiaddr());
        Ok(self.upgrader.upgrade_listener(listener))
    }

    fn listen_halves(&self, laddr: &Multiaddr) -> Result<(Multiaddr, Multiaddr), RndzTransportError> {
        match &self.config.server {
            RndzServer::FromListenAddr => addr::split_listen_addr(laddr),
            RndzServer::Fixed(server) => {
                if !laddr.iter().any(|p| matches!(p, multiaddr::Protocol::P2pCircuit)) {
                    return Ok((laddr.clone(), server.clone()));
                }
                let (local, requested) = addr::split_listen_addr(laddr)?;
                if &requested != server {
                    return Err(RndzTransportError::InvalidListenAddress {
                        addr: laddr.clone(),
                        reason: "rendezvous server differs from the configured one",
                    });
                }
                Ok((local, requested))
            }
        }
    }
}

/// Dial-side session handle, closed on drop so an abandoned dial future
/// still closes it.
struct ClosingSession(Box<dyn RendezvousSession>);

impl Drop for ClosingSession {
    fn drop(&mut self) {
        self.0.close();
    }
}

async fn connect_until_cancelled(
    session: &mut dyn RendezvousSession,
    peer: &PeerId,
    timeout: Option<std::time::Duration>,
    cancel: &CancellationToken,
) -> Result<Box<dyn RawStream>, RndzTransportError> {
    let rendezvous_failed = |source: std::io::Error| RndzTransportError::Rendezvous {
        peer: peer.clone(),
        source,
    };
    let attempt = async {
        let connect = session.connect(peer.as_str());
        match timeout {
            Some(after) => match tokio::time::timeout(after, connect).await {
                Ok(result) => result.map_err(rendezvous_failed),
                Err(_) => Err(RndzTransportError::DialTimeout {
                    peer: peer.clone(),
                    after,
                }),
            },
            None => connect.await.map_err(rendezvous_failed),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RndzTransportError::DialCancelled { peer: peer.clone() }),
        result = attempt => result,
    }
}

#[async_trait]
impl<U: Upgrader> Transport for RndzTransport<U> {
    type Conn = U::Conn;
    type Listener = U::Listener;
    type Error = RndzTransportError;

    fn can_dial(&self, addr: &Multiaddr) -> bool {
        RndzTransport::can_dial(self, addr)
    }

    async fn dial(
        &self,
        addr: &Multiaddr,
        peer: &PeerId,
        cancel: &CancellationToken,
    ) -> Result<U::Conn, RndzTransportError> {
        RndzTransport::dial(self, addr, peer, cancel).await
    }

    async fn listen(&self, addr: &Multiaddr) -> Result<U::Listener, RndzTransportError> {
        RndzTransport::listen(self, addr).await
    }

    fn protocols(&self) -> &'static [u32] {
        &[P_TCP]
    }

    fn proxy(&self) -> bool {
        false
    }
}

impl<U> fmt::Display for RndzTransport<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TRANSPORT_NAME)
    }
}

impl<U> fmt::Debug for RndzTransport<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RndzTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
