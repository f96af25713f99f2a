use crate::addr;
use crate::conn::{MaConn, RawStream};
use crate::RndzTransportError;

use async_trait::async_trait;
use multiaddr::Multiaddr;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Source of accepted connections produced by a rendezvous client.
#[async_trait]
pub trait RawListener: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<Box<dyn RawStream>>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl RawListener for TcpListener {
    async fn accept(&self) -> io::Result<Box<dyn RawStream>> {
        let (stream, _) = TcpListener::accept(self).await?;
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A raw listener annotated with the multiaddr it is reachable on.
///
/// Closing drops the raw listener; it is idempotent and every later
/// [`accept`](MaListener::accept) fails with
/// [`ListenerClosed`](RndzTransportError::ListenerClosed).
pub struct MaListener {
    inner: Option<Box<dyn RawListener>>,
    multiaddr: Multiaddr,
}

impl MaListener {
    /// Wrap a raw listener under its bound address.
    pub fn wrap(inner: Box<dyn RawListener>) -> Result<Self, RndzTransportError> {
        let local = inner.local_addr().map_err(RndzTransportError::RawAddr)?;
        Ok(Self {
            inner: Some(inner),
            multiaddr: addr::from_socket_addr(local),
        })
    }

    /// Advertise the listener as reachable through `server`.
    pub(crate) fn via_rendezvous(mut self, server: &Multiaddr) -> Self {
        self.multiaddr = addr::join_listen_addr(&self.multiaddr, server);
        self
    }

    pub fn multiaddr(&self) -> &Multiaddr {
        &self.multiaddr
    }

    pub async fn accept(&self) -> Result<MaConn, RndzTransportError> {
        let inner = self.inner.as_ref().ok_or(RndzTransportError::ListenerClosed)?;
        let raw = inner.accept().await.map_err(RndzTransportError::Accept)?;
        MaConn::wrap(raw)
    }

    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("closed listener {}", self.multiaddr);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl std::fmt::Debug for MaListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaListener")
            .field("multiaddr", &self.multiaddr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
