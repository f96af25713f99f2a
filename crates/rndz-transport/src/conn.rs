use crate::addr;
use crate::RndzTransportError;

use multiaddr::Multiaddr;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Byte stream produced by a rendezvous client.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl RawStream for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

/// A raw stream annotated with its multiaddrs, ready for upgrade.
pub struct MaConn {
    inner: Box<dyn RawStream>,
    local: Multiaddr,
    remote: Multiaddr,
}

impl MaConn {
    /// Wrap a raw stream, recording both ends as multiaddrs.
    pub fn wrap(inner: Box<dyn RawStream>) -> Result<Self, RndzTransportError> {
        let local = inner.local_addr().map_err(RndzTransportError::RawAddr)?;
        let remote = inner.peer_addr().map_err(RndzTransportError::RawAddr)?;
        Ok(Self {
            inner,
            local: addr::from_socket_addr(local),
            remote: addr::from_socket_addr(remote),
        })
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.local
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.remote
    }

    pub fn into_inner(self) -> Box<dyn RawStream> {
        self.inner
    }
}

impl std::fmt::Debug for MaConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaConn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

impl AsyncRead for MaConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MaConn {
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
