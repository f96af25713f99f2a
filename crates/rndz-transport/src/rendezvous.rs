use crate::conn::RawStream;
use crate::listener::RawListener;

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Client side of the rendezvous protocol.
///
/// The handshake, hole punching and relay fallback all live behind this
/// trait. Peer ids are passed in their canonical text form.
pub trait RendezvousClient: Send + Sync {
    /// Open a handle for one attempt against `server`, registering as
    /// `local_id`. `local_bind` is set on the listen path only.
    fn session(
        &self,
        server: SocketAddr,
        local_id: &str,
        local_bind: Option<SocketAddr>,
    ) -> Box<dyn RendezvousSession>;
}

/// Handle for a single rendezvous attempt.
///
/// After a dial the transport always calls [`close`](RendezvousSession::close),
/// whether the attempt succeeded, failed or was cancelled. A listener returned
/// by [`listen`](RendezvousSession::listen) must outlive the session.
#[async_trait]
pub trait RendezvousSession: Send {
    /// Connect to `target` through the rendezvous server.
    async fn connect(&mut self, target: &str) -> io::Result<Box<dyn RawStream>>;

    /// Bind locally, register with the server and accept inbound peers.
    async fn listen(&mut self) -> io::Result<Box<dyn RawListener>>;

    fn close(&mut self);
}
