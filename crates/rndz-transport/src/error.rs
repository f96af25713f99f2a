use crate::PeerId;

use multiaddr::Multiaddr;
use std::net::SocketAddr;
use std::time::Duration;

/// Errors returned by the RNDZ-TCP transport.
///
/// Collaborator failures (rendezvous client, resource manager, upgrader) are
/// carried as the `source` of their variant, never reinterpreted.
#[derive(Debug, thiserror::Error)]
pub enum RndzTransportError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    #[error("invalid listen address {addr}: {reason}")]
    InvalidListenAddress { addr: Multiaddr, reason: &'static str },

    #[error("cannot translate {addr} to a tcp socket address")]
    AddressTranslation { addr: Multiaddr },

    #[error("address family mismatch: local bind {local}, rendezvous server {server}")]
    AddressFamilyMismatch { local: SocketAddr, server: SocketAddr },

    #[error("raw socket address unavailable: {0}")]
    RawAddr(#[source] std::io::Error),

    #[error("resource manager blocked connection to {peer}: {source}")]
    ResourceLimit {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("dial to {peer} cancelled")]
    DialCancelled { peer: PeerId },

    #[error("dial to {peer} timed out after {after:?}")]
    DialTimeout { peer: PeerId, after: Duration },

    #[error("rendezvous connect to {peer} failed: {source}")]
    Rendezvous {
        peer: PeerId,
        #[source]
        source: std::io::Error,
    },

    #[error("rendezvous listen on {addr} failed: {source}")]
    RendezvousListen {
        addr: Multiaddr,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("upgrade of connection to {peer} failed: {source}")]
    Upgrade {
        peer: PeerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("listener is closed")]
    ListenerClosed,
}

impl RndzTransportError {
    /// Whether the error came from the caller's cancellation or the dial timeout.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            RndzTransportError::DialCancelled { .. } | RndzTransportError::DialTimeout { .. }
        )
    }
}
