//! RNDZ-TCP transport.
//!
//! Lets two peers that cannot dial each other directly (both typically behind
//! NAT) establish TCP connections by routing connection setup through a
//! third-party rendezvous server. The rendezvous handshake itself, the
//! security/multiplexing upgrade and resource accounting are collaborators
//! plugged in through traits; this crate is the adapter between them.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rndz_transport::{
//!     PeerId, RendezvousClient, RndzTransport, RndzTransportConfig, Upgrader,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example<U: Upgrader>(
//! #     upgrader: U,
//! #     rendezvous: Arc<dyn RendezvousClient>,
//! # ) -> Result<(), rndz_transport::RndzTransportError> {
//! let local: PeerId = "peerA".parse()?;
//! let config = RndzTransportConfig::new(local)
//!     .rndz_server("/ip4/1.2.3.4/tcp/9000".parse().unwrap());
//!
//! // `None` substitutes the unlimited resource manager.
//! let transport = RndzTransport::new(config, upgrader, rendezvous, None)?;
//!
//! // Accept inbound sessions addressed to "peerA".
//! let listener = transport.listen(&"/ip4/0.0.0.0/tcp/4001".parse().unwrap()).await?;
//!
//! // Reach "peerB" through the same rendezvous server.
//! let target: PeerId = "peerB".parse()?;
//! let server = "/ip4/1.2.3.4/tcp/9000".parse().unwrap();
//! let session = transport.dial(&server, &target, &CancellationToken::new()).await?;
//! # drop((listener, session));
//! # Ok(())
//! # }
//! ```

pub mod addr;
mod config;
mod conn;
mod error;
mod listener;
mod rendezvous;
mod scope;
mod transport;
mod upgrade;

pub use config::{RndzServer, RndzTransportConfig};
pub use conn::{MaConn, RawStream};
pub use error::RndzTransportError;
pub use listener::{MaListener, RawListener};
pub use rendezvous::{RendezvousClient, RendezvousSession};
pub use scope::{ConnScope, ConnectionScope, Direction, NullResourceManager, ResourceManager};
pub use transport::{RndzTransport, Transport};
pub use upgrade::Upgrader;

// Re-export the address type used throughout the public API.
pub use multiaddr::{self, Multiaddr};

use std::fmt;
use std::str::FromStr;

/// Diagnostic identifier of the transport.
pub const TRANSPORT_NAME: &str = "RNDZ-TCP";

/// Multiaddr protocol code for `tcp`.
pub const P_TCP: u32 = 6;

/// Peer identity as registered with the rendezvous server.
///
/// Opaque to this crate. The canonical text form is what both sides hand to
/// the rendezvous server, so the same encoding is used for local registration
/// and for dial targets.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Canonical text form, as sent to the rendezvous server.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.char_indices().nth(12) {
            Some((cut, _)) => write!(f, "PeerId({}...)", &self.0[..cut]),
            None => write!(f, "PeerId({})", self.0),
        }
    }
}

impl FromStr for PeerId {
    type Err = RndzTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(RndzTransportError::InvalidPeerId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl serde::Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
