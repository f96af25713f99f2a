use crate::addr;
use crate::{PeerId, RndzTransportError};

use multiaddr::Multiaddr;
use std::time::Duration;

const ENV_SERVER: &str = "RNDZ_SERVER";
const ENV_PEER_ID: &str = "RNDZ_PEER_ID";

/// Where the rendezvous server address comes from on listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RndzServer {
    /// Fixed at construction; listen addresses are plain local binds.
    Fixed(Multiaddr),
    /// Split out of each composite listen address.
    FromListenAddr,
}

/// Configuration for an [`RndzTransport`](crate::RndzTransport).
///
/// ```rust
/// use rndz_transport::RndzTransportConfig;
/// use std::time::Duration;
///
/// let config = RndzTransportConfig::new("peerA".parse().unwrap())
///     .rndz_server("/ip4/1.2.3.4/tcp/9000".parse().unwrap())
///     .dial_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct RndzTransportConfig {
    /// Identity registered with the rendezvous server.
    pub(crate) local_id: PeerId,
    pub(crate) server: RndzServer,
    /// Upper bound on a rendezvous connect, on top of the caller's token.
    pub(crate) dial_timeout: Option<Duration>,
}

impl RndzTransportConfig {
    /// Create a config for `local_id`.
    ///
    /// If the `RNDZ_SERVER` environment variable holds a valid multiaddr it
    /// becomes the fixed rendezvous server; otherwise the server is taken from
    /// each listen address.
    pub fn new(local_id: PeerId) -> Self {
        Self::with_server_var(local_id, std::env::var(ENV_SERVER).ok())
    }

    /// Build entirely from `RNDZ_PEER_ID` and `RNDZ_SERVER`.
    pub fn from_env() -> Result<Self, RndzTransportError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RndzTransportError> {
        let id = lookup(ENV_PEER_ID)
            .ok_or_else(|| RndzTransportError::Config(format!("{ENV_PEER_ID} is not set")))?;
        let local_id: PeerId = id
            .parse()
            .map_err(|e| RndzTransportError::Config(format!("{ENV_PEER_ID}: {e}")))?;

        let mut config = Self::with_server_var(local_id, None);
        if let Some(server) = lookup(ENV_SERVER) {
            let server: Multiaddr = server
                .parse()
                .map_err(|e| RndzTransportError::Config(format!("{ENV_SERVER}: {e}")))?;
            config.server = RndzServer::Fixed(server);
        }
        Ok(config)
    }

    fn with_server_var(local_id: PeerId, server: Option<String>) -> Self {
        let server = server
            .and_then(|s| s.parse().ok())
            .map(RndzServer::Fixed)
            .unwrap_or(RndzServer::FromListenAddr);

        Self {
            local_id,
            server,
            dial_timeout: None,
        }
    }

    /// Use a fixed rendezvous server for listening.
    pub fn rndz_server(mut self, addr: Multiaddr) -> Self {
        self.server = RndzServer::Fixed(addr);
        self
    }

    /// Take the rendezvous server from each composite listen address.
    pub fn server_from_listen_addr(mut self) -> Self {
        self.server = RndzServer::FromListenAddr;
        self
    }

    /// Bound the rendezvous connect of every dial (default: none).
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn server(&self) -> &RndzServer {
        &self.server
    }

    pub(crate) fn validate(&self) -> Result<(), RndzTransportError> {
        if let RndzServer::Fixed(server) = &self.server {
            addr::to_socket_addr(server).map_err(|_| {
                RndzTransportError::Config(format!(
                    "rendezvous server {server} is not an ip/tcp address"
                ))
            })?;
        }
        if self.dial_timeout == Some(Duration::ZERO) {
            return Err(RndzTransportError::Config("dial timeout must be non-zero".into()));
        }
        Ok(())
    }
}
