use crate::conn::MaConn;
use crate::listener::MaListener;
use crate::scope::{ConnScope, Direction};
use crate::PeerId;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Security and multiplexing negotiation on top of raw connections.
///
/// Ownership of `scope` passes to the upgrader: it keeps it alive for the
/// lifetime of the resulting session, and dropping it on failure releases it.
#[async_trait]
pub trait Upgrader: Send + Sync + 'static {
    /// An authenticated, multiplexed session.
    type Conn: Send + 'static;
    /// A listener yielding upgraded inbound sessions.
    type Listener: Send + 'static;

    /// Upgrade an outbound connection. Must fail if the authenticated remote
    /// identity is not `peer`.
    async fn upgrade(
        &self,
        conn: MaConn,
        dir: Direction,
        peer: PeerId,
        scope: ConnScope,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Self::Conn>;

    fn upgrade_listener(&self, listener: MaListener) -> Self::Listener;
}
