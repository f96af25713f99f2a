use crate::PeerId;

use std::fmt;

/// Direction of a connection relative to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Resource accounting for connection attempts.
///
/// Shared by every concurrent dial, so implementations must be thread-safe.
pub trait ResourceManager: Send + Sync {
    /// Ask for permission to open a connection. `use_fd` is set when the
    /// connection will consume a file descriptor.
    fn open_connection(
        &self,
        dir: Direction,
        use_fd: bool,
    ) -> anyhow::Result<Box<dyn ConnectionScope>>;
}

/// A resource manager's handle on one connection.
///
/// Callers never invoke [`done`](ConnectionScope::done) directly; it is driven
/// by [`ConnScope`], which calls it exactly once.
pub trait ConnectionScope: Send + Sync {
    /// Attribute the connection to a peer. May be refused by per-peer limits.
    fn set_peer(&mut self, peer: &PeerId) -> anyhow::Result<()>;

    /// Release everything reserved for this connection.
    fn done(&mut self);
}

/// Owned guard around a [`ConnectionScope`].
///
/// Released exactly once: either by [`done`](ConnScope::done), or on drop if
/// the owner never finished it.
pub struct ConnScope {
    inner: Option<Box<dyn ConnectionScope>>,
    direction: Direction,
    peer: Option<PeerId>,
}

impl ConnScope {
    pub fn new(inner: Box<dyn ConnectionScope>, direction: Direction) -> Self {
        Self {
            inner: Some(inner),
            direction,
            peer: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The peer this scope is attributed to, once set.
    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    pub fn set_peer(&mut self, peer: &PeerId) -> anyhow::Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.set_peer(peer)?;
        }
        self.peer = Some(peer.clone());
        Ok(())
    }

    /// Release the scope now.
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.done();
        }
    }
}

impl Drop for ConnScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnScope")
            .field("direction", &self.direction)
            .field("peer", &self.peer)
            .field("released", &self.inner.is_none())
            .finish()
    }
}

/// Resource manager that never refuses. Used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResourceManager;

struct NullScope;

impl ResourceManager for NullResourceManager {
    fn open_connection(
        &self,
        _dir: Direction,
        _use_fd: bool,
    ) -> anyhow::Result<Box<dyn ConnectionScope>> {
        Ok(Box::new(NullScope))
    }
}

impl ConnectionScope for NullScope {
    fn set_peer(&mut self, _peer: &PeerId) -> anyhow::Result<()> {
        Ok(())
    }

    fn done(&mut self) {}
}
