//! Narrow seam to the underlying driver/transport.
//!
//! The wire protocol itself lives behind these two traits; this crate only
//! routes, pools, and compiles. A [`Transport`] opens authenticated physical
//! connections and discovers replica-set roles; a [`PhysicalConnection`]
//! carries one wire operation at a time.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::config::{Credential, Timeouts};
use crate::error::ClientResult;
use crate::topology::{NodeAddress, RoleMap, Topology};
use crate::wire::{WireOp, WireReply};

/// Factory for physical connections to replica-set nodes.
///
/// Implementations must be thread-safe; one transport instance is shared by
/// the whole pool.
#[async_trait]
pub trait Transport: Send + Sync + Debug + 'static {
    type Conn: PhysicalConnection;

    /// Opens a new physical connection to `node`, performing the credential
    /// handshake when a credential is given.
    ///
    /// TCP-level failures surface as
    /// [`Transport`](crate::error::ClientError::Transport) errors and may be
    /// retried by the pool; a rejected handshake surfaces as
    /// [`AuthenticationFailed`](crate::error::ClientError::AuthenticationFailed)
    /// and is never retried.
    async fn open(
        &self,
        node: &NodeAddress,
        credential: Option<&Credential>,
        timeouts: &Timeouts,
    ) -> ClientResult<Self::Conn>;

    /// Asks the cluster which node currently holds which role. Nodes absent
    /// from the returned map are unreachable.
    async fn discover_roles(&self, topology: &Topology) -> ClientResult<RoleMap>;
}

/// One live connection to one node.
///
/// Dropping a connection must close it; there is no separate close call on
/// the happy path.
#[async_trait]
pub trait PhysicalConnection: Send + Sync + Debug + 'static {
    /// Issues one wire operation and waits for its reply.
    ///
    /// After an error the connection's server-side state is indeterminate
    /// and the pool destroys it instead of recycling.
    async fn send(&mut self, op: WireOp) -> ClientResult<WireReply>;
}
