use std::fmt::Display;
use std::future::Future;

use uuid::Uuid;

use cms_codec::result_from_text;
use cms_types::{CmsError, NodeId, RaftCommand, RaftResult};

pub mod cluster;
pub mod local;
pub mod state_machine;

pub use cluster::{build_group, group_id_for, parse_peer, RaftGroup, RaftPeer};
pub use local::LocalRaftNode;
pub use state_machine::{PropertyStateMachine, StateMachine};

/// Prefix of the application-level failure string returned by the facade.
pub const ERROR_PREFIX: &str = "ERROR: ";

// ---------------------------------------------------------------------------
// RaftNode trait
// Uses RPITIT (Return Position Impl Trait In Trait, stable since Rust 1.75).
// The explicit `+ Send` bound on each future ensures generic callers can
// `.await` across thread boundaries.
// ---------------------------------------------------------------------------

/// Consensus client facade used by request handlers.
///
/// Both calls answer with the base64 text of a `RaftResult`, or with a string
/// starting with [`ERROR_PREFIX`] when the command never reached the state
/// machine. They never fail at the type level; see [`parse_reply`].
pub trait RaftNode: Send + Sync + 'static {
    fn node_id(&self) -> &str;

    /// Goes through the log.
    fn send_command(&self, cmd: RaftCommand) -> impl Future<Output = String> + Send;

    /// Bypasses the log. Read-only by contract.
    fn send_query(&self, cmd: RaftCommand) -> impl Future<Output = String> + Send;

    fn status(&self) -> impl Future<Output = ClusterStatus> + Send;
}

#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub node_id: NodeId,
    pub group_id: Uuid,
    pub group_name: String,
    pub is_leader: bool,
    pub leader_id: Option<NodeId>,
    pub peers: Vec<RaftPeer>,
    pub term: u64,
    pub last_log_index: u64,
}

pub(crate) fn error_reply(e: impl Display) -> String {
    format!("{ERROR_PREFIX}{e}")
}

/// Turn a facade reply back into a `RaftResult`.
pub fn parse_reply(reply: &str) -> Result<RaftResult, CmsError> {
    if let Some(msg) = reply.strip_prefix(ERROR_PREFIX) {
        return Err(CmsError::Consensus(msg.to_string()));
    }
    Ok(result_from_text(reply)?)
}
