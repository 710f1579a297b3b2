use std::path::Path;

use tokio::sync::Mutex;

use cms_codec::command_to_text;
use cms_storage::{LogEntry, LogPayload, LogStorage};
use cms_types::{CmsError, NodeId, RaftCommand};

use crate::cluster::RaftGroup;
use crate::state_machine::StateMachine;
use crate::{error_reply, ClusterStatus, RaftNode};

struct LogCursor {
    next_index: u64,
    term: u64,
}

// ---------------------------------------------------------------------------
// LocalRaftNode: single voter, durable log, no network replication
// ---------------------------------------------------------------------------

/// In-process consensus driver.
///
/// Every command is appended to the log and then applied, one at a time, in
/// index order. The node is the only voter so it is always leader; the peers
/// of its group are reported but never contacted. On start the whole log is
/// replayed through the state machine, which rebuilds the in-memory store.
pub struct LocalRaftNode<L, S> {
    group: RaftGroup,
    node_id: NodeId,
    log: L,
    sm: S,
    cursor: Mutex<LogCursor>,
}

impl<L: LogStorage, S: StateMachine> LocalRaftNode<L, S> {
    pub async fn start(
        group: RaftGroup,
        node_id: impl Into<NodeId>,
        log: L,
        sm: S,
        storage_dir: Option<&Path>,
    ) -> Result<Self, CmsError> {
        let node_id = node_id.into();
        sm.initialize(group.group_id, storage_dir)?;

        let state = log.log_state().await?;
        let mut replayed = 0usize;
        if let (Some(first), Some(last)) = (state.first_index, state.last_index) {
            for entry in log.get_entries(first, last).await? {
                if let LogPayload::Command(bytes) = entry.payload {
                    sm.apply_committed(&bytes).await;
                    replayed += 1;
                }
            }
        }

        let term = state.last_term.unwrap_or(0) + 1;
        let index = state.last_index.unwrap_or(0) + 1;
        log.append(vec![LogEntry { index, term, payload: LogPayload::Blank }]).await?;

        tracing::info!(
            node_id = %node_id,
            group_id = %group.group_id,
            term,
            replayed,
            "consensus node started"
        );
        Ok(LocalRaftNode {
            group,
            node_id,
            log,
            sm,
            cursor: Mutex::new(LogCursor { next_index: index + 1, term }),
        })
    }

    pub fn group(&self) -> &RaftGroup {
        &self.group
    }

    pub fn state_machine(&self) -> &S {
        &self.sm
    }

    /// Append then apply, holding the cursor so entries apply in index order.
    async fn commit(&self, text: String) -> Result<Vec<u8>, CmsError> {
        let mut cursor = self.cursor.lock().await;
        let bytes = text.into_bytes();
        let entry = LogEntry {
            index: cursor.next_index,
            term: cursor.term,
            payload: LogPayload::Command(bytes.clone()),
        };
        self.log.append(vec![entry]).await?;
        cursor.next_index += 1;
        Ok(self.sm.apply_committed(&bytes).await)
    }

    pub fn shutdown(&self) {
        tracing::info!(node_id = %self.node_id, "consensus node shutting down");
        self.sm.close();
    }
}

impl<L: LogStorage, S: StateMachine> RaftNode for LocalRaftNode<L, S> {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn send_command(&self, cmd: RaftCommand) -> String {
        let text = match command_to_text(&cmd) {
            Ok(t) => t,
            Err(e) => return error_reply(e),
        };
        match self.commit(text).await {
            Ok(reply) => reply_text(reply),
            Err(e) => {
                tracing::warn!(error = %e, "failed to commit command");
                error_reply(e)
            }
        }
    }

    async fn send_query(&self, cmd: RaftCommand) -> String {
        match command_to_text(&cmd) {
            Ok(text) => reply_text(self.sm.query(text.as_bytes()).await),
            Err(e) => error_reply(e),
        }
    }

    async fn status(&self) -> ClusterStatus {
        let cursor = self.cursor.lock().await;
        ClusterStatus {
            node_id: self.node_id.clone(),
            group_id: self.group.group_id,
            group_name: self.group.name.clone(),
            is_leader: true,
            leader_id: Some(self.node_id.clone()),
            peers: self.group.peers.clone(),
            term: cursor.term,
            last_log_index: cursor.next_index - 1,
        }
    }
}

fn reply_text(reply: Vec<u8>) -> String {
    String::from_utf8(reply).unwrap_or_else(error_reply)
}
