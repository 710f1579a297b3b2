use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use cms_codec::{
    command_from_text, decode_filter, decode_value, encode_entries, encode_value, result_to_text,
};
use cms_storage::{Broadcaster, PropertyStore};
use cms_types::{CmsError, PropertyKey, RaftCommand, RaftOp, RaftResult};

/// Base64 of an encoded `RaftResult{ERROR}` with an empty payload. Returned
/// when even the reply itself cannot be encoded.
pub(crate) const ERROR_REPLY: &str = "AQMAAAAA";

/// Callbacks a consensus library drives.
///
/// `apply_committed` runs once per committed entry, in log order, on every
/// replica. `query` runs on demand for reads that bypass the log. Both take
/// and return base64 text bytes and always produce a well-formed
/// `RaftResult`; nothing escapes into the caller's apply thread.
pub trait StateMachine: Send + Sync + 'static {
    fn initialize(&self, group_id: Uuid, storage_dir: Option<&Path>) -> Result<(), CmsError>;

    fn apply_committed(&self, entry: &[u8]) -> impl Future<Output = Vec<u8>> + Send;

    fn query(&self, request: &[u8]) -> impl Future<Output = Vec<u8>> + Send;

    fn close(&self);
}

/// Interprets `RaftCommand`s against the property store and feeds every
/// successful mutation to the broadcaster.
pub struct PropertyStateMachine {
    store: Arc<PropertyStore>,
    broadcaster: Arc<Broadcaster>,
    group_id: OnceLock<Uuid>,
    closed: AtomicBool,
}

impl PropertyStateMachine {
    pub fn new(store: Arc<PropertyStore>, broadcaster: Arc<Broadcaster>) -> Self {
        PropertyStateMachine {
            store,
            broadcaster,
            group_id: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn group_id(&self) -> Option<Uuid> {
        self.group_id.get().copied()
    }

    async fn process(&self, cmd: RaftCommand) -> Result<RaftResult, CmsError> {
        match cmd.operation {
            RaftOp::Put => {
                let key = require_key(cmd.key, "PUT")?;
                let value = decode_value(&cmd.value)?;
                self.store.put(key.clone(), value.clone()).await;
                self.broadcaster.publish_update(key, Some(value));
                Ok(RaftResult::ok(Vec::new()))
            }
            RaftOp::Get => {
                let key = require_key(cmd.key, "GET")?;
                match self.store.get(&key).await {
                    Some(value) => Ok(RaftResult::ok(encode_value(&value)?)),
                    None => Ok(RaftResult::not_found()),
                }
            }
            RaftOp::Delete => {
                let key = require_key(cmd.key, "DELETE")?;
                match self.store.remove(&key).await {
                    Some(_) => {
                        self.broadcaster.publish_update(key, None);
                        Ok(RaftResult::ok(Vec::new()))
                    }
                    None => Ok(RaftResult::not_found()),
                }
            }
            RaftOp::Query => {
                let filter = decode_filter(&cmd.value)?;
                let entries = self.store.query_by_filter(&filter).await?;
                Ok(RaftResult::ok(encode_entries(&entries)?))
            }
        }
    }
}

impl StateMachine for PropertyStateMachine {
    fn initialize(&self, group_id: Uuid, storage_dir: Option<&Path>) -> Result<(), CmsError> {
        self.group_id
            .set(group_id)
            .map_err(|_| CmsError::Consensus("state machine already initialized".into()))?;
        tracing::info!(%group_id, storage_dir = ?storage_dir, "state machine initialized");
        Ok(())
    }

    async fn apply_committed(&self, entry: &[u8]) -> Vec<u8> {
        let result = match command_from_text(entry) {
            Ok(cmd) => {
                tracing::debug!(
                    op = ?cmd.operation,
                    key = ?cmd.key.as_ref().map(PropertyKey::to_string),
                    "applying"
                );
                self.process(cmd).await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "error applying committed command");
                    RaftResult::error()
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable committed entry");
                RaftResult::error()
            }
        };
        reply(&result)
    }

    async fn query(&self, request: &[u8]) -> Vec<u8> {
        let result = match command_from_text(request) {
            Ok(cmd) => {
                if cmd.operation.is_mutation() {
                    tracing::warn!(
                        op = ?cmd.operation,
                        "mutation routed to the read-only query path"
                    );
                }
                tracing::debug!(op = ?cmd.operation, "query");
                self.process(cmd).await.unwrap_or_else(|e| {
                    tracing::error!(error = %e, "error processing query");
                    RaftResult::error()
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "undecodable query");
                RaftResult::error()
            }
        };
        reply(&result)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("state machine already closed");
            return;
        }
        tracing::info!("state machine closed");
    }
}

fn require_key(key: Option<PropertyKey>, op: &str) -> Result<PropertyKey, CmsError> {
    key.ok_or_else(|| CmsError::InvalidArgument(format!("{op} requires a key")))
}

fn reply(result: &RaftResult) -> Vec<u8> {
    result_to_text(result)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode reply");
            ERROR_REPLY.to_string()
        })
        .into_bytes()
}
