use std::path::Path;
use std::sync::Arc;

use cms_types::CmsError;

use crate::keys::{raft_log_index, raft_log_key};
use crate::traits::LogStorage;
use crate::types::{LogEntry, LogState};

fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, CmsError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| CmsError::Storage(e.to_string()))
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, CmsError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| CmsError::Storage(e.to_string()))
}

fn fjall_err(e: fjall::Error) -> CmsError {
    CmsError::Storage(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> CmsError {
    CmsError::Storage(e.to_string())
}

/// Shared fjall handle for the consensus log.
pub struct FjallStore {
    pub db: fjall::Database,
    /// `index(8)` → bincode(LogEntry)
    pub raft_log: fjall::Keyspace,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Arc<Self>, CmsError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let raft_log =
            db.keyspace("raft_log", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        Ok(Arc::new(FjallStore { db, raft_log }))
    }
}

/// Durable `LogStorage` backed by fjall. Replaying it through the state
/// machine rebuilds the in-memory property store after a restart.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct FjallLogStorage(pub Arc<FjallStore>);

impl FjallLogStorage {
    pub fn open(path: &Path) -> Result<Self, CmsError> {
        Ok(FjallLogStorage(FjallStore::open(path)?))
    }
}

impl LogStorage for FjallLogStorage {
    async fn log_state(&self) -> Result<LogState, CmsError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<LogState, CmsError> {
            let mut state = LogState::default();
            let mut last_value = None;
            let all = raft_log_key(0).to_vec()..=raft_log_key(u64::MAX).to_vec();
            for guard in store.raft_log.range(all) {
                let (k, v) = guard.into_inner().map_err(fjall_err)?;
                let idx = raft_log_index(&k)
                    .ok_or_else(|| CmsError::Storage("short raft_log key".into()))?;
                if state.first_index.is_none() {
                    state.first_index = Some(idx);
                }
                state.last_index = Some(idx);
                last_value = Some(v);
            }
            if let Some(v) = last_value {
                state.last_term = Some(decode::<LogEntry>(&v)?.term);
            }
            Ok(state)
        })
        .await
        .map_err(join_err)?
    }

    async fn get_entries(&self, from: u64, to_inclusive: u64) -> Result<Vec<LogEntry>, CmsError> {
        if from > to_inclusive {
            return Ok(Vec::new());
        }
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, CmsError> {
            store
                .raft_log
                .range(raft_log_key(from).to_vec()..=raft_log_key(to_inclusive).to_vec())
                .map(|g| {
                    g.into_inner().map_err(fjall_err).and_then(|(_, v)| decode::<LogEntry>(&v))
                })
                .collect()
        })
        .await
        .map_err(join_err)?
    }

    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), CmsError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CmsError> {
            let mut batch = store.db.batch();
            for entry in &entries {
                batch.insert(&store.raft_log, raft_log_key(entry.index).to_vec(), encode(entry)?);
            }
            batch.commit().map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogPayload;

    fn make_entry(index: u64, term: u64) -> LogEntry {
        LogEntry { index, term, payload: LogPayload::Command(format!("cmd-{index}").into_bytes()) }
    }

    #[tokio::test]
    async fn log_storage_basic() {
        let dir = tempfile::tempdir().unwrap();
        let log = FjallLogStorage::open(dir.path()).unwrap();

        let state = log.log_state().await.unwrap();
        assert!(state.first_index.is_none());
        assert!(state.last_term.is_none());

        log.append(vec![make_entry(1, 1), make_entry(2, 1), make_entry(3, 2)])
            .await
            .unwrap();

        let state = log.log_state().await.unwrap();
        assert_eq!(state.first_index, Some(1));
        assert_eq!(state.last_index, Some(3));
        assert_eq!(state.last_term, Some(2));

        let es = log.get_entries(1, 2).await.unwrap();
        assert_eq!(es, vec![make_entry(1, 1), make_entry(2, 1)]);
    }

    #[tokio::test]
    async fn log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FjallLogStorage::open(dir.path()).unwrap();
            log.append(vec![
                LogEntry { index: 1, term: 1, payload: LogPayload::Blank },
                make_entry(2, 1),
            ])
            .await
            .unwrap();
        }

        let log = FjallLogStorage::open(dir.path()).unwrap();
        let state = log.log_state().await.unwrap();
        assert_eq!(state.last_index, Some(2));
        let es = log.get_entries(1, 2).await.unwrap();
        assert_eq!(es[0].payload, LogPayload::Blank);
        assert_eq!(es[1], make_entry(2, 1));
    }

    #[tokio::test]
    async fn index_order_is_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let log = FjallLogStorage::open(dir.path()).unwrap();
        log.append(vec![make_entry(300, 1), make_entry(2, 1), make_entry(256, 1)])
            .await
            .unwrap();
        let es = log.get_entries(1, 1000).await.unwrap();
        assert_eq!(es.iter().map(|e| e.index).collect::<Vec<_>>(), vec![2, 256, 300]);
    }
}
