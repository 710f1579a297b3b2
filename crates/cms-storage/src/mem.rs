use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use cms_types::CmsError;

use crate::traits::LogStorage;
use crate::types::{LogEntry, LogState};

/// In-memory `LogStorage` backed by a `BTreeMap`.
///
/// Used by tests and ephemeral nodes; not persisted across restarts.
#[derive(Clone)]
pub struct MemLogStorage {
    entries: Arc<RwLock<BTreeMap<u64, LogEntry>>>,
}

impl MemLogStorage {
    pub fn new() -> Self {
        MemLogStorage { entries: Arc::new(RwLock::new(BTreeMap::new())) }
    }
}

impl Default for MemLogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage for MemLogStorage {
    async fn log_state(&self) -> Result<LogState, CmsError> {
        let g = self.entries.read().await;
        let last = g.values().next_back();
        Ok(LogState {
            first_index: g.keys().next().copied(),
            last_index: last.map(|e| e.index),
            last_term: last.map(|e| e.term),
        })
    }

    async fn get_entries(&self, from: u64, to_inclusive: u64) -> Result<Vec<LogEntry>, CmsError> {
        if from > to_inclusive {
            return Ok(Vec::new());
        }
        let g = self.entries.read().await;
        Ok(g.range(from..=to_inclusive).map(|(_, e)| e.clone()).collect())
    }

    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), CmsError> {
        let mut g = self.entries.write().await;
        for entry in entries {
            g.insert(entry.index, entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogPayload;

    fn make_entry(index: u64, term: u64) -> LogEntry {
        LogEntry { index, term, payload: LogPayload::Blank }
    }

    #[tokio::test]
    async fn log_storage_basic() {
        let log = MemLogStorage::new();

        let state = log.log_state().await.unwrap();
        assert_eq!(state, LogState::default());

        log.append(vec![make_entry(1, 1), make_entry(2, 1), make_entry(3, 2)])
            .await
            .unwrap();

        let state = log.log_state().await.unwrap();
        assert_eq!(state.first_index, Some(1));
        assert_eq!(state.last_index, Some(3));
        assert_eq!(state.last_term, Some(2));

        let entries = log.get_entries(2, 3).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.index).collect::<Vec<_>>(), vec![2, 3]);
        assert!(log.get_entries(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_overwrites_same_index() {
        let log = MemLogStorage::new();
        log.append(vec![make_entry(1, 1)]).await.unwrap();
        let overwrite = LogEntry { index: 1, term: 2, payload: LogPayload::Command(b"x".to_vec()) };
        log.append(vec![overwrite]).await.unwrap();
        let entries = log.get_entries(1, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, LogPayload::Command(b"x".to_vec()));
    }
}
