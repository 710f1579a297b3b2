use std::future::Future;

use cms_types::CmsError;

use crate::types::{LogEntry, LogState};

/// Storage for the consensus log of the property group.
///
/// Methods use RPITIT (`-> impl Future + Send`) matching the `RaftNode` trait
/// style in `cms-consensus`.
pub trait LogStorage: Send + Sync + 'static {
    /// Return first index, last index and last term.
    fn log_state(&self) -> impl Future<Output = Result<LogState, CmsError>> + Send;

    /// Return all entries in the inclusive range `[from, to_inclusive]`.
    fn get_entries(&self, from: u64, to_inclusive: u64)
        -> impl Future<Output = Result<Vec<LogEntry>, CmsError>> + Send;

    /// Append entries to the log, overwriting any existing entry at the same
    /// index.
    fn append(&self, entries: Vec<LogEntry>) -> impl Future<Output = Result<(), CmsError>> + Send;
}
