/// A single entry in the consensus log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub payload: LogPayload,
}

/// The payload carried by a `LogEntry`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogPayload {
    /// No-op entry written when a term starts.
    Blank,
    /// Base64 text of an encoded `RaftCommand`, exactly as the state machine
    /// receives it.
    Command(Vec<u8>),
}

/// Summary of the current log extent.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogState {
    /// Smallest index currently in the log (`None` if log is empty).
    pub first_index: Option<u64>,
    /// Largest index currently in the log (`None` if log is empty).
    pub last_index: Option<u64>,
    /// Term of the entry at `last_index`.
    pub last_term: Option<u64>,
}
