use std::fmt;
use std::str::FromStr;

pub type NodeId = String;

/// The only wire/struct version this build understands.
pub const CURRENT_VERSION: u8 = 1;

/// Default number of matches returned by a query when the caller gives none.
pub const DEFAULT_QUERY_LIMIT: i32 = 10;

// ---------------------------------------------------------------------------
// Property key / value
// ---------------------------------------------------------------------------

/// Fully qualified property address. Identity covers all five fields,
/// `version` included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    pub version: u8,
    pub namespace: String,
    pub service: String,
    pub app_id: String,
    pub key: String,
}

impl PropertyKey {
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        app_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        PropertyKey {
            version: CURRENT_VERSION,
            namespace: namespace.into(),
            service: service.into(),
            app_id: app_id.into(),
            key: key.into(),
        }
    }

    /// The agent that owns this key (everything but the leaf).
    pub fn agent_id(&self) -> AgentId {
        AgentId {
            namespace: self.namespace.clone(),
            service: self.service.clone(),
            app_id: self.app_id.clone(),
        }
    }

    pub fn belongs_to(&self, namespace: &str, service: &str, app_id: &str) -> bool {
        self.namespace == namespace && self.service == service && self.app_id == app_id
    }
}

/// Canonical form: `version/namespace/service/appId/key`.
impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.version, self.namespace, self.service, self.app_id, self.key
        )
    }
}

impl FromStr for PropertyKey {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 5 {
            return Err(CmsError::InvalidKey(format!(
                "'{s}' must have 5 '/'-separated parts, got {}",
                parts.len()
            )));
        }
        let version = parts[0]
            .parse::<u8>()
            .map_err(|_| CmsError::InvalidKey(format!("'{s}' has a non-numeric version")))?;
        Ok(PropertyKey {
            version,
            namespace: parts[1].to_string(),
            service: parts[2].to_string(),
            app_id: parts[3].to_string(),
            key: parts[4].to_string(),
        })
    }
}

/// Stored value. `last_modified_ms` is the writer's wall clock; ordering
/// between writers comes from the log, never from this field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub version: u8,
    pub value: Vec<u8>,
    pub last_modified_ms: i64,
}

impl PropertyValue {
    pub fn new(value: impl Into<Vec<u8>>, last_modified_ms: i64) -> Self {
        PropertyValue { version: CURRENT_VERSION, value: value.into(), last_modified_ms }
    }
}

/// A `(key, value)` pair as returned by queries and agent snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    pub key: PropertyKey,
    pub value: PropertyValue,
}

// ---------------------------------------------------------------------------
// Raft command / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaftOp {
    Get,
    Put,
    Delete,
    Query,
}

impl RaftOp {
    pub fn code(self) -> u8 {
        match self {
            RaftOp::Get => 1,
            RaftOp::Put => 2,
            RaftOp::Delete => 3,
            RaftOp::Query => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RaftOp::Get),
            2 => Some(RaftOp::Put),
            3 => Some(RaftOp::Delete),
            4 => Some(RaftOp::Query),
            _ => None,
        }
    }

    pub fn is_mutation(self) -> bool {
        matches!(self, RaftOp::Put | RaftOp::Delete)
    }
}

/// Unit placed into the consensus log (writes) or sent straight to the
/// state machine (reads).
///
/// `key` is present for GET/PUT/DELETE. For QUERY it is absent and `value`
/// carries an encoded [`PropertyQueryFilter`]. For PUT, `value` carries an
/// encoded [`PropertyValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftCommand {
    pub version: u8,
    pub operation: RaftOp,
    pub key: Option<PropertyKey>,
    pub value: Vec<u8>,
}

impl RaftCommand {
    pub fn get(key: PropertyKey) -> Self {
        RaftCommand {
            version: CURRENT_VERSION,
            operation: RaftOp::Get,
            key: Some(key),
            value: Vec::new(),
        }
    }

    pub fn put(key: PropertyKey, encoded_value: Vec<u8>) -> Self {
        RaftCommand {
            version: CURRENT_VERSION,
            operation: RaftOp::Put,
            key: Some(key),
            value: encoded_value,
        }
    }

    pub fn delete(key: PropertyKey) -> Self {
        RaftCommand {
            version: CURRENT_VERSION,
            operation: RaftOp::Delete,
            key: Some(key),
            value: Vec::new(),
        }
    }

    pub fn query(encoded_filter: Vec<u8>) -> Self {
        RaftCommand {
            version: CURRENT_VERSION,
            operation: RaftOp::Query,
            key: None,
            value: encoded_filter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaftResultStatus {
    Ok,
    NotFound,
    Error,
}

impl RaftResultStatus {
    pub fn code(self) -> u8 {
        match self {
            RaftResultStatus::Ok => 1,
            RaftResultStatus::NotFound => 2,
            RaftResultStatus::Error => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RaftResultStatus::Ok),
            2 => Some(RaftResultStatus::NotFound),
            3 => Some(RaftResultStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RaftResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RaftResultStatus::Ok => "OK",
            RaftResultStatus::NotFound => "NOT_FOUND",
            RaftResultStatus::Error => "ERROR",
        })
    }
}

/// Reply for every applied or queried command. The meaning of `result`
/// depends on the originating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftResult {
    pub version: u8,
    pub status: RaftResultStatus,
    pub result: Vec<u8>,
}

impl RaftResult {
    pub fn ok(result: Vec<u8>) -> Self {
        RaftResult { version: CURRENT_VERSION, status: RaftResultStatus::Ok, result }
    }

    pub fn not_found() -> Self {
        RaftResult {
            version: CURRENT_VERSION,
            status: RaftResultStatus::NotFound,
            result: Vec::new(),
        }
    }

    pub fn error() -> Self {
        RaftResult { version: CURRENT_VERSION, status: RaftResultStatus::Error, result: Vec::new() }
    }
}

// ---------------------------------------------------------------------------
// Query filter
// ---------------------------------------------------------------------------

/// Regex filter over the four key components. `None` and `Some("")` both
/// mean "no filter on this dimension". `value_regex` is carried on the wire
/// but the query engine does not evaluate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyQueryFilter {
    pub namespace_regex: Option<String>,
    pub service_regex: Option<String>,
    pub app_id_regex: Option<String>,
    pub key_regex: Option<String>,
    pub value_regex: Option<String>,
    pub limit: i32,
}

impl Default for PropertyQueryFilter {
    fn default() -> Self {
        PropertyQueryFilter {
            namespace_regex: None,
            service_regex: None,
            app_id_regex: None,
            key_regex: None,
            value_regex: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl PropertyQueryFilter {
    /// Negative limits are clamped to zero.
    pub fn effective_limit(&self) -> usize {
        self.limit.max(0) as usize
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// One logical stream subscriber. Coarser than a `PropertyKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId {
    pub namespace: String,
    pub service: String,
    pub app_id: String,
}

impl AgentId {
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        AgentId { namespace: namespace.into(), service: service.into(), app_id: app_id.into() }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.service, self.app_id)
    }
}

/// A committed mutation as seen by agents. `value` is `None` for deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyUpdateEvent {
    pub key: PropertyKey,
    pub value: Option<PropertyValue>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CmsError {
    #[error("property not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid property key: {0}")]
    InvalidKey(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid query: {0}")]
    Query(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("consensus error: {0}")]
    Consensus(String),
}
