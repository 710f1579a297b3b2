use std::fmt;

use uuid::Uuid;

use cms_types::NodeId;

/// A member of the consensus group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftPeer {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl RaftPeer {
    pub fn new(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        RaftPeer { id: id.into(), host: host.into(), port }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RaftPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// The named group every node of one deployment joins.
#[derive(Debug, Clone)]
pub struct RaftGroup {
    pub group_id: Uuid,
    pub name: String,
    /// Local peer first, then the configured peers in order.
    pub peers: Vec<RaftPeer>,
}

impl RaftGroup {
    pub fn peer(&self, id: &str) -> Option<&RaftPeer> {
        self.peers.iter().find(|p| p.id == id)
    }
}

/// Deterministic group id: every node configured with the same name lands in
/// the same group without coordinating a random id.
pub fn group_id_for(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Parse one `id:host:port` peer entry.
///
/// Blank or malformed entries are logged and skipped rather than failing
/// startup. An entry matching `local` in id, host and port is skipped too.
pub fn parse_peer(spec: &str, local: &RaftPeer) -> Option<RaftPeer> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
    let [id, host, port] = parts.as_slice() else {
        tracing::warn!(peer = spec, "invalid peer entry, expected id:host:port");
        return None;
    };
    if id.is_empty() || host.is_empty() {
        tracing::warn!(peer = spec, "invalid peer entry, empty id or host");
        return None;
    }
    let Ok(port) = port.parse::<u16>() else {
        tracing::warn!(peer = spec, "invalid peer port");
        return None;
    };
    let peer = RaftPeer::new(*id, *host, port);
    if peer == *local {
        tracing::debug!(peer = spec, "skipping self in peer list");
        return None;
    }
    Some(peer)
}

/// Assemble the group from the local peer plus configured peer entries.
/// Later duplicates of an id are dropped.
pub fn build_group<S: AsRef<str>>(name: &str, local: RaftPeer, peer_specs: &[S]) -> RaftGroup {
    let mut peers = vec![local];
    for spec in peer_specs {
        let Some(peer) = parse_peer(spec.as_ref(), &peers[0]) else {
            continue;
        };
        if let Some(existing) = peers.iter().find(|p| p.id == peer.id) {
            tracing::warn!(peer = %peer, existing = %existing, "duplicate peer id, ignoring");
            continue;
        }
        peers.push(peer);
    }
    let group = RaftGroup { group_id: group_id_for(name), name: name.to_string(), peers };
    tracing::info!(
        group = %group.name,
        group_id = %group.group_id,
        peers = group.peers.len(),
        "built consensus group"
    );
    group
}
