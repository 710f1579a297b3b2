use std::time::{SystemTime, UNIX_EPOCH};

use cms_consensus::{parse_reply, ClusterStatus, RaftPeer};
use cms_proto::v1::{
    server_stream_event, ClusterStatusResponse, Peer, Property, QueryRequest, ServerInitEvent,
    ServerPropertyUpdateEvent, ServerStreamEvent,
};
use cms_types::{
    CmsError, PropertyEntry, PropertyKey, PropertyQueryFilter, PropertyUpdateEvent,
    RaftResultStatus, DEFAULT_QUERY_LIMIT,
};
use tonic::Status;

pub fn entry_to_proto(entry: PropertyEntry) -> Property {
    Property {
        key: entry.key.to_string(),
        value: entry.value.value,
        last_modified_ms: entry.value.last_modified_ms,
    }
}

pub fn init_event(entries: Vec<PropertyEntry>) -> ServerStreamEvent {
    ServerStreamEvent {
        event: Some(server_stream_event::Event::InitEvent(ServerInitEvent {
            properties: entries.into_iter().map(entry_to_proto).collect(),
        })),
    }
}

pub fn update_event(event: PropertyUpdateEvent) -> ServerStreamEvent {
    let (value, last_modified_ms) = match event.value {
        Some(v) => (Some(v.value), v.last_modified_ms),
        None => (None, 0),
    };
    ServerStreamEvent {
        event: Some(server_stream_event::Event::UpdateEvent(ServerPropertyUpdateEvent {
            key: event.key.to_string(),
            value,
            last_modified_ms,
        })),
    }
}

pub fn filter_from_proto(req: QueryRequest) -> PropertyQueryFilter {
    PropertyQueryFilter {
        namespace_regex: req.namespace_regex,
        service_regex: req.service_regex,
        app_id_regex: req.app_id_regex,
        key_regex: req.key_regex,
        value_regex: req.value_regex,
        limit: req.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
    }
}

fn peer_to_proto(peer: RaftPeer) -> Peer {
    Peer { id: peer.id, host: peer.host, port: u32::from(peer.port) }
}

pub fn cluster_status_to_proto(status: ClusterStatus) -> ClusterStatusResponse {
    ClusterStatusResponse {
        node_id: status.node_id,
        group_id: status.group_id.to_string(),
        group_name: status.group_name,
        is_leader: status.is_leader,
        leader_id: status.leader_id.unwrap_or_default(),
        peers: status.peers.into_iter().map(peer_to_proto).collect(),
        term: status.term,
        last_log_index: status.last_log_index,
    }
}

pub fn parse_key(raw: &str) -> Result<PropertyKey, Status> {
    if raw.is_empty() {
        return Err(Status::invalid_argument("key must not be empty"));
    }
    raw.parse().map_err(cms_to_status)
}

/// Unwrap a facade reply into the `OK` payload, mapping the other statuses.
pub fn reply_payload(reply: &str, key: &str) -> Result<Vec<u8>, Status> {
    let result = parse_reply(reply).map_err(cms_to_status)?;
    match result.status {
        RaftResultStatus::Ok => Ok(result.result),
        RaftResultStatus::NotFound => Err(Status::not_found(format!("key '{key}' not found"))),
        RaftResultStatus::Error => Err(Status::internal("command failed")),
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn cms_to_status(err: CmsError) -> Status {
    match &err {
        CmsError::NotFound => Status::not_found(err.to_string()),
        CmsError::InvalidArgument(_) | CmsError::InvalidKey(_) | CmsError::Query(_) => {
            Status::invalid_argument(err.to_string())
        }
        CmsError::Codec(_) | CmsError::Storage(_) | CmsError::Consensus(_) => {
            Status::internal(err.to_string())
        }
    }
}
