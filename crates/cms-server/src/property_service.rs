use std::sync::Arc;

use cms_codec::{decode_entries, decode_value, encode_filter, encode_value};
use cms_consensus::RaftNode;
use cms_proto::v1::{
    property_service_server::PropertyService, DeleteRequest, DeleteResponse, GetRequest,
    GetResponse, ListPathsRequest, ListPathsResponse, Property, PutRequest, PutResponse,
    QueryRequest, QueryResponse,
};
use cms_storage::PathIndex;
use cms_types::{PropertyValue, RaftCommand};
use tonic::{Request, Response, Status};

use crate::convert::{
    cms_to_status, entry_to_proto, filter_from_proto, now_ms, parse_key, reply_payload,
};

pub struct PropertyServiceImpl<R> {
    raft: Arc<R>,
    paths: Arc<PathIndex>,
}

impl<R: RaftNode> PropertyServiceImpl<R> {
    pub fn new(raft: Arc<R>, paths: Arc<PathIndex>) -> Self {
        PropertyServiceImpl { raft, paths }
    }
}

fn codec_status(e: cms_codec::CodecError) -> Status {
    cms_to_status(e.into())
}

#[tonic::async_trait]
impl<R: RaftNode> PropertyService for PropertyServiceImpl<R> {
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        let key = parse_key(&req.key)?;
        let value = PropertyValue::new(req.value, now_ms());
        let last_modified_ms = value.last_modified_ms;
        let cmd = RaftCommand::put(key, encode_value(&value).map_err(codec_status)?);
        let reply = self.raft.send_command(cmd).await;
        reply_payload(&reply, &req.key)?;
        Ok(Response::new(PutResponse { last_modified_ms }))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        let key = parse_key(&req.key)?;
        let reply = self.raft.send_query(RaftCommand::get(key)).await;
        let value = decode_value(&reply_payload(&reply, &req.key)?).map_err(codec_status)?;
        Ok(Response::new(GetResponse {
            property: Some(Property {
                key: req.key,
                value: value.value,
                last_modified_ms: value.last_modified_ms,
            }),
        }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        let key = parse_key(&req.key)?;
        let reply = self.raft.send_command(RaftCommand::delete(key)).await;
        reply_payload(&reply, &req.key)?;
        Ok(Response::new(DeleteResponse {}))
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let filter = filter_from_proto(request.into_inner());
        let cmd = RaftCommand::query(encode_filter(&filter).map_err(codec_status)?);
        let reply = self.raft.send_query(cmd).await;
        let entries = decode_entries(&reply_payload(&reply, "")?).map_err(codec_status)?;
        Ok(Response::new(QueryResponse {
            properties: entries.into_iter().map(entry_to_proto).collect(),
        }))
    }

    async fn list_paths(
        &self,
        _request: Request<ListPathsRequest>,
    ) -> Result<Response<ListPathsResponse>, Status> {
        let snap = self.paths.snapshot().await;
        Ok(Response::new(ListPathsResponse {
            namespaces: snap.namespaces,
            services: snap.services,
            app_ids: snap.app_ids,
            keys: snap.keys,
        }))
    }
}
