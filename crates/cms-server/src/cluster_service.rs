use std::sync::Arc;

use cms_consensus::RaftNode;
use cms_proto::v1::{
    cluster_service_server::ClusterService, ClusterStatusRequest, ClusterStatusResponse,
};
use tonic::{Request, Response, Status};

use crate::convert::cluster_status_to_proto;

pub struct ClusterServiceImpl<R> {
    raft: Arc<R>,
}

impl<R: RaftNode> ClusterServiceImpl<R> {
    pub fn new(raft: Arc<R>) -> Self {
        ClusterServiceImpl { raft }
    }
}

#[tonic::async_trait]
impl<R: RaftNode> ClusterService for ClusterServiceImpl<R> {
    async fn cluster_status(
        &self,
        _request: Request<ClusterStatusRequest>,
    ) -> Result<Response<ClusterStatusResponse>, Status> {
        let status = self.raft.status().await;
        Ok(Response::new(cluster_status_to_proto(status)))
    }
}
