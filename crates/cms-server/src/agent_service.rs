use std::sync::Arc;

use cms_proto::v1::{
    agent_channel_service_server::AgentChannelService,
    agent_coordination_service_server::AgentCoordinationService, AgentStreamEvent,
    SelectNodeRequest, SelectNodeResponse, ServerStreamEvent,
};
use cms_storage::PathIndex;
use cms_types::AgentId;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::registry::AgentRegistry;
use crate::session::AgentSession;

pub struct AgentChannelServiceImpl {
    registry: Arc<AgentRegistry>,
    stream_capacity: usize,
}

impl AgentChannelServiceImpl {
    pub fn new(registry: Arc<AgentRegistry>, stream_capacity: usize) -> Self {
        AgentChannelServiceImpl { registry, stream_capacity: stream_capacity.max(1) }
    }
}

#[tonic::async_trait]
impl AgentChannelService for AgentChannelServiceImpl {
    type WatchPropertiesStream = ReceiverStream<Result<ServerStreamEvent, Status>>;

    async fn watch_properties(
        &self,
        request: Request<Streaming<AgentStreamEvent>>,
    ) -> Result<Response<Self::WatchPropertiesStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(self.stream_capacity);
        let mut session = AgentSession::new(self.registry.clone(), tx);

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(msg)) => {
                        session.handle(msg).await;
                        if session.is_closed() {
                            session.finish(None);
                            break;
                        }
                    }
                    Ok(None) => {
                        session.finish(None);
                        break;
                    }
                    Err(status) => {
                        session.finish(Some(&status));
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

pub struct AgentCoordinationServiceImpl {
    paths: Arc<PathIndex>,
    node_url: String,
}

impl AgentCoordinationServiceImpl {
    pub fn new(paths: Arc<PathIndex>, node_url: String) -> Self {
        AgentCoordinationServiceImpl { paths, node_url }
    }
}

#[tonic::async_trait]
impl AgentCoordinationService for AgentCoordinationServiceImpl {
    async fn select_node(
        &self,
        request: Request<SelectNodeRequest>,
    ) -> Result<Response<SelectNodeResponse>, Status> {
        let req = request.into_inner();
        if req.namespace.is_empty() || req.service.is_empty() || req.app_id.is_empty() {
            return Err(Status::invalid_argument("namespace, service and app_id are required"));
        }
        let agent = AgentId::new(req.namespace, req.service, req.app_id);
        tracing::info!(agent = %agent, node_url = %self.node_url, "agent node selection");
        self.paths.register_agent(&agent).await;
        Ok(Response::new(SelectNodeResponse { node_url: self.node_url.clone() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn select_node_records_triple_and_returns_url() {
        let paths = Arc::new(PathIndex::new());
        let svc = AgentCoordinationServiceImpl::new(paths.clone(), "grpc://node-1:9090".into());
        let resp = svc
            .select_node(Request::new(SelectNodeRequest {
                namespace: "prod".into(),
                service: "billing".into(),
                app_id: "api".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.node_url, "grpc://node-1:9090");

        let snap = paths.snapshot().await;
        assert_eq!(snap.namespaces, vec!["prod"]);
        assert_eq!(snap.services, vec!["billing"]);
        assert_eq!(snap.app_ids, vec!["api"]);
        assert!(snap.keys.is_empty());
    }

    #[tokio::test]
    async fn select_node_rejects_blank_triple() {
        let svc = AgentCoordinationServiceImpl::new(Arc::new(PathIndex::new()), "u".into());
        let err = svc
            .select_node(Request::new(SelectNodeRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
