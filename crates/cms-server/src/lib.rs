mod agent_service;
mod cluster_service;
mod convert;
mod property_service;
pub mod registry;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use cms_consensus::RaftNode;
use cms_proto::v1::{
    agent_channel_service_server::AgentChannelServiceServer,
    agent_coordination_service_server::AgentCoordinationServiceServer,
    cluster_service_server::ClusterServiceServer, property_service_server::PropertyServiceServer,
};
use cms_storage::PathIndex;
use tonic_reflection::server::Builder as ReflectionBuilder;

use agent_service::{AgentChannelServiceImpl, AgentCoordinationServiceImpl};
use cluster_service::ClusterServiceImpl;
use property_service::PropertyServiceImpl;

pub use registry::{AgentRegistry, AgentSender};
pub use session::{AgentSession, SessionState};

/// Property reads/writes and cluster status.
pub async fn serve_client<R: RaftNode>(
    addr: SocketAddr,
    raft: Arc<R>,
    paths: Arc<PathIndex>,
) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(cms_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("failed to build reflection service");
    tracing::info!(%addr, "client gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(PropertyServiceServer::new(PropertyServiceImpl::new(raft.clone(), paths)))
        .add_service(ClusterServiceServer::new(ClusterServiceImpl::new(raft)))
        .add_service(reflection)
        .serve(addr)
        .await
        .map_err(Into::into)
}

/// Agent coordination and the long-lived watch streams.
pub async fn serve_agents(
    addr: SocketAddr,
    registry: Arc<AgentRegistry>,
    paths: Arc<PathIndex>,
    node_url: String,
    stream_capacity: usize,
) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(cms_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("failed to build reflection service");
    tracing::info!(%addr, %node_url, "agent gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(AgentChannelServiceServer::new(AgentChannelServiceImpl::new(
            registry,
            stream_capacity,
        )))
        .add_service(AgentCoordinationServiceServer::new(AgentCoordinationServiceImpl::new(
            paths, node_url,
        )))
        .add_service(reflection)
        .serve(addr)
        .await
        .map_err(Into::into)
}
