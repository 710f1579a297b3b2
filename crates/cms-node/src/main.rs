use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use cms_consensus::{build_group, LocalRaftNode, PropertyStateMachine, RaftPeer};
use cms_server::{serve_agents, serve_client, AgentRegistry};
use cms_storage::fjall::FjallLogStorage;
use cms_storage::mem::MemLogStorage;
use cms_storage::{Broadcaster, LogStorage, PathIndex, PropertyStore};

#[derive(clap::Parser, Debug)]
#[command(name = "cms-node", about = "Replicated configuration store node")]
struct Cli {
    #[arg(long)]
    node_id: String,
    /// Host this node is reachable at by peers and agents.
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 9001)]
    raft_port: u16,
    #[arg(long, default_value = "0.0.0.0:8080")]
    client_addr: String,
    #[arg(long, default_value = "0.0.0.0:9090")]
    agent_addr: String,
    /// Peer specs: "id:host:port" format, repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "/var/lib/cms")]
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogBackend {
    Fjall,
    Memory,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    log_backend: LogBackend,
}

#[derive(Debug, Deserialize)]
struct RaftConfig {
    group_name: String,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    broadcast_capacity: usize,
    agent_stream_capacity: usize,
    advertised_agent_url: String,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    storage: StorageConfig,
    raft: RaftConfig,
    server: ServerConfig,
    observability: ObservabilityConfig,
}

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));
    if let Some(config_path) = path {
        figment = figment.merge(Toml::file_exact(config_path));
    }
    figment
        .merge(Env::prefixed("CMS_").split("__"))
        .extract()
        .context("failed to load configuration")
}

fn init_tracing(config: &ObservabilityConfig) {
    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt().json().with_env_filter(&config.log_level).init();
        }
        _ => {
            tracing_subscriber::fmt().pretty().with_env_filter(&config.log_level).init();
        }
    }
}

fn agent_url(configured: &str, host: &str, agent_addr: &SocketAddr) -> String {
    if configured.is_empty() {
        format!("grpc://{host}:{}", agent_addr.port())
    } else {
        configured.to_string()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.observability);

    tracing::info!(
        node_id = %cli.node_id,
        client_addr = %cli.client_addr,
        agent_addr = %cli.agent_addr,
        log_backend = ?config.storage.log_backend,
        "node starting"
    );

    match config.storage.log_backend {
        LogBackend::Fjall => {
            let dir = cli.data_dir.join("raft-log");
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create data dir {}", dir.display()))?;
            let log = FjallLogStorage::open(&dir)
                .with_context(|| format!("failed to open command log at {}", dir.display()))?;
            run(cli, config, log, Some(dir)).await
        }
        LogBackend::Memory => run(cli, config, MemLogStorage::new(), None).await,
    }
}

async fn run<L: LogStorage>(
    cli: Cli,
    config: Config,
    log: L,
    storage_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client_addr: SocketAddr = cli
        .client_addr
        .parse()
        .with_context(|| format!("invalid client_addr: {}", cli.client_addr))?;
    let agent_addr: SocketAddr = cli
        .agent_addr
        .parse()
        .with_context(|| format!("invalid agent_addr: {}", cli.agent_addr))?;

    let paths = Arc::new(PathIndex::new());
    let store = Arc::new(PropertyStore::new(paths.clone()));
    let broadcaster = Arc::new(Broadcaster::new(config.server.broadcast_capacity));
    let registry = Arc::new(AgentRegistry::new(store.clone()));
    let dispatcher = registry.spawn_dispatcher(broadcaster.clone());

    let local = RaftPeer::new(cli.node_id.clone(), cli.host.clone(), cli.raft_port);
    let group = build_group(&config.raft.group_name, local, &cli.peers);
    let sm = PropertyStateMachine::new(store, broadcaster.clone());
    let node = Arc::new(
        LocalRaftNode::start(group, cli.node_id.clone(), log, sm, storage_dir.as_deref())
            .await
            .context("failed to start consensus node")?,
    );

    let node_url = agent_url(&config.server.advertised_agent_url, &cli.host, &agent_addr);
    let servers = async {
        tokio::try_join!(
            serve_client(client_addr, node.clone(), paths.clone()),
            serve_agents(
                agent_addr,
                registry.clone(),
                paths.clone(),
                node_url,
                config.server.agent_stream_capacity,
            ),
        )
    };

    let outcome = tokio::select! {
        res = servers => res.map(|_| ()),
        res = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            res.context("failed to listen for shutdown signal")
        }
    };

    registry.close_all().await;
    broadcaster.close();
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "agent dispatcher ended abnormally");
    }
    node.shutdown();
    tracing::info!("node stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = load_config(None).unwrap();
        assert_eq!(config.storage.log_backend, LogBackend::Fjall);
        assert_eq!(config.raft.group_name, "cms-group");
        assert_eq!(config.server.broadcast_capacity, 1000);
        assert!(config.server.advertised_agent_url.is_empty());
    }

    #[test]
    fn agent_url_defaults_to_host_and_port() {
        let addr: SocketAddr = "0.0.0.0:9090".parse().unwrap();
        assert_eq!(agent_url("", "node-1", &addr), "grpc://node-1:9090");
        assert_eq!(agent_url("grpc://lb:1", "node-1", &addr), "grpc://lb:1");
    }

    #[test]
    fn cli_collects_repeated_peers() {
        use clap::Parser;
        let cli = Cli::parse_from([
            "cms-node",
            "--node-id",
            "n1",
            "--peer",
            "n2:h2:9002",
            "--peer",
            "n3:h3:9003",
        ]);
        assert_eq!(cli.peers, vec!["n2:h2:9002", "n3:h3:9003"]);
        assert_eq!(cli.raft_port, 9001);
    }
}
