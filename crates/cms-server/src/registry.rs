use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tonic::Status;

use cms_proto::v1::ServerStreamEvent;
use cms_storage::{Broadcaster, PropertyStore};
use cms_types::{AgentId, PropertyUpdateEvent};

use crate::convert::{init_event, update_event};

/// Outbound half of an agent's response stream.
pub type AgentSender = mpsc::Sender<Result<ServerStreamEvent, Status>>;

/// One registered stream. The mutex serializes every write to it.
///
/// The connection owns the only sender of its response stream; taking it out
/// ends the stream.
pub struct Connection {
    session: String,
    tx: Mutex<Option<AgentSender>>,
}

impl Connection {
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Detach the sender so it can be re-registered under another agent.
    /// `None` once the stream has been closed.
    pub(crate) async fn take_sender(&self) -> Option<AgentSender> {
        self.tx.lock().await.take()
    }

    async fn terminate(&self) {
        self.tx.lock().await.take();
    }
}

/// Live agent streams keyed by `AgentId`. At most one stream per agent;
/// registering again replaces the old stream without notifying it.
pub struct AgentRegistry {
    connections: DashMap<AgentId, Arc<Connection>>,
    store: Arc<PropertyStore>,
}

impl AgentRegistry {
    pub fn new(store: Arc<PropertyStore>) -> Self {
        AgentRegistry { connections: DashMap::new(), store }
    }

    pub fn register(&self, agent: AgentId, session: &str, tx: AgentSender) -> Arc<Connection> {
        let conn = Arc::new(Connection { session: session.to_string(), tx: Mutex::new(Some(tx)) });
        match self.connections.insert(agent.clone(), conn.clone()) {
            Some(old) => tracing::info!(
                agent = %agent,
                session,
                replaced = old.session(),
                "agent re-registered, previous stream replaced"
            ),
            None => tracing::info!(agent = %agent, session, "agent registered"),
        }
        conn
    }

    /// Idempotent.
    pub fn unregister(&self, agent: &AgentId) -> bool {
        let removed = self.connections.remove(agent).is_some();
        if removed {
            tracing::info!(agent = %agent, "agent unregistered");
        }
        removed
    }

    /// Remove `agent` only while it is still bound to `conn`.
    pub fn release(&self, agent: &AgentId, conn: &Arc<Connection>) -> bool {
        let removed = self.connections.remove_if(agent, |_, c| Arc::ptr_eq(c, conn)).is_some();
        if removed {
            tracing::info!(agent = %agent, session = conn.session(), "agent released");
        }
        removed
    }

    /// Terminate and remove the agent's stream.
    pub async fn close(&self, agent: &AgentId) {
        if let Some((_, conn)) = self.connections.remove(agent) {
            conn.terminate().await;
            tracing::info!(agent = %agent, session = conn.session(), "agent stream closed");
        }
    }

    pub async fn close_all(&self) {
        let conns: Vec<Arc<Connection>> =
            self.connections.iter().map(|e| e.value().clone()).collect();
        self.connections.clear();
        for conn in &conns {
            conn.terminate().await;
        }
        tracing::info!(count = conns.len(), "closed all agent streams");
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.connections.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Deliver the agent's current snapshot. The snapshot is read under the
    /// agent's lock, so no update delivered before it can be newer than it.
    /// A stream that is already gone is unregistered instead of failing the
    /// caller.
    pub async fn send_init(&self, agent: &AgentId) -> bool {
        let Some(conn) = self.connection(agent) else {
            return false;
        };
        let mut tx = conn.tx.lock().await;
        let entries =
            self.store.snapshot_for_agent(&agent.namespace, &agent.service, &agent.app_id).await;
        let count = entries.len();
        let delivered = self.write(agent, &conn, &mut tx, init_event(entries));
        if delivered {
            tracing::info!(agent = %agent, properties = count, "sent init event");
        }
        delivered
    }

    /// Forward one update to the agent owning its key. No-op when that agent
    /// is not connected.
    pub async fn dispatch(&self, event: PropertyUpdateEvent) -> bool {
        let agent = event.key.agent_id();
        let Some(conn) = self.connection(&agent) else {
            return false;
        };
        let key = event.key.to_string();
        let mut tx = conn.tx.lock().await;
        let delivered = self.write(&agent, &conn, &mut tx, update_event(event));
        if delivered {
            tracing::debug!(agent = %agent, key, "sent update event");
        }
        delivered
    }

    // clone out of the map so no shard lock is held across an await
    fn connection(&self, agent: &AgentId) -> Option<Arc<Connection>> {
        self.connections.get(agent).map(|e| e.value().clone())
    }

    /// Non-blocking write through the locked sender. A full or closed stream
    /// is a delivery failure: the agent is unregistered and its stream ends
    /// once the already buffered events are read.
    fn write(
        &self,
        agent: &AgentId,
        conn: &Arc<Connection>,
        tx: &mut Option<AgentSender>,
        event: ServerStreamEvent,
    ) -> bool {
        let Some(sender) = tx.as_ref() else {
            self.release(agent, conn);
            return false;
        };
        match sender.try_send(Ok(event)) {
            Ok(()) => return true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(agent = %agent, session = conn.session(), "agent stream full");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(agent = %agent, session = conn.session(), "agent stream cancelled");
            }
        }
        tx.take();
        self.release(agent, conn);
        false
    }

    /// Consume the broadcaster until it closes, forwarding each event.
    pub fn spawn_dispatcher(self: &Arc<Self>, broadcaster: Arc<Broadcaster>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            tracing::info!("agent dispatcher started");
            while let Some(event) = broadcaster.recv().await {
                registry.dispatch(event).await;
            }
            tracing::info!("agent dispatcher stopped");
        })
    }
}
