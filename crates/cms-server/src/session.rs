use std::sync::Arc;

use tonic::Status;

use cms_proto::v1::{agent_stream_event::Event, AgentStreamEvent};
use cms_types::AgentId;

use crate::registry::{AgentRegistry, AgentSender, Connection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConnect,
    Connected(AgentId),
}

/// Server side of one `WatchProperties` stream.
///
/// The session owns its response sender until the first `Connect`, which
/// hands it to the registry's connection. Later connects move it to the new
/// registration. Once the registry closes the connection the stream is over.
pub struct AgentSession {
    id: String,
    state: SessionState,
    connection: Option<Arc<Connection>>,
    registry: Arc<AgentRegistry>,
    tx: Option<AgentSender>,
    closed: bool,
}

impl AgentSession {
    pub fn new(registry: Arc<AgentRegistry>, tx: AgentSender) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session = %id, "watch session started");
        AgentSession {
            id,
            state: SessionState::AwaitingConnect,
            connection: None,
            registry,
            tx: Some(tx),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The server closed this session's stream; further messages are ignored.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn handle(&mut self, msg: AgentStreamEvent) {
        if self.closed {
            tracing::debug!(session = %self.id, "message after stream closed");
            return;
        }
        match msg.event {
            Some(Event::Heartbeat(_)) => {
                tracing::trace!(session = %self.id, "heartbeat");
            }
            Some(Event::Connect(c)) => {
                let agent = AgentId::new(c.namespace, c.service, c.app_id);
                self.connect(agent).await;
            }
            None => {
                tracing::warn!(
                    session = %self.id,
                    state = ?self.state,
                    "unknown message from agent"
                );
            }
        }
    }

    async fn connect(&mut self, agent: AgentId) {
        let tx = match (self.tx.take(), self.connection.take()) {
            (Some(tx), _) => Some(tx),
            (None, Some(prev)) => {
                if let SessionState::Connected(prev_agent) = &self.state {
                    if *prev_agent != agent {
                        self.registry.release(prev_agent, &prev);
                    }
                }
                prev.take_sender().await
            }
            (None, None) => None,
        };
        let Some(tx) = tx else {
            tracing::info!(session = %self.id, agent = %agent, "connect on closed stream ignored");
            self.closed = true;
            return;
        };
        let conn = self.registry.register(agent.clone(), &self.id, tx);
        self.connection = Some(conn);
        self.state = SessionState::Connected(agent.clone());
        self.registry.send_init(&agent).await;
    }

    /// Tear down after the client completed (`None`) or the transport failed.
    pub fn finish(self, error: Option<&Status>) {
        match error {
            Some(status) => tracing::warn!(session = %self.id, error = %status, "client error"),
            None => tracing::info!(session = %self.id, "watch session completed"),
        }
        if let (SessionState::Connected(agent), Some(conn)) = (&self.state, &self.connection) {
            self.registry.release(agent, conn);
        }
    }
}
