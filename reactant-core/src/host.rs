//! Session Host
//!
//! Runs one session per connected client. A session is `!Send`, so each one
//! is created on, and never leaves, its own worker thread. The client side
//! talks to the worker through a pair of `tokio` channels:
//!
//! - inbound [`ClientMessage`]s are applied to the session one at a time,
//!   each update as a single external event;
//! - outbound [`ServerMessage`]s carry whatever the session's output
//!   effects render.
//!
//! Sessions share nothing. The host only keeps a map of which sessions are
//! live and when they connected.

use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::{ReactiveError, Result};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::reactive::{Session, SessionId};
use crate::render::{RenderKind, RenderTarget};

/// Errors raised by the host and by client connections.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("session {0} is no longer running")]
    Disconnected(SessionId),

    #[error("session {0} worker panicked")]
    WorkerPanicked(SessionId),
}

/// Application code run once per new session to define its graph.
pub trait App: Send + Sync + 'static {
    fn setup(&self, session: &Session) -> Result<()>;
}

impl<F> App for F
where
    F: Fn(&Session) -> Result<()> + Send + Sync + 'static,
{
    fn setup(&self, session: &Session) -> Result<()> {
        self(session)
    }
}

/// Forwards render calls to the client's outbound channel.
struct ChannelTarget {
    session: SessionId,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelTarget {
    fn send(&self, message: ServerMessage) {
        deliver(self.session, &self.outbound, message);
    }
}

/// Send `message` to the client, logging instead of failing if it is gone.
fn deliver(session: SessionId, outbound: &mpsc::UnboundedSender<ServerMessage>, message: ServerMessage) {
    if outbound.send(message).is_err() {
        tracing::trace!(session = %session, "client stopped listening; dropping message");
    }
}

impl RenderTarget for ChannelTarget {
    fn write(&self, name: &str, kind: RenderKind, payload: &Value) {
        self.send(ServerMessage::Render {
            name: name.to_string(),
            kind,
            payload: payload.clone(),
        });
    }

    fn clear(&self, name: &str) {
        self.send(ServerMessage::Clear { name: name.to_string() });
    }

    fn report_error(&self, name: &str, error: &ReactiveError) {
        self.send(ServerMessage::Error {
            name: name.to_string(),
            message: error.to_string(),
        });
    }
}

/// Spawns and tracks sessions.
pub struct SessionHost {
    app: Arc<dyn App>,
    config: SessionConfig,
    live: Arc<DashMap<SessionId, Instant>>,
}

impl SessionHost {
    pub fn new<A: App>(app: A, config: SessionConfig) -> Self {
        Self {
            app: Arc::new(app),
            config,
            live: Arc::new(DashMap::new()),
        }
    }

    /// Start a new session on its own worker thread.
    pub fn connect(&self) -> std::result::Result<Connection, HostError> {
        let id = SessionId::next();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let app = Arc::clone(&self.app);
        let config = self.config.clone();
        let live = Arc::clone(&self.live);
        self.live.insert(id, Instant::now());

        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || {
                run_session(id, app, config, inbound_rx, outbound_tx);
                live.remove(&id);
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.live.remove(&id);
                return Err(HostError::Spawn(err));
            }
        };

        tracing::info!(session = %id, "client connected");
        Ok(Connection {
            id,
            inbound: inbound_tx,
            outbound: outbound_rx,
            worker: Some(worker),
        })
    }

    /// Ids of sessions whose workers are still running.
    pub fn live_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.live.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// When a live session connected.
    pub fn connected_at(&self, id: SessionId) -> Option<Instant> {
        self.live.get(&id).map(|entry| *entry.value())
    }
}

fn run_session(
    id: SessionId,
    app: Arc<dyn App>,
    config: SessionConfig,
    mut inbound: mpsc::UnboundedReceiver<ClientMessage>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
) {
    let target = Rc::new(ChannelTarget {
        session: id,
        outbound: outbound.clone(),
    });
    let session = Session::with_id(id, config, target);

    match app.setup(&session) {
        Ok(()) => {
            while let Some(message) = inbound.blocking_recv() {
                match message {
                    ClientMessage::Update { inputs } => {
                        tracing::debug!(session = %id, inputs = inputs.len(), "applying update");
                        if let Err(error) = session.apply(inputs) {
                            tracing::warn!(session = %id, %error, "update failed");
                            deliver(
                                id,
                                &outbound,
                                ServerMessage::Error {
                                    name: String::new(),
                                    message: error.to_string(),
                                },
                            );
                        }
                    }
                    ClientMessage::Close => break,
                }
            }
        }
        Err(error) => {
            tracing::error!(session = %id, %error, "session setup failed");
            deliver(
                id,
                &outbound,
                ServerMessage::Error {
                    name: String::new(),
                    message: error.to_string(),
                },
            );
        }
    }

    session.close();
    deliver(id, &outbound, ServerMessage::Closed);
    tracing::info!(session = %id, "client disconnected");
}

/// The client's end of a hosted session.
pub struct Connection {
    id: SessionId,
    inbound: mpsc::UnboundedSender<ClientMessage>,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
    worker: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn send(&self, message: ClientMessage) -> std::result::Result<(), HostError> {
        self.inbound
            .send(message)
            .map_err(|_| HostError::Disconnected(self.id))
    }

    /// Send a batch of input values.
    pub fn update<I, K>(&self, inputs: I) -> std::result::Result<(), HostError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.send(ClientMessage::update(inputs))
    }

    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.outbound.recv().await
    }

    /// Wait for the next message. Must not be called from async code.
    pub fn blocking_recv(&mut self) -> Option<ServerMessage> {
        self.outbound.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.outbound.try_recv().ok()
    }

    /// End the session and wait for its worker to finish.
    pub fn close(mut self) -> std::result::Result<(), HostError> {
        if self.inbound.send(ClientMessage::Close).is_err() {
            tracing::trace!(session = %self.id, "session already stopped");
        }
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| HostError::WorkerPanicked(self.id)),
            None => Ok(()),
        }
    }
}
