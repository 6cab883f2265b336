//! Per-session dispatcher task.
//!
//! The dispatcher is the only writer of a session's client list and timer.
//! Connection tasks reach it exclusively through its command queue.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use pomosync_core::timer::now_epoch_ms;
use pomosync_core::{ClientId, SessionId, TimerState, WireMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::ClientConnection;
use crate::metrics::CLIENT_SEND_FAILURES_TOTAL;

/// How a client came to be attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachMode {
    /// The client created the session and gets a `created` acknowledgement.
    Created,
    /// The client joined an existing session.
    Joined,
}

/// Requests accepted by the dispatcher.
pub(crate) enum SessionCommand {
    Attach {
        client: Arc<ClientConnection>,
        mode: AttachMode,
        reply: oneshot::Sender<()>,
    },
    Detach {
        client_id: ClientId,
        reply: oneshot::Sender<()>,
    },
    Inbound {
        client_id: ClientId,
        message: WireMessage,
    },
}

/// Read-only snapshot of a session, republished after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionView {
    /// Canonical timer.
    pub timer: TimerState,
    /// Display names of attached clients, in attach order.
    pub members: Vec<String>,
}

pub(crate) struct SessionDispatcher {
    session_id: SessionId,
    clients: Vec<Arc<ClientConnection>>,
    /// Clients dropped after a failed send whose connection has not
    /// detached yet. Their `userLeft` goes out on detach.
    departed: HashMap<ClientId, String>,
    timer: TimerState,
    view: watch::Sender<SessionView>,
}

impl SessionDispatcher {
    pub(crate) fn new(session_id: SessionId, view: watch::Sender<SessionView>) -> Self {
        Self {
            session_id,
            clients: Vec::new(),
            departed: HashMap::new(),
            timer: TimerState::default(),
            view,
        }
    }

    /// Process commands until `stop` fires or every sender is gone.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        stop: CancellationToken,
    ) {
        debug!("dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd, now_epoch_ms()),
                    None => break,
                },
            }
        }
        for client in self.clients.drain(..) {
            client.close();
        }
        self.departed.clear();
        info!("dispatcher stopped");
    }

    pub(crate) fn handle(&mut self, cmd: SessionCommand, now_ms: i64) {
        match cmd {
            SessionCommand::Attach { client, mode, reply } => {
                self.attach(client, mode);
                let _ = reply.send(());
            }
            SessionCommand::Detach { client_id, reply } => {
                self.detach(&client_id);
                let _ = reply.send(());
            }
            SessionCommand::Inbound { client_id, message } => {
                self.inbound(&client_id, message, now_ms);
            }
        }
    }

    fn attach(&mut self, client: Arc<ClientConnection>, mode: AttachMode) {
        let client_id = client.id.clone();
        let name = client.display_name.clone();
        self.clients.push(client);
        debug!(%client_id, display_name = %name, ?mode, "client attached");

        if self.timer.has_progress() {
            self.unicast(&client_id, &WireMessage::replay(&self.timer));
        }
        if mode == AttachMode::Created {
            self.unicast(&client_id, &WireMessage::created(&self.session_id, &self.timer));
        }
        self.broadcast(&WireMessage::user_joined(&name, &self.timer));
        self.publish();
    }

    fn detach(&mut self, client_id: &ClientId) {
        let name = if let Some(pos) = self.clients.iter().position(|c| &c.id == client_id) {
            self.clients.remove(pos).display_name.clone()
        } else if let Some(name) = self.departed.remove(client_id) {
            name
        } else {
            return;
        };
        debug!(%client_id, "client detached");
        self.broadcast(&WireMessage::user_left(&name, &self.timer));
        self.publish();
    }

    fn inbound(&mut self, client_id: &ClientId, message: WireMessage, now_ms: i64) {
        let Some(sender) = self.clients.iter().find(|c| &c.id == client_id) else {
            return;
        };
        if !message.action.is_client_action() {
            debug!(action = message.action.as_str(), "ignoring non-client action");
            return;
        }
        let username = sender.display_name.clone();
        let _ = self.timer.apply(&message.action, now_ms);
        let update = WireMessage::timer_update(message.action, message.data, &self.timer, username);
        self.broadcast(&update);
        self.publish();
    }

    fn unicast(&mut self, client_id: &ClientId, message: &WireMessage) {
        let frame: Arc<str> = Arc::from(message.encode());
        let failed = self
            .clients
            .iter()
            .find(|c| &c.id == client_id)
            .is_some_and(|c| !c.send(frame));
        if failed {
            self.drop_client(client_id);
        }
    }

    fn broadcast(&mut self, message: &WireMessage) {
        let frame: Arc<str> = Arc::from(message.encode());
        let session_id = &self.session_id;
        let departed = &mut self.departed;
        self.clients.retain(|client| {
            if client.send(Arc::clone(&frame)) {
                return true;
            }
            warn!(%session_id, client_id = %client.id, "client send failed, dropping client");
            counter!(CLIENT_SEND_FAILURES_TOTAL).increment(1);
            client.close();
            let _ = departed.insert(client.id.clone(), client.display_name.clone());
            false
        });
    }

    fn drop_client(&mut self, client_id: &ClientId) {
        if let Some(pos) = self.clients.iter().position(|c| &c.id == client_id) {
            let client = self.clients.remove(pos);
            warn!(session_id = %self.session_id, %client_id, "client send failed, dropping client");
            counter!(CLIENT_SEND_FAILURES_TOTAL).increment(1);
            client.close();
            let _ = self.departed.insert(client.id.clone(), client.display_name.clone());
        }
    }

    fn publish(&self) {
        let view = SessionView {
            timer: self.timer,
            members: self.clients.iter().map(|c| c.display_name.clone()).collect(),
        };
        let _ = self.view.send_replace(view);
    }
}
