//! Connected socket clients and their environment subscriptions.

use mendel_net::{ConnectionId, ServerMessage};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

struct Client {
    outbox: UnboundedSender<ServerMessage>,
    environments: BTreeSet<String>,
}

/// Clients keyed by connection. Closed outboxes are dropped on the next send.
#[derive(Default)]
pub(crate) struct Clients {
    clients: HashMap<ConnectionId, Client>,
}

impl Clients {
    pub(crate) fn connect(&mut self, connection: ConnectionId, outbox: UnboundedSender<ServerMessage>) {
        self.clients.insert(
            connection,
            Client {
                outbox,
                environments: BTreeSet::new(),
            },
        );
    }

    pub(crate) fn disconnect(&mut self, connection: ConnectionId) {
        self.clients.remove(&connection);
    }

    /// Subscribes `connection` to `environment` after sending `initial`.
    pub(crate) fn subscribe(
        &mut self,
        connection: ConnectionId,
        environment: &str,
        initial: Vec<ServerMessage>,
    ) {
        let Some(client) = self.clients.get_mut(&connection) else {
            return;
        };
        for message in initial {
            if client.outbox.send(message).is_err() {
                self.clients.remove(&connection);
                return;
            }
        }
        debug!(connection = connection.0, environment, "client subscribed");
        client.environments.insert(environment.to_string());
    }

    /// Sends one message to `connection`.
    pub(crate) fn reply(&mut self, connection: ConnectionId, message: ServerMessage) {
        let alive = self
            .clients
            .get(&connection)
            .is_some_and(|c| c.outbox.send(message).is_ok());
        if !alive {
            self.clients.remove(&connection);
        }
    }

    /// Sends `message` to every client subscribed to `environment`.
    pub(crate) fn broadcast(&mut self, environment: &str, message: &ServerMessage) {
        self.clients.retain(|_, client| {
            !client.environments.contains(environment) || client.outbox.send(message.clone()).is_ok()
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }
}
