//! Chat server core: login bookkeeping, message routing and operator commands.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    command::{Control, ServerCommand, is_command},
    display::ChatDisplay,
    message::{ANONYMOUS, chat_line, logged_on, operator_broadcast, parse_login},
    transport::{ConnectionId, ConnectionInfo, ServerEvent, ServerTransport},
};

/// Per-connection state the server keeps.
#[derive(Debug, Clone)]
pub struct Session {
    pub info: ConnectionInfo,
    /// Set once by the first `#login`, never overwritten.
    pub login_id: Option<String>,
}

impl Session {
    fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            login_id: None,
        }
    }

    fn name(&self) -> &str {
        self.login_id.as_deref().unwrap_or(ANONYMOUS)
    }
}

pub struct EchoServer {
    transport: ServerTransport,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    sessions: HashMap<ConnectionId, Session>,
    display: Arc<dyn ChatDisplay>,
}

impl EchoServer {
    /// Creates a server for `port`. Listening starts only when asked to.
    pub fn new(port: u16, display: Arc<dyn ChatDisplay>) -> Self {
        let (transport, events) = ServerTransport::new(port);
        Self {
            transport,
            events,
            sessions: HashMap::new(),
            display,
        }
    }

    pub async fn listen(&mut self) -> std::io::Result<()> {
        self.transport.listen().await
    }

    pub fn is_listening(&self) -> bool {
        self.transport.is_listening()
    }

    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn session(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn login_id(&self, id: ConnectionId) -> Option<&str> {
        self.sessions.get(&id)?.login_id.as_deref()
    }

    /// Waits for the next transport event.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Returns an already queued transport event without waiting.
    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        self.events.try_recv().ok()
    }

    pub async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Started { port } => {
                self.display
                    .display(&format!("Server listening for connections on port {port}"));
            }
            ServerEvent::Stopped => {
                self.display
                    .display("Server has stopped listening for connections.");
            }
            ServerEvent::ClientConnected(info) => {
                self.display
                    .display(&format!("A new client has connected from {info}"));
                self.sessions.insert(info.id, Session::new(info));
            }
            ServerEvent::ClientMessage {
                connection,
                payload,
            } => {
                self.handle_message_from_client(&payload, &connection).await;
            }
            ServerEvent::ClientException { connection, error } => {
                warn!(connection = connection.id, ?error, "client connection failed");
            }
            ServerEvent::ClientDisconnected(info) => {
                let session = self
                    .sessions
                    .remove(&info.id)
                    .unwrap_or_else(|| Session::new(info));
                self.display
                    .display(&format!("{} has disconnected.", session.name()));
            }
        }
    }

    pub async fn handle_message_from_client(&mut self, payload: &str, connection: &ConnectionInfo) {
        self.display
            .display(&format!("Message received: {payload} from {connection}"));

        let session = self
            .sessions
            .entry(connection.id)
            .or_insert_with(|| Session::new(connection.clone()));

        let Some(requested) = parse_login(payload) else {
            let line = chat_line(session.login_id.as_deref(), payload);
            self.transport.send_to_all_clients(&line);
            return;
        };

        if let Some(current) = &session.login_id {
            self.display.display(&format!(
                "Error: {connection} is already logged in as {current}; closing connection"
            ));
            warn!(connection = connection.id, %current, requested, "duplicate login");
            self.transport.close_connection(connection.id).await;
            return;
        }

        if requested.is_empty() {
            self.display.display(&format!(
                "Login rejected from {connection}: missing login id"
            ));
            return;
        }

        info!(connection = connection.id, login_id = requested, "client logged on");
        session.login_id = Some(requested.to_string());
        let announcement = logged_on(requested);
        self.display.display(&announcement);
        self.transport.send_to_all_clients(&announcement);
    }

    /// Handles one line typed by the operator.
    pub async fn handle_ui_input(&mut self, line: &str) -> Control {
        if line.is_empty() {
            return Control::Continue;
        }
        if is_command(line) {
            return self.handle_command(line).await;
        }

        self.display.display(line);
        self.transport.send_to_all_clients(&operator_broadcast(line));
        Control::Continue
    }

    /// Runs an operator command.
    pub async fn handle_command(&mut self, line: &str) -> Control {
        if !is_command(line) {
            self.display.display("Error - Invalid command");
            return Control::Continue;
        }

        let command = match ServerCommand::parse(line) {
            Ok(command) => command,
            Err(err) => {
                self.display.display(&err.to_string());
                return Control::Continue;
            }
        };
        debug!(?command, "operator command");

        match command {
            ServerCommand::Quit => {
                self.display.display("Shutting down server");
                return Control::Shutdown;
            }
            ServerCommand::Stop => {
                if self.is_listening() {
                    self.transport.stop_listening().await;
                } else {
                    self.display.display("Server has stopped listening");
                }
            }
            ServerCommand::Close => {
                if self.is_listening() {
                    self.transport.stop_listening().await;
                    self.display.display("Disconnecting all clients...");
                    self.transport.close_all_connections().await;
                }
            }
            ServerCommand::SetPort(port) => {
                if self.is_listening() {
                    self.display.display("Server already has an open connection");
                } else {
                    self.transport.set_port(port);
                    self.display
                        .display(&format!("The port number has been updated to {port}"));
                }
            }
            ServerCommand::Start => {
                if self.is_listening() {
                    self.display
                        .display("Server already running... listening for connections");
                } else if let Err(error) = self.listen().await {
                    warn!(?error, "failed to start listening");
                    self.display.display(&format!(
                        "Could not listen on port {}: {error}",
                        self.port()
                    ));
                }
            }
            ServerCommand::GetPort => {
                if self.is_listening() {
                    self.display
                        .display(&format!("The port number is: {}", self.port()));
                } else {
                    self.display.display("Server currently not listening");
                }
            }
        }
        Control::Continue
    }

    /// Stops listening and closes every connection.
    pub async fn shutdown(&mut self) {
        info!("server shutting down");
        self.transport.close().await;
    }
}
