//! Chat client core: user commands, the login handshake and server rendering.

use std::{io, sync::Arc};

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    command::{ClientCommand, Control, is_command},
    display::ChatDisplay,
    message::{login_greeting, sanitize_login_id},
    transport::{ClientConnection, ClientEvent},
};

const SEND_FAILED: &str = "Could not send message to server.  Terminating client.";
const LOGIN_FAILED: &str = "Could not log in to the server.  Terminating client.";
const EMPTY_LOGIN_ID: &str = "A login id is required.  Terminating client.";

pub struct ChatClient {
    login_id: String,
    host: String,
    port: u16,
    display: Arc<dyn ChatDisplay>,
    connection: Option<ClientConnection>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl ChatClient {
    /// Connects to `host:port` and logs in as `login_id`.
    ///
    /// Any literal `#login` inside `login_id` is removed first. An id that is
    /// blank after that is refused before any connection is made.
    pub async fn connect(
        login_id: &str,
        host: &str,
        port: u16,
        display: Arc<dyn ChatDisplay>,
    ) -> Result<Self> {
        let mut client = Self::new(login_id, host, port, display);
        if client.login_id.trim().is_empty() {
            client.display.display(EMPTY_LOGIN_ID);
            bail!("login id {login_id:?} is empty once #login is removed");
        }
        client
            .open_connection()
            .await
            .with_context(|| format!("could not connect to {host}:{port}"))?;
        if let Err(err) = client.connection_established().await {
            client.display.display(LOGIN_FAILED);
            return Err(err).context("failed to send login greeting");
        }
        Ok(client)
    }

    fn new(login_id: &str, host: &str, port: u16, display: Arc<dyn ChatDisplay>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            login_id: sanitize_login_id(login_id),
            host: host.to_string(),
            port,
            display,
            connection: None,
            generation: 0,
            events_tx,
            events,
        }
    }

    pub fn login_id(&self) -> &str {
        &self.login_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Waits for the next event from the server connection.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Control {
        if event.generation() != self.generation || !self.is_connected() {
            debug!(?event, "ignoring event from a closed connection");
            return Control::Continue;
        }

        match event {
            ClientEvent::ServerMessage { payload, .. } => {
                self.handle_message_from_server(&payload);
                Control::Continue
            }
            ClientEvent::ConnectionLost { error, .. } => {
                if let Some(error) = error {
                    warn!(?error, "lost connection to server");
                }
                self.display.display("The server has shut down");
                self.quit().await
            }
        }
    }

    pub fn handle_message_from_server(&self, payload: &str) {
        self.display.display(payload);
    }

    /// Handles one line typed by the user.
    pub async fn handle_ui_input(&mut self, line: &str) -> Control {
        if line.is_empty() {
            return Control::Continue;
        }
        if is_command(line) {
            return self.handle_command(line).await;
        }

        if let Err(error) = self.send_to_server(line).await {
            warn!(?error, "failed to send message");
            self.display.display(SEND_FAILED);
            return self.quit().await;
        }
        Control::Continue
    }

    async fn handle_command(&mut self, line: &str) -> Control {
        let command = match ClientCommand::parse(line) {
            Ok(command) => command,
            Err(err) => {
                self.display.display(&err.to_string());
                return Control::Continue;
            }
        };
        debug!(?command, "client command");

        match command {
            ClientCommand::Quit => return self.quit().await,
            ClientCommand::Logoff => match self.close_connection().await {
                Ok(()) => self.display.display("Connection closed"),
                Err(error) => {
                    warn!(?error, "failed to close connection");
                    self.display.display("Error logging out");
                }
            },
            ClientCommand::SetHost(host) => {
                if self.is_connected() {
                    self.display.display("You are already connected!");
                } else {
                    self.display
                        .display(&format!("The host name has been updated to {host}"));
                    self.host = host;
                }
            }
            ClientCommand::SetPort(port) => {
                if self.is_connected() {
                    self.display.display("You are already connected!");
                } else {
                    self.port = port;
                    self.display
                        .display(&format!("The port number has been updated to {port}"));
                }
            }
            ClientCommand::Login => return self.login().await,
            ClientCommand::GetHost => {
                self.display
                    .display(&format!("The host name is: {}", self.host));
            }
            ClientCommand::GetPort => {
                self.display
                    .display(&format!("The port number is: {}", self.port));
            }
        }
        Control::Continue
    }

    async fn login(&mut self) -> Control {
        if self.is_connected() {
            self.display.display(&format!(
                "You are already connected to {} on port {}",
                self.host, self.port
            ));
            return Control::Continue;
        }

        if let Err(error) = self.open_connection().await {
            warn!(?error, host = %self.host, port = self.port, "failed to connect");
            self.display.display(&format!(
                "Could not connect to {}:{}",
                self.host, self.port
            ));
            return Control::Continue;
        }

        if let Err(error) = self.connection_established().await {
            warn!(?error, "failed to send login greeting");
            self.display.display(LOGIN_FAILED);
            return self.quit().await;
        }
        Control::Continue
    }

    /// Closes the connection, ignoring close errors, and asks the console to exit.
    pub async fn quit(&mut self) -> Control {
        if let Err(error) = self.close_connection().await {
            debug!(?error, "ignoring close error while quitting");
        }
        Control::Shutdown
    }

    async fn open_connection(&mut self) -> io::Result<()> {
        let generation = self.generation + 1;
        let connection =
            ClientConnection::open(&self.host, self.port, generation, self.events_tx.clone())
                .await?;
        self.generation = generation;
        self.connection = Some(connection);
        Ok(())
    }

    async fn connection_established(&mut self) -> io::Result<()> {
        info!(login_id = %self.login_id, "logging in");
        let greeting = login_greeting(&self.login_id);
        self.send_to_server(&greeting).await
    }

    async fn send_to_server(&mut self, payload: &str) -> io::Result<()> {
        match self.connection.as_mut() {
            Some(connection) => connection.send(payload).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected to a server",
            )),
        }
    }

    async fn close_connection(&mut self) -> io::Result<()> {
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemoryDisplay;

    fn offline_client(login_id: &str) -> (ChatClient, MemoryDisplay) {
        let display = MemoryDisplay::new();
        let client = ChatClient::new(login_id, "localhost", 5555, Arc::new(display.clone()));
        (client, display)
    }

    #[test]
    fn login_id_is_sanitized() {
        let (client, _display) = offline_client("#loginalice");
        assert_eq!(client.login_id(), "alice");
    }

    #[tokio::test]
    async fn blank_login_id_is_refused_before_connecting() {
        let display = MemoryDisplay::new();

        let result = ChatClient::connect("#login", "127.0.0.1", 1, Arc::new(display.clone())).await;

        assert!(result.is_err());
        assert_eq!(display.lines(), vec![EMPTY_LOGIN_ID]);
    }

    #[tokio::test]
    async fn host_and_port_change_while_disconnected() {
        let (mut client, display) = offline_client("alice");

        assert_eq!(client.handle_ui_input("#sethost example.org").await, Control::Continue);
        assert_eq!(client.handle_ui_input("#setport 6000").await, Control::Continue);

        assert_eq!(client.host(), "example.org");
        assert_eq!(client.port(), 6000);
        assert_eq!(
            display.lines(),
            vec![
                "The host name has been updated to example.org",
                "The port number has been updated to 6000",
            ]
        );
    }

    #[tokio::test]
    async fn malformed_arguments_leave_state_alone() {
        let (mut client, display) = offline_client("alice");

        client.handle_ui_input("#setport many").await;
        client.handle_ui_input("#sethost").await;

        assert_eq!(client.port(), 5555);
        assert_eq!(client.host(), "localhost");
        assert_eq!(
            display.lines(),
            vec!["Invalid port: many", "#sethost requires an argument"]
        );
    }

    #[tokio::test]
    async fn getters_display_current_settings() {
        let (mut client, display) = offline_client("alice");

        client.handle_ui_input("#gethost").await;
        client.handle_ui_input("#getport").await;

        assert_eq!(
            display.lines(),
            vec!["The host name is: localhost", "The port number is: 5555"]
        );
    }

    #[tokio::test]
    async fn unknown_command_is_reported_verbatim() {
        let (mut client, display) = offline_client("alice");

        assert_eq!(client.handle_ui_input("#shout hello").await, Control::Continue);
        assert_eq!(display.lines(), vec!["Invalid command: #shout hello"]);
    }

    #[tokio::test]
    async fn sending_while_disconnected_terminates() {
        let (mut client, display) = offline_client("alice");

        assert_eq!(client.handle_ui_input("hello").await, Control::Shutdown);
        assert_eq!(display.lines(), vec![SEND_FAILED]);
    }

    #[tokio::test]
    async fn quit_and_logoff_without_a_connection() {
        let (mut client, display) = offline_client("alice");

        assert_eq!(client.handle_ui_input("#logoff").await, Control::Continue);
        assert_eq!(client.handle_ui_input("#quit").await, Control::Shutdown);
        assert_eq!(display.lines(), vec!["Connection closed"]);
    }

    #[tokio::test]
    async fn events_from_an_old_connection_are_ignored() {
        let (mut client, display) = offline_client("alice");

        let control = client
            .handle_event(ClientEvent::ConnectionLost {
                generation: 7,
                error: None,
            })
            .await;

        assert_eq!(control, Control::Continue);
        assert!(display.lines().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_ignored() {
        let (mut client, display) = offline_client("alice");

        assert_eq!(client.handle_ui_input("").await, Control::Continue);
        assert!(display.lines().is_empty());
    }
}
