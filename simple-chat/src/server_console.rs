//! Operator front-end for [`EchoServer`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::select;
use tracing::{info, warn};

use crate::{
    console::ConsoleInput,
    display::{ChatDisplay, StdoutDisplay},
    echo_server::EchoServer,
    message::SERVER_MSG_PREFIX,
};

pub struct ServerConsole {
    server: EchoServer,
    display: Arc<dyn ChatDisplay>,
}

impl ServerConsole {
    /// Creates the server with a stdout display and starts listening on `port`.
    pub async fn start(port: u16) -> Result<Self> {
        Self::with_display(port, Arc::new(StdoutDisplay::with_prefix(SERVER_MSG_PREFIX))).await
    }

    pub async fn with_display(port: u16, display: Arc<dyn ChatDisplay>) -> Result<Self> {
        let mut server = EchoServer::new(port, Arc::clone(&display));
        server
            .listen()
            .await
            .with_context(|| format!("failed to listen on port {port}"))?;
        Ok(Self { server, display })
    }

    pub fn server(&self) -> &EchoServer {
        &self.server
    }

    /// Serves clients and operator input until a command, Ctrl-C or a console
    /// read error ends the session. The server is shut down before returning.
    ///
    /// When `input` runs dry the console keeps serving clients.
    pub async fn run(mut self, mut input: ConsoleInput) -> Result<()> {
        let mut input_open = true;

        loop {
            select! {
                line = input.recv(), if input_open => match line {
                    Some(Ok(line)) => {
                        if self.server.handle_ui_input(&line).await.is_shutdown() {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        warn!(?error, "failed to read operator input");
                        self.display.display("Unexpected error while reading from console!");
                        break;
                    }
                    None => {
                        info!("operator input closed; still serving clients");
                        input_open = false;
                    }
                },
                Some(event) = self.server.next_event() => {
                    self.server.handle_event(event).await;
                }
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(error) = ctrl_c {
                        warn!(?error, "ctrl-c handler failed");
                    }
                    break;
                }
            }
        }

        self.server.shutdown().await;
        self.drain_events().await;
        Ok(())
    }

    /// Shows whatever the shutdown itself produced, such as the stop notice.
    async fn drain_events(&mut self) {
        while let Some(event) = self.server.try_next_event() {
            self.server.handle_event(event).await;
        }
    }
}
