//! Terminal front-end for [`ChatClient`].

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tracing::{info, warn};

use crate::{
    chat_client::ChatClient,
    console::ConsoleInput,
    display::{ChatDisplay, StdoutDisplay},
};

pub struct ClientConsole {
    client: ChatClient,
    display: Arc<dyn ChatDisplay>,
}

impl ClientConsole {
    /// Connects with a stdout display that prints server text unchanged.
    pub async fn connect(login_id: &str, host: &str, port: u16) -> Result<Self> {
        Self::with_display(login_id, host, port, Arc::new(StdoutDisplay::new())).await
    }

    pub async fn with_display(
        login_id: &str,
        host: &str,
        port: u16,
        display: Arc<dyn ChatDisplay>,
    ) -> Result<Self> {
        let client = ChatClient::connect(login_id, host, port, Arc::clone(&display)).await?;
        Ok(Self { client, display })
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Relays user input and server messages until the client quits.
    pub async fn run(mut self, mut input: ConsoleInput) -> Result<()> {
        loop {
            select! {
                line = input.recv() => match line {
                    Some(Ok(line)) => {
                        if self.client.handle_ui_input(&line).await.is_shutdown() {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        warn!(?error, "failed to read user input");
                        self.display.display("Unexpected error while reading from console!");
                        self.client.quit().await;
                        break;
                    }
                    None => {
                        info!("user input closed; leaving chat");
                        self.client.quit().await;
                        break;
                    }
                },
                Some(event) = self.client.next_event() => {
                    if self.client.handle_event(event).await.is_shutdown() {
                        break;
                    }
                }
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(error) = ctrl_c {
                        warn!(?error, "ctrl-c handler failed");
                    }
                    self.client.quit().await;
                    break;
                }
            }
        }
        Ok(())
    }
}
