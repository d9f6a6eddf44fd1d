use std::{io, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use simple_chat::{
    display::MemoryDisplay,
    message::{read_payload, write_payload},
    server_console::ServerConsole,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};

const WAIT: Duration = Duration::from_secs(2);

struct RunningServer {
    port: u16,
    display: MemoryDisplay,
    operator: mpsc::Sender<io::Result<String>>,
    task: JoinHandle<Result<()>>,
}

impl RunningServer {
    async fn start() -> Result<Self> {
        let display = MemoryDisplay::new();
        let console = ServerConsole::with_display(0, Arc::new(display.clone())).await?;
        let port = console.server().port();
        let (operator, input) = mpsc::channel(8);
        let task = tokio::spawn(console.run(input));

        let server = Self {
            port,
            display,
            operator,
            task,
        };
        server
            .wait_for(&format!("Server listening for connections on port {port}"))
            .await?;
        Ok(server)
    }

    async fn type_line(&self, line: &str) -> Result<()> {
        self.operator
            .send(Ok(line.to_string()))
            .await
            .map_err(|_| anyhow!("server console stopped reading"))
    }

    async fn wait_for(&self, line: &str) -> Result<()> {
        let waited = timeout(WAIT, async {
            while !self.display.contains(line) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        waited.map_err(|_| anyhow!("server never displayed '{line}': {:?}", self.display.lines()))
    }

    async fn quit(self) -> Result<()> {
        self.type_line("#quit").await?;
        timeout(WAIT, self.task).await???;
        Ok(())
    }
}

struct RawClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Connects, logs in and waits for the server to acknowledge the login.
    async fn join(port: u16, login_id: &str) -> Result<Self> {
        let mut client = Self::connect(port).await?;
        client.send(&format!("#login{login_id}")).await?;
        assert_eq!(
            client.next_line().await?.as_deref(),
            Some(format!("{login_id} has logged on.").as_str())
        );
        Ok(client)
    }

    async fn send(&mut self, payload: &str) -> Result<()> {
        write_payload(&mut self.writer, payload).await?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(timeout(WAIT, read_payload(&mut self.lines)).await??)
    }
}

#[tokio::test]
async fn login_and_chat_reach_every_client() -> Result<()> {
    let server = RunningServer::start().await?;

    let mut alice = RawClient::join(server.port, "alice").await?;
    let mut bob = RawClient::join(server.port, "bob").await?;
    assert_eq!(alice.next_line().await?.as_deref(), Some("bob has logged on."));

    bob.send("hi").await?;
    assert_eq!(bob.next_line().await?.as_deref(), Some("bob: hi"));
    assert_eq!(alice.next_line().await?.as_deref(), Some("bob: hi"));

    assert_eq!(server.display.count("alice has logged on."), 1);
    assert!(
        server
            .display
            .lines()
            .iter()
            .any(|line| line.starts_with("Message received: hi from 127.0.0.1:"))
    );

    server.quit().await
}

#[tokio::test]
async fn second_login_closes_the_connection_and_keeps_the_first_id() -> Result<()> {
    let server = RunningServer::start().await?;

    let mut alice = RawClient::join(server.port, "alice").await?;
    alice.send("#loginmallory").await?;

    assert_eq!(alice.next_line().await?, None);
    server.wait_for("alice has disconnected.").await?;
    assert!(!server.display.contains("mallory has logged on."));

    server.quit().await
}

#[tokio::test]
async fn chat_before_login_is_tagged_anonymous() -> Result<()> {
    let server = RunningServer::start().await?;

    let mut stranger = RawClient::connect(server.port).await?;
    stranger.send("anyone there?").await?;

    assert_eq!(
        stranger.next_line().await?.as_deref(),
        Some("anonymous: anyone there?")
    );

    server.quit().await
}

#[tokio::test]
async fn setport_while_listening_keeps_the_port() -> Result<()> {
    let server = RunningServer::start().await?;

    server.type_line("#setport 6000").await?;
    server.wait_for("Server already has an open connection").await?;

    server.type_line("#getport").await?;
    server
        .wait_for(&format!("The port number is: {}", server.port))
        .await?;

    server.quit().await
}

#[tokio::test]
async fn stop_turns_away_new_clients_but_keeps_existing_ones() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut alice = RawClient::join(server.port, "alice").await?;

    server.type_line("#stop").await?;
    server
        .wait_for("Server has stopped listening for connections.")
        .await?;
    assert!(RawClient::connect(server.port).await.is_err());

    alice.send("still here").await?;
    assert_eq!(alice.next_line().await?.as_deref(), Some("alice: still here"));

    server.type_line("#stop").await?;
    server.wait_for("Server has stopped listening").await?;

    server.quit().await
}

#[tokio::test]
async fn operator_text_is_broadcast_with_server_prefix() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut alice = RawClient::join(server.port, "alice").await?;

    server.type_line("maintenance at noon").await?;

    assert_eq!(
        alice.next_line().await?.as_deref(),
        Some("SERVER MSG> maintenance at noon")
    );
    server.wait_for("maintenance at noon").await?;

    server.quit().await
}

#[tokio::test]
async fn close_disconnects_every_client() -> Result<()> {
    let server = RunningServer::start().await?;
    let mut alice = RawClient::join(server.port, "alice").await?;

    server.type_line("#close").await?;

    assert_eq!(alice.next_line().await?, None);
    server.wait_for("Disconnecting all clients...").await?;
    server.wait_for("alice has disconnected.").await?;

    server.quit().await
}

#[tokio::test]
async fn quit_shuts_down_and_disconnects_clients() -> Result<()> {
    let server = RunningServer::start().await?;
    let display = server.display.clone();
    let mut alice = RawClient::join(server.port, "alice").await?;

    server.quit().await?;

    assert_eq!(alice.next_line().await?, None);
    assert!(display.contains("Shutting down server"));
    assert!(display.contains("Server has stopped listening for connections."));
    Ok(())
}
