use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::message::{read_payload, write_payload};

/// What the reader task of a [`ClientConnection`] observed.
///
/// `generation` identifies the connection the event came from, so events
/// from a connection that has since been replaced can be told apart.
#[derive(Debug)]
pub enum ClientEvent {
    ServerMessage {
        generation: u64,
        payload: String,
    },
    /// The server closed the stream (`error` is `None`) or reading failed.
    ConnectionLost {
        generation: u64,
        error: Option<io::Error>,
    },
}

impl ClientEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ClientEvent::ServerMessage { generation, .. }
            | ClientEvent::ConnectionLost { generation, .. } => *generation,
        }
    }
}

/// One open connection from a chat client to the server.
pub struct ClientConnection {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    peer: SocketAddr,
}

impl ClientConnection {
    /// Connects and starts forwarding inbound payloads to `events`.
    pub async fn open(
        host: &str,
        port: u16,
        generation: u64,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        info!(%peer, generation, "connected to server");
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match read_payload(&mut lines).await {
                    Ok(Some(payload)) => {
                        let event = ClientEvent::ServerMessage {
                            generation,
                            payload,
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(generation, "server closed the connection");
                        let _ = events.send(ClientEvent::ConnectionLost {
                            generation,
                            error: None,
                        });
                        break;
                    }
                    Err(error) => {
                        let _ = events.send(ClientEvent::ConnectionLost {
                            generation,
                            error: Some(error),
                        });
                        break;
                    }
                }
            }
        });

        Ok(Self {
            writer,
            reader,
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&mut self, payload: &str) -> io::Result<()> {
        write_payload(&mut self.writer, payload).await
    }

    /// Stops the reader first so a locally closed connection is never reported as lost.
    pub async fn close(mut self) -> io::Result<()> {
        self.reader.abort();
        info!(peer = %self.peer, "closing connection to server");
        self.writer.shutdown().await
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
