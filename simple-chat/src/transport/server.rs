use std::{
    collections::HashMap,
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::{Mutex, broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::message::{read_payload, write_payload};

const BIND_HOST: &str = "0.0.0.0";

pub type ConnectionId = u64;

/// Identity of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer)
    }
}

/// Everything the server transport reports to its owner, in the order it happened.
#[derive(Debug)]
pub enum ServerEvent {
    Started { port: u16 },
    Stopped,
    ClientConnected(ConnectionInfo),
    ClientMessage {
        connection: ConnectionInfo,
        payload: String,
    },
    ClientException {
        connection: ConnectionInfo,
        error: io::Error,
    },
    ClientDisconnected(ConnectionInfo),
}

/// Listening side of the chat: accepts clients, fans payloads out to all of
/// them and closes individual connections on request.
///
/// Events are delivered through the receiver returned by [`ServerTransport::new`].
pub struct ServerTransport {
    port: u16,
    listener: Option<ListenerTask>,
    shared: Arc<Shared>,
}

struct ListenerTask {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ServerTransport {
    pub fn new(port: u16) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            port,
            listener: None,
            shared: Arc::new(Shared::new(events)),
        };
        (transport, events_rx)
    }

    /// Configured port, or the bound port once listening has started.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|listener| listener.local_addr)
    }

    /// Binds the configured port and starts accepting clients.
    ///
    /// Does nothing when already listening.
    pub async fn listen(&mut self) -> io::Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind((BIND_HOST, self.port)).await?;
        let local_addr = listener.local_addr()?;
        self.port = local_addr.port();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            shutdown_rx,
        ));
        self.listener = Some(ListenerTask {
            local_addr,
            shutdown,
            handle,
        });

        info!(%local_addr, "listening for connections");
        self.shared.emit(ServerEvent::Started { port: self.port });
        Ok(())
    }

    /// Stops accepting new clients. Connected clients are left alone.
    pub async fn stop_listening(&mut self) {
        let Some(ListenerTask {
            local_addr,
            shutdown,
            handle,
        }) = self.listener.take()
        else {
            return;
        };

        let _ = shutdown.send(());
        if let Err(error) = handle.await {
            warn!(?error, "accept loop ended abnormally");
        }

        info!(%local_addr, "stopped listening");
        self.shared.emit(ServerEvent::Stopped);
    }

    /// Stops listening, then closes every connected client.
    pub async fn close(&mut self) {
        self.stop_listening().await;
        self.close_all_connections().await;
    }

    /// Queues `payload` for every connected client. Delivery failures are not reported.
    pub fn send_to_all_clients(&self, payload: &str) {
        self.shared.broadcast(payload);
    }

    /// Closes one connection and waits for its task to finish.
    ///
    /// Returns `false` if no such connection is open.
    pub async fn close_connection(&self, id: ConnectionId) -> bool {
        let slot = self.shared.connections.lock().await.remove(&id);
        match slot {
            Some(slot) => {
                slot.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all_connections(&self) {
        let slots: Vec<ConnectionSlot> = self
            .shared
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        if !slots.is_empty() {
            info!(count = slots.len(), "closing all connections");
        }
        for slot in slots {
            slot.close().await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.connections.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<String> {
        self.shared.broadcaster.subscribe()
    }
}

struct Shared {
    connections: Mutex<HashMap<ConnectionId, ConnectionSlot>>,
    broadcaster: broadcast::Sender<String>,
    events: mpsc::UnboundedSender<ServerEvent>,
    next_id: AtomicU64,
}

struct ConnectionSlot {
    close: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ConnectionSlot {
    async fn close(self) {
        let _ = self.close.send(());
        if let Err(error) = self.task.await {
            warn!(?error, "connection task ended abnormally");
        }
    }
}

impl Shared {
    fn new(events: mpsc::UnboundedSender<ServerEvent>) -> Self {
        // Broadcast channel buffers a modest number of payloads before slow clients start lagging.
        let (broadcaster, _) = broadcast::channel(128);
        Self {
            connections: Mutex::new(HashMap::new()),
            broadcaster,
            events,
            next_id: AtomicU64::new(1),
        }
    }

    fn emit(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            debug!("server event dropped; nobody is listening");
        }
    }

    fn broadcast(&self, payload: &str) {
        // An error only means nobody is connected right now.
        if self.broadcaster.send(payload.to_string()).is_err() {
            debug!("broadcast with no connected clients");
        }
    }

    async fn register(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let info = ConnectionInfo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            peer,
        };
        let inbox = self.broadcaster.subscribe();
        let (close, close_rx) = oneshot::channel();

        info!(connection = info.id, %peer, "client connected");
        self.emit(ServerEvent::ClientConnected(info.clone()));

        // Hold the lock across the spawn so the task cannot deregister before it is registered.
        let mut connections = self.connections.lock().await;
        let task = tokio::spawn(run_connection(
            stream,
            info.clone(),
            inbox,
            close_rx,
            Arc::clone(self),
        ));
        connections.insert(info.id, ConnectionSlot { close, task });
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => shared.register(stream, peer).await,
                Err(error) => warn!(?error, "failed to accept connection"),
            }
        }
    }
    debug!("accept loop finished");
}

async fn run_connection(
    stream: TcpStream,
    info: ConnectionInfo,
    mut inbox: broadcast::Receiver<String>,
    mut close: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        select! {
            _ = &mut close => {
                debug!(connection = info.id, "closing connection on request");
                break;
            }
            inbound = read_payload(&mut lines) => match inbound {
                Ok(Some(payload)) => {
                    debug!(connection = info.id, %payload, "payload from client");
                    shared.emit(ServerEvent::ClientMessage {
                        connection: info.clone(),
                        payload,
                    });
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(connection = info.id, ?error, "failed to read from client");
                    shared.emit(ServerEvent::ClientException {
                        connection: info.clone(),
                        error,
                    });
                    break;
                }
            },
            outbound = inbox.recv() => {
                // A peer that stops reading can stall the write indefinitely.
                let delivered = select! {
                    _ = &mut close => {
                        debug!(connection = info.id, "closing connection during delivery");
                        false
                    }
                    delivered = deliver(outbound, &mut writer, &info) => delivered,
                };
                if !delivered {
                    break;
                }
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        debug!(connection = info.id, ?error, "failed to shut down client writer cleanly");
    }
    shared.connections.lock().await.remove(&info.id);

    info!(connection = info.id, peer = %info.peer, "client disconnected");
    shared.emit(ServerEvent::ClientDisconnected(info));
}

async fn deliver(
    outbound: Result<String, broadcast::error::RecvError>,
    writer: &mut OwnedWriteHalf,
    info: &ConnectionInfo,
) -> bool {
    match outbound {
        Ok(payload) => match write_payload(writer, &payload).await {
            Ok(()) => true,
            Err(error) => {
                debug!(connection = info.id, ?error, "failed to deliver payload to client");
                false
            }
        },
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(connection = info.id, skipped, "client fell behind; broadcasts dropped");
            true
        }
        Err(broadcast::error::RecvError::Closed) => false,
    }
}
