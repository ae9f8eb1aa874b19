//! The hosting side of a session: a TCP listener and one pair of tasks per accepted connection.
//!
//! For every connection we spawn
//! - a **receive task**, that turns incoming lines into [`ClientRequest`]s for the engine and reports a
//!   vanished peer as `abandoned`,
//! - a **send task**, that drains the outbound queue of the connection and writes it to the socket.
//!
//! When either task completes, the other one is aborted and the connection is removed from the
//! registry. The session itself never interprets the game, it only routes lines.

use crate::config::EngineConfig;
use crate::line_io::{ConnectionEnd, write_line};
use crate::requests::{ClientRequest, Outbound, RemoteRequest, ReplyHandle};
use crate::role_map::ConnectionId;
use protocol::{CHANNEL_BUFFER_SIZE, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// The outbound queues of all live connections.
#[derive(Clone, Default)]
struct Registry {
    connections: Arc<Mutex<HashMap<ConnectionId, mpsc::Sender<Outbound>>>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<Outbound>>> {
        // A panic while holding the lock leaves the map itself intact.
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn senders(&self) -> Vec<(ConnectionId, mpsc::Sender<Outbound>)> {
        self.lock()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }
}

/// A running hosting session.
pub struct ServerSession {
    generation: u64,
    local_addr: SocketAddr,
    registry: Registry,
    stop: watch::Sender<bool>,
}

impl ServerSession {
    /// Binds the listener and spawns the accept loop. Binding happens synchronously, so a port that is in
    /// use gets reported right here and the caller can keep its current mode.
    pub fn start(
        config: &EngineConfig,
        generation: u64,
        to_engine: mpsc::Sender<ClientRequest>,
    ) -> std::io::Result<ServerSession> {
        let std_listener =
            std::net::TcpListener::bind((config.bind_address.as_str(), config.port))?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let registry = Registry::default();
        let (stop, stop_receiver) = watch::channel(false);
        tokio::spawn(accept_loop(
            listener,
            generation,
            registry.clone(),
            to_engine,
            stop_receiver,
        ));
        tracing::info!(%local_addr, generation, "Server listening.");

        Ok(ServerSession {
            generation,
            local_addr,
            registry,
            stop,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn connected_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// The addresses clients can use to reach us. For a wildcard bind we list the loopback address and the
    /// address of the interface that carries the default route.
    pub fn local_addresses(&self) -> Vec<IpAddr> {
        let ip = self.local_addr.ip();
        if !ip.is_unspecified() {
            return vec![ip];
        }
        let mut addresses = Vec::new();
        if let Some(outbound) = default_route_address() {
            addresses.push(outbound);
        }
        addresses.push(IpAddr::V4(Ipv4Addr::LOCALHOST));
        addresses
    }

    /// Queues the message on every live connection. Never waits, a full queue drops the message.
    pub fn push_state_to_all(&self, message: &ServerMessage) {
        for (id, sender) in self.registry.senders() {
            ReplyHandle::new(id, sender).send(Outbound::Line(message.clone()));
        }
    }

    /// Stops accepting and asks all connections to close.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
        for (id, sender) in self.registry.senders() {
            match sender.try_send(Outbound::Shutdown) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(connection = %id, "Queue full, delivering shutdown later.");
                    tokio::spawn(async move {
                        let _ = sender.send(Outbound::Shutdown).await;
                    });
                }
            }
        }
        tracing::info!(generation = self.generation, "Server session shut down.");
    }
}

/// Finds the local address used for outbound traffic. Connecting a UDP socket sends no packet.
fn default_route_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

async fn accept_loop(
    listener: TcpListener,
    generation: u64,
    registry: Registry,
    to_engine: mpsc::Sender<ClientRequest>,
    mut stop: watch::Receiver<bool>,
) {
    let mut serial = 0;
    loop {
        tokio::select! {
            _ = stop.changed() => {
                // This is the regular way out, not an error.
                tracing::debug!(generation, "Listener closed.");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    serial += 1;
                    let id = ConnectionId { session: generation, serial };
                    let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
                    registry.lock().insert(id, sender.clone());
                    tracing::info!(connection = %id, %peer, "Client connected.");
                    tokio::spawn(handle_connection(
                        stream,
                        ReplyHandle::new(id, sender),
                        receiver,
                        to_engine.clone(),
                        registry.clone(),
                    ));
                }
                Err(err) => {
                    tracing::warn!(?err, "Accepting a connection failed.");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

/// Runs the paired tasks of one connection until either of them ends, then cleans up.
async fn handle_connection(
    stream: TcpStream,
    reply: ReplyHandle,
    outbound: mpsc::Receiver<Outbound>,
    to_engine: mpsc::Sender<ClientRequest>,
    registry: Registry,
) {
    let id = reply.id();
    let (read_half, write_half) = stream.into_split();

    let receive_reply = reply.clone();
    let receive_engine = to_engine.clone();
    let mut receive_task =
        tokio::spawn(async move { receive_logic(read_half, receive_reply, receive_engine).await });
    let mut send_task = tokio::spawn(async move { send_logic(write_half, outbound).await });

    // If any one of the tasks run to completion, we abort the other.
    let result = tokio::select! {
        res_a = &mut send_task => {receive_task.abort(); res_a},
        res_b = &mut receive_task => {send_task.abort(); res_b},
    };
    registry.lock().remove(&id);

    let end = result.unwrap_or_else(|err| {
        tracing::error!(?err, connection = %id, "Internal panic in connection handling.");
        ConnectionEnd::WriteFailed
    });
    tracing::info!(connection = %id, ?end, "Client connection closed.");

    if end == ConnectionEnd::WriteFailed {
        let abandoned = ClientRequest {
            request: RemoteRequest::Message(ClientMessage::Abandoned),
            reply: Some(reply),
        };
        if to_engine.send(abandoned).await.is_err() {
            tracing::debug!(connection = %id, "Engine gone, abandonment not delivered.");
        }
    }
}

/// Reads lines from the client and hands them over to the engine.
async fn receive_logic(
    read_half: OwnedReadHalf,
    reply: ReplyHandle,
    to_engine: mpsc::Sender<ClientRequest>,
) -> ConnectionEnd {
    let id = reply.id();
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(?err, connection = %id, "Reading from client failed.");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match line.parse::<ClientMessage>() {
            Ok(message) => RemoteRequest::Message(message),
            Err(err) => {
                tracing::warn!(?err, connection = %id, "Malformed line from client.");
                RemoteRequest::Invalid(line)
            }
        };
        let leaving = matches!(
            request,
            RemoteRequest::Message(ClientMessage::Shutdown | ClientMessage::Abandoned)
        );
        let forwarded = ClientRequest {
            request,
            reply: Some(reply.clone()),
        };
        if to_engine.send(forwarded).await.is_err() {
            tracing::error!(connection = %id, "Engine channel closed.");
            return ConnectionEnd::EngineGone;
        }
        if leaving {
            return ConnectionEnd::PeerLeft;
        }
    }

    // The peer vanished without saying goodbye.
    let abandoned = ClientRequest {
        request: RemoteRequest::Message(ClientMessage::Abandoned),
        reply: Some(reply),
    };
    if to_engine.send(abandoned).await.is_err() {
        return ConnectionEnd::EngineGone;
    }
    ConnectionEnd::PeerLeft
}

/// Drains the outbound queue of the connection.
async fn send_logic(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Outbound>,
) -> ConnectionEnd {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Line(message) => {
                if let Err(err) = write_line(&mut write_half, &message.to_string()).await {
                    tracing::warn!(?err, "Writing to client failed.");
                    return ConnectionEnd::WriteFailed;
                }
            }
            Outbound::Shutdown => {
                let _ = write_line(&mut write_half, &ServerMessage::Shutdown.to_string()).await;
                let _ = write_half.shutdown().await;
                return ConnectionEnd::Released;
            }
            Outbound::Abandoned => {
                let _ = write_half.shutdown().await;
                return ConnectionEnd::Released;
            }
        }
    }
    ConnectionEnd::Released
}
