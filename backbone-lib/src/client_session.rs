//! The joining side of a session: one outbound TCP connection to a hosting engine.
//!
//! Connecting happens in the background, the engine learns about the result over its server feed. A
//! standing connection is driven by a send task draining the [`ClientLink`] queue and a receive task that
//! turns lines into [`ServerEvent`]s. Every event is stamped with the generation of the connection
//! attempt, so the engine can drop whatever arrives from an attempt it gave up on.

use crate::line_io::{ConnectionEnd, write_line};
use protocol::{CHANNEL_BUFFER_SIZE, ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// What the send task of a client connection gets told.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientOutbound {
    Send(ClientMessage),
    /// Say goodbye and close.
    Shutdown,
}

/// The engine side of a standing connection to a host.
#[derive(Clone, Debug)]
pub struct ClientLink {
    generation: u64,
    peer: SocketAddr,
    outbound: mpsc::Sender<ClientOutbound>,
}

impl ClientLink {
    pub fn new(
        generation: u64,
        peer: SocketAddr,
        outbound: mpsc::Sender<ClientOutbound>,
    ) -> ClientLink {
        ClientLink {
            generation,
            peer,
            outbound,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a message for the host without waiting. Returns false if it got dropped.
    pub fn send(&self, message: ClientMessage) -> bool {
        match self.outbound.try_send(ClientOutbound::Send(message)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(?err, peer = %self.peer, "Message to host dropped.");
                false
            }
        }
    }

    /// Closes the connection, telling the host first.
    pub fn shutdown(&self) {
        match self.outbound.try_send(ClientOutbound::Shutdown) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    let _ = outbound.send(ClientOutbound::Shutdown).await;
                });
            }
        }
    }
}

/// Events of a client connection, as they show up in the engine.
#[derive(Debug)]
pub enum ServerEvent {
    /// The connection stands, messages can be sent over the link.
    Connected(ClientLink),
    /// The connection attempt failed or timed out.
    ConnectFailed(String),
    Message(ServerMessage),
    /// A line from the host we could not parse.
    Malformed(String),
    /// The connection is gone.
    Abandoned,
}

#[derive(Debug)]
pub struct ServerFeed {
    pub generation: u64,
    pub event: ServerEvent,
}

/// Splits `host:port` or `[v6]:port`. Without a port the default is used.
pub fn split_address(address: &str, default_port: u16) -> (String, u16) {
    let address = address.trim();
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return (socket.ip().to_string(), socket.port());
    }
    if let Some((host, port)) = address.rsplit_once(':') {
        if !host.is_empty() && !host.contains(':') {
            if let Ok(port) = port.parse::<u16>() {
                return (host.to_string(), port);
            }
        }
    }
    let host = address.trim_start_matches('[').trim_end_matches(']');
    (host.to_string(), default_port)
}

/// Starts a connection attempt in the background. The outcome arrives on the feed.
pub fn spawn_connect(
    host: String,
    port: u16,
    timeout: Duration,
    generation: u64,
    feed: mpsc::Sender<ServerFeed>,
) {
    tokio::spawn(async move { run_connection(host, port, timeout, generation, feed).await });
}

async fn run_connection(
    host: String,
    port: u16,
    timeout: Duration,
    generation: u64,
    feed: mpsc::Sender<ServerFeed>,
) {
    let report = |event| ServerFeed { generation, event };

    let connected = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await;
    let stream = match connected {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            tracing::warn!(?err, %host, port, "Connecting to host failed.");
            let _ = feed.send(report(ServerEvent::ConnectFailed(err.to_string()))).await;
            return;
        }
        Err(_) => {
            tracing::warn!(%host, port, "Connecting to host timed out.");
            let reason = format!("connection to {host}:{port} timed out");
            let _ = feed.send(report(ServerEvent::ConnectFailed(reason))).await;
            return;
        }
    };
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(err) => {
            let _ = feed.send(report(ServerEvent::ConnectFailed(err.to_string()))).await;
            return;
        }
    };
    tracing::info!(%peer, generation, "Connected to host.");

    let (outbound_sender, outbound) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let link = ClientLink::new(generation, peer, outbound_sender);
    if feed.send(report(ServerEvent::Connected(link))).await.is_err() {
        return;
    }

    let (read_half, write_half) = stream.into_split();
    let receive_feed = feed.clone();
    let mut send_task = tokio::spawn(async move { send_logic(write_half, outbound).await });
    let mut receive_task = tokio::spawn(async move {
        receive_logic(read_half, generation, receive_feed).await
    });

    // If any one of the tasks run to completion, we abort the other.
    let result = tokio::select! {
        res_a = &mut send_task => {receive_task.abort(); res_a},
        res_b = &mut receive_task => {send_task.abort(); res_b},
    };
    let end = result.unwrap_or_else(|err| {
        tracing::error!(?err, "Internal panic in client connection.");
        ConnectionEnd::WriteFailed
    });
    tracing::info!(%peer, ?end, "Connection to host closed.");

    if end == ConnectionEnd::WriteFailed {
        let _ = feed.send(report(ServerEvent::Abandoned)).await;
    }
}

/// Sends the handshake, then drains the queue of the link.
async fn send_logic(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<ClientOutbound>,
) -> ConnectionEnd {
    if let Err(err) = write_line(&mut write_half, &ClientMessage::Initialize.to_string()).await {
        tracing::warn!(?err, "Sending the handshake failed.");
        return ConnectionEnd::WriteFailed;
    }
    while let Some(item) = outbound.recv().await {
        match item {
            ClientOutbound::Send(message) => {
                if let Err(err) = write_line(&mut write_half, &message.to_string()).await {
                    tracing::warn!(?err, "Writing to host failed.");
                    return ConnectionEnd::WriteFailed;
                }
            }
            ClientOutbound::Shutdown => {
                let _ = write_line(&mut write_half, &ClientMessage::Shutdown.to_string()).await;
                let _ = write_half.shutdown().await;
                return ConnectionEnd::Released;
            }
        }
    }
    ConnectionEnd::Released
}

/// Reads lines from the host and forwards them to the engine.
async fn receive_logic(
    read_half: OwnedReadHalf,
    generation: u64,
    feed: mpsc::Sender<ServerFeed>,
) -> ConnectionEnd {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(?err, "Reading from host failed.");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event = match line.parse::<ServerMessage>() {
            Ok(message) => ServerEvent::Message(message),
            Err(err) => {
                tracing::warn!(?err, "Malformed line from host.");
                ServerEvent::Malformed(line)
            }
        };
        let host_closed = matches!(event, ServerEvent::Message(ServerMessage::Shutdown));
        if feed.send(ServerFeed { generation, event }).await.is_err() {
            return ConnectionEnd::EngineGone;
        }
        if host_closed {
            return ConnectionEnd::PeerLeft;
        }
    }

    let abandoned = ServerFeed {
        generation,
        event: ServerEvent::Abandoned,
    };
    if feed.send(abandoned).await.is_err() {
        return ConnectionEnd::EngineGone;
    }
    ConnectionEnd::PeerLeft
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn addresses_split_into_host_and_port() {
        assert_eq!(
            split_address("192.168.1.20", 6868),
            ("192.168.1.20".to_string(), 6868)
        );
        assert_eq!(
            split_address("192.168.1.20:7000", 6868),
            ("192.168.1.20".to_string(), 7000)
        );
        assert_eq!(
            split_address("localhost:7001", 6868),
            ("localhost".to_string(), 7001)
        );
        assert_eq!(split_address("[::1]:7002", 6868), ("::1".to_string(), 7002));
        assert_eq!(split_address("::1", 6868), ("::1".to_string(), 6868));
    }

    #[tokio::test]
    async fn handshake_and_messages_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (feed, mut events) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        spawn_connect(
            "127.0.0.1".to_string(),
            port,
            Duration::from_secs(2),
            3,
            feed,
        );

        let (host_side, _) = listener.accept().await.unwrap();
        let (host_read, mut host_write) = host_side.into_split();
        let mut host_lines = BufReader::new(host_read).lines();
        assert_eq!(host_lines.next_line().await.unwrap().unwrap(), "initialize");

        let connected = events.recv().await.unwrap();
        assert_eq!(connected.generation, 3);
        let ServerEvent::Connected(link) = connected.event else {
            panic!("connected event expected");
        };
        assert!(link.send(ClientMessage::Play(4)));
        assert_eq!(host_lines.next_line().await.unwrap().unwrap(), "p:4");

        host_write.write_all(b"Player=O\nnonsense\n").await.unwrap();
        let role = events.recv().await.unwrap();
        assert!(matches!(
            role.event,
            ServerEvent::Message(ServerMessage::RoleAssigned(protocol::Player::O))
        ));
        let malformed = events.recv().await.unwrap();
        assert!(matches!(malformed.event, ServerEvent::Malformed(line) if line == "nonsense"));

        // A state whose winner contradicts its cells is not taken as a state.
        host_write.write_all(b"s:XXXOOEEEEOEEEE\n").await.unwrap();
        let contradicting = events.recv().await.unwrap();
        assert!(matches!(
            contradicting.event,
            ServerEvent::Malformed(line) if line == "s:XXXOOEEEEOEEEE"
        ));

        link.shutdown();
        assert_eq!(host_lines.next_line().await.unwrap().unwrap(), "shutdown");
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (feed, mut events) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        spawn_connect(
            "127.0.0.1".to_string(),
            port,
            Duration::from_secs(2),
            9,
            feed,
        );
        let failed = events.recv().await.unwrap();
        assert_eq!(failed.generation, 9);
        assert!(matches!(failed.event, ServerEvent::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn closing_host_is_reported_as_abandoned() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (feed, mut events) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        spawn_connect(
            "127.0.0.1".to_string(),
            port,
            Duration::from_secs(2),
            1,
            feed,
        );
        let (host_side, _) = listener.accept().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap().event,
            ServerEvent::Connected(_)
        ));
        drop(host_side);
        assert!(matches!(
            events.recv().await.unwrap().event,
            ServerEvent::Abandoned
        ));
    }
}
