// Shared helpers for the integration tests: running engines on loopback and raw line clients.
#![allow(dead_code)]

use backbone_lib::{Engine, EngineConfig, EngineHandle, MemoryStore, Mode, UiEvent, UiRequest};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Upper bound for anything we wait for.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Binds to an ephemeral loopback port and ticks fast.
pub fn loopback_config() -> EngineConfig {
    EngineConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        tick_ms: 5,
        ..EngineConfig::default()
    }
}

pub struct RunningEngine {
    pub handle: EngineHandle,
    pub events: broadcast::Receiver<UiEvent>,
    pub task: JoinHandle<MemoryStore>,
}

impl RunningEngine {
    pub fn start(store: MemoryStore) -> RunningEngine {
        init_tracing();
        let (engine, handle) = Engine::new(loopback_config(), store);
        let events = handle.subscribe();
        let task = tokio::spawn(engine.run());
        RunningEngine {
            handle,
            events,
            task,
        }
    }

    /// Starts an engine and switches it into server mode. Returns the port it listens on.
    pub async fn host() -> (RunningEngine, u16) {
        let mut engine = RunningEngine::start(MemoryStore::default());
        engine.request(UiRequest::StartServer).await;
        let port = engine
            .wait_for(|event| match event {
                UiEvent::Settings(settings) if settings.mode == Mode::Server => {
                    settings.listening_port
                }
                _ => None,
            })
            .await;
        (engine, port)
    }

    pub async fn request(&self, request: UiRequest) {
        self.handle.send(request).await.unwrap();
    }

    /// Skips notifications until the probe picks one.
    pub async fn wait_for<T>(&mut self, mut probe: impl FnMut(&UiEvent) -> Option<T>) -> T {
        let events = &mut self.events;
        let search = async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(found) = probe(&event) {
                            return found;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("engine stopped while waiting"),
                }
            }
        };
        tokio::time::timeout(PATIENCE, search)
            .await
            .expect("notification did not arrive in time")
    }

    pub async fn wait_for_mode(&mut self, mode: Mode) {
        self.wait_for(|event| match event {
            UiEvent::Settings(settings) if settings.mode == mode => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn wait_for_board(&mut self, encoded: &str) {
        self.wait_for(|event| match event {
            UiEvent::Board(view) if view.encoded == encoded => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn stop(self) -> MemoryStore {
        self.request(UiRequest::Stop).await;
        tokio::time::timeout(PATIENCE, self.task)
            .await
            .expect("engine did not stop")
            .unwrap()
    }
}

/// A remote client speaking the line protocol by hand.
pub struct LineClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    pub async fn connect(port: u16) -> LineClient {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, writer) = stream.into_split();
        LineClient {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connects and sends the handshake.
    pub async fn join(port: u16) -> LineClient {
        let mut client = LineClient::connect(port).await;
        client.send("initialize").await;
        client
    }

    /// Joins until a role is handed out. Used where a role gets freed in the background, a spectator
    /// answers the status request with the state instead of a role.
    pub async fn join_until_role(port: u16) -> (LineClient, String) {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        loop {
            let mut client = LineClient::join(port).await;
            client.send("status:").await;
            let first = client.recv().await;
            if first.starts_with("Player=") {
                return (client, first);
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no role got free in time"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(PATIENCE, self.lines.next_line())
            .await
            .expect("no line in time")
            .unwrap()
            .expect("connection closed")
    }

    /// Returns `None` once the server closed the connection.
    pub async fn recv_or_closed(&mut self) -> Option<String> {
        tokio::time::timeout(PATIENCE, self.lines.next_line())
            .await
            .expect("no line in time")
            .unwrap_or(None)
    }
}
