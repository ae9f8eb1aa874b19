//! The authoritative game loop. This is the core entry point of the system.
//!
//! The engine owns the board, the role map, the network mode and the session handles. It runs as a single
//! tokio task with a fixed tick (25 ms by default). On every tick it takes **at most one** message from
//! each of its inbound channels, in this order:
//!
//! 1. the local UI ([`UiRequest`], sent over the [`EngineHandle`]),
//! 2. the connections of our hosting session ([`ClientRequest`]),
//! 3. our own connection to a remote host ([`ServerFeed`]).
//!
//! Afterwards, in client mode, the automatic status countdown advances. Handlers never wait on anything:
//! replies and fan-out are queued with `try_send`, connecting happens in a spawned task and reports back
//! over the server feed.
//!
//! A rough usage example looks like this:
//! ```text
//!     let (engine, handle) = Engine::new(EngineConfig::default(), MemoryStore::default());
//!     let mut events = handle.subscribe();
//!     tokio::spawn(engine.run());
//!     handle.send(UiRequest::StartServer).await?;
//!     while let Ok(event) = events.recv().await {
//!         // Draw board and settings here.
//!     }
//! ```

use crate::client_session::{ClientLink, ServerEvent, ServerFeed, spawn_connect, split_address};
use crate::config::EngineConfig;
use crate::mode::{Mode, ModeController, ModeTransition};
use crate::notification::{BoardView, Notifier, SettingsView, UiEvent};
use crate::requests::{ClientRequest, Outbound, RemoteRequest, UiRequest};
use crate::role_map::{Allocation, RoleMap};
use crate::server_session::ServerSession;
use crate::timer::TickCountdown;
use crate::traits::{GameStore, restore_board, save_board};
use protocol::{
    CHANNEL_BUFFER_SIZE, ClientMessage, GameBoard, MoveOutcome, Player, ServerMessage, encode,
    encode_state,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;

/// The engine task is not running anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the engine has stopped")]
pub struct EngineStopped;

/// The way the UI talks to a running engine. Cheap to clone, pass it wherever it is needed.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    requests: mpsc::Sender<UiRequest>,
    client_requests: mpsc::Sender<ClientRequest>,
    notifier: Notifier,
}

impl EngineHandle {
    pub async fn send(&self, request: UiRequest) -> Result<(), EngineStopped> {
        self.requests.send(request).await.map_err(|_| EngineStopped)
    }

    /// Hands a protocol request to the engine as if it came from within the process, without any way to
    /// reply. Plays follow the rules of local moves.
    pub async fn submit(&self, message: ClientMessage) -> Result<(), EngineStopped> {
        let request = ClientRequest {
            request: RemoteRequest::Message(message),
            reply: None,
        };
        self.client_requests
            .send(request)
            .await
            .map_err(|_| EngineStopped)
    }

    /// Listens to the notifications of the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.notifier.subscribe()
    }
}

/// The receiving ends of the three inbound channels.
struct Inbox {
    ui: mpsc::Receiver<UiRequest>,
    remote_clients: mpsc::Receiver<ClientRequest>,
    remote_server: mpsc::Receiver<ServerFeed>,
}

pub struct Engine<Store: GameStore> {
    config: EngineConfig,
    store: Store,
    board: GameBoard,
    roles: RoleMap,
    mode: ModeController,
    notifier: Notifier,
    inbox: Inbox,
    /// Handed to every hosting session, so its connections can reach us.
    client_requests: mpsc::Sender<ClientRequest>,
    /// Handed to every connection attempt.
    server_feed: mpsc::Sender<ServerFeed>,
    server: Option<ServerSession>,
    client: Option<ClientLink>,
    /// The generation of the connection attempt we are waiting for.
    pending_connect: Option<u64>,
    /// The role the host gave us in client mode.
    my_role: Option<Player>,
    /// The last state received in client mode, in its wire encoding.
    last_seen_state: Option<String>,
    auto_status: TickCountdown,
    generation: u64,
    keep_running: bool,
}

impl<Store: GameStore> Engine<Store> {
    /// Creates the engine in local mode with an empty board. The stored game gets loaded once
    /// [`Engine::run`] starts.
    pub fn new(config: EngineConfig, store: Store) -> (Engine<Store>, EngineHandle) {
        let (ui_sender, ui) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (client_requests, remote_clients) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (server_feed, remote_server) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let notifier = Notifier::new(CHANNEL_BUFFER_SIZE);
        let auto_status = TickCountdown::from_millis(config.auto_status_ms, config.tick_ms);

        let handle = EngineHandle {
            requests: ui_sender,
            client_requests: client_requests.clone(),
            notifier: notifier.clone(),
        };
        let engine = Engine {
            config,
            store,
            board: GameBoard::new(),
            roles: RoleMap::new(),
            mode: ModeController::new(),
            notifier,
            inbox: Inbox {
                ui,
                remote_clients,
                remote_server,
            },
            client_requests,
            server_feed,
            server: None,
            client: None,
            pending_connect: None,
            my_role: None,
            last_seen_state: None,
            auto_status,
            generation: 0,
            keep_running: true,
        };
        (engine, handle)
    }

    pub fn board(&self) -> &GameBoard {
        &self.board
    }

    pub fn mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    /// Restores the stored game and ticks until a stop request arrives or all handles are gone.
    /// Hands the store back on the way out.
    pub async fn run(mut self) -> Store {
        self.board = restore_board(&self.store);
        tracing::info!(encoded = %encode(&self.board), "Engine started.");
        self.notify_board();
        self.notify_settings();

        let mut interval = tokio::time::interval(self.config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while self.keep_running {
            interval.tick().await;
            self.tick();
        }
        tracing::info!("Engine stopped.");
        self.store
    }

    /// One round of the loop.
    pub fn tick(&mut self) {
        match self.inbox.ui.try_recv() {
            Ok(request) => self.handle_ui(request),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::info!("All engine handles dropped.");
                self.handle_ui(UiRequest::Stop);
            }
        }
        if !self.keep_running {
            return;
        }
        if let Ok(request) = self.inbox.remote_clients.try_recv() {
            self.handle_client_request(request);
        }
        if let Ok(feed) = self.inbox.remote_server.try_recv() {
            self.handle_server_feed(feed);
        }
        if self.mode.current() == Mode::Client && self.auto_status.tick() {
            if let Some(link) = &self.client {
                tracing::trace!("Requesting status from host.");
                link.send(ClientMessage::Status);
            }
        }
    }

    pub fn handle_ui(&mut self, request: UiRequest) {
        tracing::debug!(?request, "UI request.");
        match request {
            UiRequest::Reset => self.reset(),
            UiRequest::Resume => self.resume(),
            UiRequest::Play(index) => self.play_local(index),
            UiRequest::UpdateSettings => self.notify_settings(),
            UiRequest::StartServer => self.start_server(),
            UiRequest::StartLocal => self.start_local(),
            UiRequest::ConnectRemote(address) => self.connect_remote(&address),
            UiRequest::Stop => self.stop(),
        }
    }

    /// Requests of our hosting session. Only requests of the current session are looked at.
    pub fn handle_client_request(&mut self, request: ClientRequest) {
        let ClientRequest { request, reply } = request;
        let Some(reply) = reply else {
            self.handle_in_process(request);
            return;
        };
        let connection = reply.id();
        let current_session = self.server.as_ref().map(ServerSession::generation);
        if current_session != Some(connection.session) {
            tracing::debug!(%connection, "Request of a closed session dropped.");
            return;
        }

        match request {
            RemoteRequest::Message(ClientMessage::Initialize) => {
                match self.roles.allocate(connection, self.board.current_player()) {
                    Allocation::Role(role) => {
                        tracing::info!(%connection, %role, "Role assigned.");
                        reply.send(Outbound::Line(ServerMessage::RoleAssigned(role)));
                        self.notify_settings();
                        self.notify_board();
                    }
                    Allocation::Spectator => {
                        tracing::info!(%connection, "Both roles taken, connection is spectating.");
                    }
                }
            }
            RemoteRequest::Message(ClientMessage::Play(index)) => {
                let has_turn = self.roles.role_of(connection) == Some(self.board.current_player());
                // An applied move reaches the requester with the fan-out.
                if !(has_turn && self.apply_move(index)) {
                    reply.send(Outbound::Line(self.state_message()));
                }
            }
            RemoteRequest::Message(ClientMessage::Status) => {
                reply.send(Outbound::Line(self.state_message()));
            }
            RemoteRequest::Message(ClientMessage::Shutdown | ClientMessage::Abandoned) => {
                if let Some(role) = self.roles.release(connection) {
                    tracing::info!(%connection, %role, "Role freed.");
                    self.notify_settings();
                    self.notify_board();
                }
                reply.send(Outbound::Abandoned);
            }
            RemoteRequest::Invalid(text) => {
                reply.send(Outbound::Line(ServerMessage::Invalid(text)));
            }
        }
    }

    /// Events of our connection to a remote host.
    pub fn handle_server_feed(&mut self, feed: ServerFeed) {
        let ServerFeed { generation, event } = feed;
        let is_active = self.client.as_ref().map(ClientLink::generation) == Some(generation);
        match event {
            ServerEvent::Connected(link) => self.client_connected(link),
            ServerEvent::ConnectFailed(reason) => self.connect_failed(generation, reason),
            _ if !is_active => {
                tracing::debug!(generation, "Event of a closed connection dropped.");
            }
            ServerEvent::Message(message) => self.handle_server_message(message),
            ServerEvent::Malformed(line) => {
                tracing::warn!(%line, "Ignoring malformed line from host.");
            }
            ServerEvent::Abandoned => {
                tracing::warn!("Connection to host lost.");
                self.lose_host();
            }
        }
    }

    fn handle_in_process(&mut self, request: RemoteRequest) {
        match request {
            RemoteRequest::Message(ClientMessage::Play(index)) => self.play_local(index),
            RemoteRequest::Message(ClientMessage::Status) => self.notify_board(),
            RemoteRequest::Message(message) => {
                tracing::debug!(%message, "Ignoring in-process request without connection.");
            }
            RemoteRequest::Invalid(text) => {
                tracing::warn!(%text, "Ignoring invalid in-process request.");
            }
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::State(state) => {
                self.auto_status.restart();
                let encoded = encode_state(&state);
                if self.last_seen_state.as_deref() == Some(encoded.as_str()) {
                    return;
                }
                self.board = GameBoard::from_state(&state);
                self.last_seen_state = Some(encoded);
                save_board(&mut self.store, &self.board);
                self.notify_board();
            }
            ServerMessage::RoleAssigned(role) => {
                tracing::info!(%role, "Role assigned by host.");
                self.my_role = Some(role);
                self.notify_board();
            }
            ServerMessage::Invalid(text) => {
                tracing::warn!(%text, "Host did not understand our request.");
            }
            ServerMessage::Shutdown => {
                tracing::info!("Host closed the session.");
                self.lose_host();
            }
        }
    }

    fn reset(&mut self) {
        if self.mode.current() == Mode::Client {
            tracing::warn!("The host owns the board, reset ignored.");
            self.notifier
                .notify(UiEvent::Error("only the host can reset the game".to_string()));
            return;
        }
        self.board.reset();
        save_board(&mut self.store, &self.board);
        self.notifier.notify(UiEvent::Reset);
        self.publish_state();
    }

    fn resume(&mut self) {
        self.board = restore_board(&self.store);
        tracing::info!(encoded = %encode(&self.board), "Stored game resumed.");
        self.publish_state();
    }

    fn play_local(&mut self, index: u8) {
        match self.mode.current() {
            Mode::Client => {
                if let Some(link) = &self.client {
                    if link.send(ClientMessage::Play(index)) {
                        self.auto_status.restart();
                    }
                }
            }
            Mode::Local | Mode::Server => {
                let current = self.board.current_player();
                if let Some(owner) = self.roles.owner_of(current) {
                    tracing::debug!(%owner, role = %current, "Role is played remotely, local move ignored.");
                    return;
                }
                self.apply_move(index);
            }
        }
    }

    /// Applies the move for the current player, stores and publishes the result.
    fn apply_move(&mut self, index: u8) -> bool {
        match self.board.apply_move(usize::from(index)) {
            MoveOutcome::Applied => {
                save_board(&mut self.store, &self.board);
                self.publish_state();
                true
            }
            MoveOutcome::Rejected(reason) => {
                tracing::debug!(index, %reason, "Move rejected.");
                false
            }
        }
    }

    fn start_server(&mut self) {
        let transition = match self.mode.plan(Mode::Server) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::info!(%err, "Ignoring mode request.");
                return;
            }
        };
        let generation = self.next_generation();
        let session =
            match ServerSession::start(&self.config, generation, self.client_requests.clone()) {
                Ok(session) => session,
                Err(err) => {
                    tracing::error!(?err, "Starting the server failed.");
                    self.notifier
                        .notify(UiEvent::Error(format!("could not start server: {err}")));
                    return;
                }
            };
        self.execute(transition);
        self.server = Some(session);
        self.notify_settings();
        self.notify_board();
    }

    fn start_local(&mut self) {
        match self.mode.plan(Mode::Local) {
            Ok(transition) => {
                self.execute(transition);
                self.notify_settings();
                self.notify_board();
            }
            Err(err) => {
                if self.pending_connect.take().is_some() {
                    tracing::info!("Pending connection attempt cancelled.");
                } else {
                    tracing::info!(%err, "Ignoring mode request.");
                }
            }
        }
    }

    /// Only starts the attempt. The mode changes once the connection stands.
    fn connect_remote(&mut self, address: &str) {
        if let Err(err) = self.mode.plan(Mode::Client) {
            tracing::info!(%err, "Ignoring mode request.");
            return;
        }
        let (host, port) = split_address(address, self.config.port);
        let generation = self.next_generation();
        self.pending_connect = Some(generation);
        tracing::info!(%host, port, generation, "Connecting to host.");
        spawn_connect(
            host,
            port,
            self.config.connect_timeout(),
            generation,
            self.server_feed.clone(),
        );
    }

    fn client_connected(&mut self, link: ClientLink) {
        if self.pending_connect != Some(link.generation()) {
            tracing::debug!(peer = %link.peer(), "Closing connection nobody waits for.");
            link.shutdown();
            return;
        }
        let transition = match self.mode.plan(Mode::Client) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::warn!(%err, "Closing unexpected connection.");
                self.pending_connect = None;
                link.shutdown();
                return;
            }
        };
        self.execute(transition);
        tracing::info!(peer = %link.peer(), "Joined remote game.");
        self.client = Some(link);
        self.auto_status.expire();
        self.notify_settings();
        self.notify_board();
    }

    /// A failed attempt leaves the current mode and its session alone.
    fn connect_failed(&mut self, generation: u64, reason: String) {
        if self.pending_connect != Some(generation) {
            tracing::debug!(generation, %reason, "Failure of an abandoned attempt dropped.");
            return;
        }
        self.pending_connect = None;
        tracing::warn!(%reason, mode = %self.mode.current(), "Connection failed, keeping current mode.");
        self.notifier
            .notify(UiEvent::Error(format!("could not connect: {reason}")));
        self.notify_settings();
    }

    /// The host is gone, we continue on our own.
    fn lose_host(&mut self) {
        if let Ok(transition) = self.mode.plan(Mode::Local) {
            self.execute(transition);
            self.notify_settings();
            self.notify_board();
        }
    }

    fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        if let Some(client) = self.client.take() {
            client.shutdown();
        }
        self.pending_connect = None;
        self.roles.clear();
        self.keep_running = false;
    }

    /// Tears down what the transition asks for, then switches the mode.
    fn execute(&mut self, transition: ModeTransition) {
        if transition.stop_server {
            if let Some(server) = self.server.take() {
                server.shutdown();
            }
        }
        if transition.stop_client {
            if let Some(client) = self.client.take() {
                client.shutdown();
            }
        }
        self.roles.clear();
        self.pending_connect = None;
        self.my_role = None;
        self.last_seen_state = None;
        self.mode.commit(transition);
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn state_message(&self) -> ServerMessage {
        ServerMessage::State(self.board.state())
    }

    /// Tells the UI and, while hosting, every connection.
    fn publish_state(&mut self) {
        self.notify_board();
        if let Some(server) = &self.server {
            server.push_state_to_all(&self.state_message());
        }
    }

    /// Whether a move from this process would be accepted right now.
    fn my_turn(&self) -> bool {
        if self.board.is_decided() {
            return false;
        }
        let current = self.board.current_player();
        match self.mode.current() {
            Mode::Local => true,
            Mode::Server => self.roles.owner_of(current).is_none(),
            Mode::Client => self.my_role == Some(current),
        }
    }

    fn notify_board(&self) {
        self.notifier.notify(UiEvent::Board(BoardView {
            encoded: encode(&self.board),
            state: self.board.state(),
            my_turn: self.my_turn(),
        }));
    }

    fn notify_settings(&self) {
        let server = self.server.as_ref();
        self.notifier.notify(UiEvent::Settings(SettingsView {
            mode: self.mode.current(),
            addresses: server
                .map(|server| {
                    server
                        .local_addresses()
                        .iter()
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            listening_port: server.map(ServerSession::local_port),
            connected_clients: server.map_or(0, ServerSession::connected_count),
        }));
    }
}
