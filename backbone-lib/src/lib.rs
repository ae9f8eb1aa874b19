//! The networking backbone of a peer hosted tic-tac-toe game.
//!
//! One process hosts the game over TCP, others join it as clients. The architecture looks like this:
//! ```text
//!   UI  --UiRequest-->  Engine  <--ClientRequest--  ServerSession  <--TCP-->  remote clients
//!   UI  <--UiEvent----  Engine  <--ServerFeed-----  ClientSession  <--TCP-->  remote host
//! ```
//! The [`engine::Engine`] is the only place that mutates the game. The sessions own the sockets and only
//! route lines, the UI only sees notifications.

pub mod client_session;
pub mod config;
pub mod engine;
mod line_io;
pub mod mode;
pub mod notification;
pub mod requests;
pub mod role_map;
pub mod server_session;
pub mod timer;
pub mod traits;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineHandle, EngineStopped};
pub use mode::{Mode, ModeError};
pub use notification::{BoardView, SettingsView, UiEvent};
pub use requests::{UiParseError, UiRequest};
pub use traits::{GameStore, MemoryStore};
