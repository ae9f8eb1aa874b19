//! The network mode of the engine and the legal transitions between them.
//!
//! | Target | Trigger | Teardown |
//! |--------|---------|----------|
//! | LOCAL  | `start-local`, or the host closed our session | whatever session is active |
//! | SERVER | `start-server`, once the listener is bound | an outbound connection |
//! | CLIENT | `connect-remote`, once the connection stands | a hosting session |
//!
//! A transition to the mode we are already in is refused by the controller.

use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Both players sit in front of this process.
    #[default]
    Local,
    /// We host the game for remote clients.
    Server,
    /// We play on the board of a remote host.
    Client,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Local => write!(f, "LOCAL"),
            Mode::Server => write!(f, "SERVER"),
            Mode::Client => write!(f, "CLIENT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("already in {0} mode")]
    AlreadyIn(Mode),
}

/// The teardown steps that come with a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    /// The hosting session has to be shut down.
    pub stop_server: bool,
    /// The connection to a remote host has to be closed.
    pub stop_client: bool,
}

/// Keeps track of the current mode.
#[derive(Debug, Default)]
pub struct ModeController {
    current: Mode,
}

impl ModeController {
    pub fn new() -> ModeController {
        ModeController::default()
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Works out what has to be torn down to get into the target mode. Nothing is changed yet.
    /// The role map gets cleared on every transition, as it only lives as long as one hosting session.
    pub fn plan(&self, target: Mode) -> Result<ModeTransition, ModeError> {
        if target == self.current {
            return Err(ModeError::AlreadyIn(target));
        }
        Ok(ModeTransition {
            from: self.current,
            to: target,
            stop_server: self.current == Mode::Server,
            stop_client: self.current == Mode::Client,
        })
    }

    /// Records the transition, after the caller executed the teardown steps.
    pub fn commit(&mut self, transition: ModeTransition) {
        debug_assert_eq!(transition.from, self.current);
        tracing::info!(from = %transition.from, to = %transition.to, "Mode changed.");
        self.current = transition.to;
    }
}
