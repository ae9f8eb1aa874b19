//! Which remote connection plays which side while we host a game.

use protocol::Player;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Identifies one accepted connection. The session part is the generation of the hosting session,
/// so ids from a session that has been shut down never match a connection of the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub session: u64,
    pub serial: u64,
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.session, self.serial)
    }
}

/// What happened on an `initialize` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// The connection owns this role now (or already owned it).
    Role(Player),
    /// Both roles are taken, the connection only watches.
    Spectator,
}

/// Maps connections to roles. Each role is owned by at most one connection.
#[derive(Debug, Default)]
pub struct RoleMap {
    roles: HashMap<ConnectionId, Player>,
}

impl RoleMap {
    pub fn new() -> RoleMap {
        RoleMap::default()
    }

    /// Hands out a role. The current player's role is preferred, if it is still free.
    pub fn allocate(&mut self, connection: ConnectionId, current_player: Player) -> Allocation {
        if let Some(role) = self.roles.get(&connection) {
            return Allocation::Role(*role);
        }
        if self.roles.len() >= 2 {
            return Allocation::Spectator;
        }
        let role = if self.owner_of(current_player).is_none() {
            current_player
        } else {
            current_player.opponent()
        };
        self.roles.insert(connection, role);
        Allocation::Role(role)
    }

    pub fn role_of(&self, connection: ConnectionId) -> Option<Player> {
        self.roles.get(&connection).copied()
    }

    pub fn owner_of(&self, role: Player) -> Option<ConnectionId> {
        self.roles
            .iter()
            .find_map(|(connection, owned)| (*owned == role).then_some(*connection))
    }

    /// Frees the role of the connection and returns it.
    pub fn release(&mut self, connection: ConnectionId) -> Option<Player> {
        self.roles.remove(&connection)
    }

    pub fn clear(&mut self) {
        self.roles.clear();
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
