//! Keeps track of the engine's live players.

use std::{collections::HashMap, sync::Mutex};

use super::{Player, PlayerHandle};

/// Maps player IDs to live players.
pub trait PlayerRegistry: Send + Sync {
    fn player_by_id(&self, id: i32) -> Option<Player>;
}

/// A registry filled in by whatever observes player creation and destruction.
#[derive(Default)]
pub struct AtomRegistry {
    players: Mutex<HashMap<i32, Player>>,
}

impl AtomRegistry {
    pub fn new() -> AtomRegistry {
        AtomRegistry::default()
    }

    fn players(&self) -> std::sync::MutexGuard<'_, HashMap<i32, Player>> {
        self.players.lock().expect("Failed to lock player registry")
    }

    /// Adds `player`, replacing any player that had the same ID.
    pub fn register(&self, player: Player) {
        if let Some(old) = self.players().insert(player.id, player) {
            log::debug!("player {} replaced (old handle {})", old.id, old.handle);
        }
    }

    /// Removes the player with `handle`, returning it if it was registered.
    pub fn unregister(&self, handle: PlayerHandle) -> Option<Player> {
        let mut players = self.players();
        let id = players
            .iter()
            .find_map(|(id, player)| (player.handle == handle).then_some(*id))?;

        players.remove(&id)
    }

    pub fn player_by_handle(&self, handle: PlayerHandle) -> Option<Player> {
        self.players()
            .values()
            .find(|player| player.handle == handle)
            .copied()
    }
}

impl PlayerRegistry for AtomRegistry {
    fn player_by_id(&self, id: i32) -> Option<Player> {
        self.players().get(&id).copied()
    }
}
