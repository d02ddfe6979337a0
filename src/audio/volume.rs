//! Volume overrides for replacement audio.
//!
//! Replacement audio rarely matches the loudness of the audio it replaces, so each replacement
//! can carry its own volume. That volume is applied in one of two ways:
//!
//!  * Relative to the player. The player's volume is multiplied by the replacement's volume, and
//!    keeps being multiplied every time the game sets the player's volume (for fades, volume
//!    settings and so on) until the override is lifted. This relies on the hook on
//!    `criAtomExPlayer_SetVolume`, which lets us see and rewrite every volume the game sets.
//!  * By category. The volume of a whole category is replaced. The category's original volume is
//!    saved the first time we change it so that it can be put back afterwards.
//!
//! A player that gets a relative override before the game has ever set its volume has nothing to
//! be relative to, so the volume is set outright instead and the player is reset when the
//! override is lifted. The game's later volume changes are not scaled in that case.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use itertools::Itertools;
use once_cell::sync::OnceCell;

use crate::atom::{
    engine::{AtomEngine, NativeEngine, SetVolumeFn, SET_VOLUME},
    probe::{EntryPoint, EntryPoints},
    Player, PlayerHandle,
};

use super::asset::AudioAsset;

/// Everything we know about the volumes we've touched.
#[derive(Default)]
struct Ledger {
    /// The last volume the game set for each player, before any rewriting.
    native_volumes: HashMap<PlayerHandle, f32>,

    /// Multipliers for players with relative overrides.
    multipliers: HashMap<PlayerHandle, f32>,

    /// Players whose volume has been set outright. These need resetting when the override is
    /// lifted. A player is never in here while it has a multiplier.
    modified_players: HashSet<PlayerHandle>,

    /// The volumes categories had before we first changed them.
    category_volumes: HashMap<u32, f32>,
}

/// Applies, tracks and removes volume overrides.
pub struct VolumeOverrides<E> {
    engine: Arc<E>,
    entry_points: Arc<EntryPoints>,
    ledger: Mutex<Ledger>,
}

impl<E: AtomEngine> VolumeOverrides<E> {
    pub fn new(engine: Arc<E>, entry_points: Arc<EntryPoints>) -> VolumeOverrides<E> {
        VolumeOverrides {
            engine,
            entry_points,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// The ledger is reached from the volume hook, so a panic elsewhere must not poison it for
    /// the game's threads.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called for every volume the game sets on a player.
    ///
    /// Players with a relative override get the game's volume multiplied by the override. The
    /// game's own volume is only remembered for players without one, so that it always holds the
    /// game's volume rather than one we've rewritten.
    ///
    /// The ledger stays locked until the volume has been forwarded, so an override can't be
    /// applied between the decision and the write.
    pub fn on_set_volume(&self, player: PlayerHandle, volume: f32) {
        let mut ledger = self.ledger();

        let volume = match ledger.multipliers.get(&player) {
            Some(&multiplier) => volume * multiplier,
            None => {
                ledger.native_volumes.insert(player, volume);
                volume
            }
        };

        self.engine.player_set_volume(player, volume);
    }

    /// Applies the volume from `asset` to `player`, or to a category if `asset` isn't
    /// player-relative. `categories` are the categories the audio is played in.
    pub fn apply(&self, player: Player, asset: &AudioAsset, categories: &[u32]) {
        let volume = match asset.volume {
            Some(volume) => volume,
            None => {
                log::debug!("no custom volume set for '{}'", asset.name);
                return;
            }
        };

        if asset.use_player_volume {
            self.apply_to_player(player, volume);
        } else if let Some(&first) = categories.first() {
            self.apply_to_category(asset.volume_category_id.unwrap_or(first), volume);
        } else {
            log::debug!(
                "'{}' has a volume but no player or category to apply it to",
                asset.name
            );
        }
    }

    fn apply_to_player(&self, player: Player, volume: f32) {
        let handle = player.handle;

        let mut ledger = self.ledger();
        let current = ledger.native_volumes.get(&handle).copied();

        if current.is_some() {
            ledger.multipliers.insert(handle, volume);
            ledger.modified_players.remove(&handle);
        } else {
            ledger.multipliers.remove(&handle);
            ledger.modified_players.insert(handle);
        }

        match current {
            Some(current) => {
                let new_volume = current * volume;
                self.engine.player_set_volume(handle, new_volume);

                log::debug!(
                    "player {} volume set relative to original: player {current}, audio {volume}, final {new_volume}",
                    player.id
                );
            }

            None => {
                self.engine.player_set_volume(handle, volume);
                log::debug!("player {} volume set to {volume}", player.id);
            }
        }
    }

    fn apply_to_category(&self, category: u32, volume: f32) {
        let mut ledger = self.ledger();

        if !ledger.category_volumes.contains_key(&category) {
            let original = self.engine.category_get_volume_by_id(category);
            ledger.category_volumes.insert(category, original);
        }

        self.engine.category_set_volume_by_id(category, volume);
        log::debug!("category {category} volume set to {volume}");
    }

    /// Lifts the overrides on `player` and the categories in `category_ids`, putting back the
    /// volumes they had before. Players and categories without overrides are left alone, so this
    /// can be called any number of times.
    pub fn restore(&self, player: Player, category_ids: &[u32]) {
        let handle = player.handle;

        let was_modified = {
            let mut ledger = self.ledger();

            // Saved volumes are written back before the ledger is unlocked, so nobody can save
            // an overridden volume as the original in between.
            for &id in category_ids.iter().unique() {
                if let Some(volume) = ledger.category_volumes.remove(&id) {
                    self.engine.category_set_volume_by_id(id, volume);
                    log::debug!("category {id} volume reset to {volume}");
                }
            }

            if ledger.multipliers.remove(&handle).is_some() {
                ledger.native_volumes.remove(&handle);
                log::debug!("cleared relative volume for player {}", player.id);
            }

            ledger.modified_players.remove(&handle)
        };

        // Resetting may make the engine set the volume again, which would come back through the
        // hook and need the ledger.
        if was_modified {
            if self.entry_points.supports(EntryPoint::PlayerResetParameters) {
                self.engine.player_reset_parameters(handle);
                log::debug!("player {} volume reset", player.id);
            } else {
                log::debug!(
                    "can't reset player {} volume; the engine has no parameter reset",
                    player.id
                );
            }
        }
    }

    /// Returns the last volume the game set for `player`, if it has been recorded.
    pub fn native_volume(&self, player: PlayerHandle) -> Option<f32> {
        self.ledger().native_volumes.get(&player).copied()
    }

    /// Returns the relative override on `player`.
    pub fn multiplier(&self, player: PlayerHandle) -> Option<f32> {
        self.ledger().multipliers.get(&player).copied()
    }

    /// Returns `true` if `player` has had its volume set outright.
    pub fn is_modified(&self, player: PlayerHandle) -> bool {
        self.ledger().modified_players.contains(&player)
    }

    /// Returns the volume `category` had before it was first overridden.
    pub fn saved_category_volume(&self, category: u32) -> Option<f32> {
        self.ledger().category_volumes.get(&category).copied()
    }
}

/// The overrides that the native volume hook consults.
static NATIVE_OVERRIDES: OnceCell<Arc<VolumeOverrides<NativeEngine>>> = OnceCell::new();

/// Replacement for `criAtomExPlayer_SetVolume`.
extern "C" fn set_volume(player: PlayerHandle, volume: f32) {
    dispatch_set_volume(
        NATIVE_OVERRIDES.get().map(|overrides| &**overrides),
        SET_VOLUME.original(),
        player,
        volume,
    );
}

/// Sends a volume from the game through `overrides`, or straight to `original` if there are no
/// overrides yet.
fn dispatch_set_volume<E: AtomEngine>(
    overrides: Option<&VolumeOverrides<E>>,
    original: Option<SetVolumeFn>,
    player: PlayerHandle,
    volume: f32,
) {
    if let Some(overrides) = overrides {
        overrides.on_set_volume(player, volume);
    } else if let Some(original) = original {
        original(player, volume);
    }
}

/// Hooks `criAtomExPlayer_SetVolume` so that every volume the game sets goes through `overrides`.
/// This must happen before the game creates any players.
pub fn install_hook(
    backend: &dyn crate::hook::HookBackend,
    overrides: Arc<VolumeOverrides<NativeEngine>>,
) -> eyre::Result<()> {
    let target = overrides
        .entry_points
        .address(EntryPoint::PlayerSetVolume)
        .ok_or_else(|| eyre::eyre!("{} has not been found", EntryPoint::PlayerSetVolume.symbol()))?;

    if NATIVE_OVERRIDES.set(overrides).is_err() {
        return Err(eyre::eyre!("volume overrides have already been set up"));
    }

    SET_VOLUME.install(backend, target, set_volume)?;
    log::info!("volume hook installed at {target:#x}");

    Ok(())
}
