//! The engine functions the override logic calls.

use std::{ffi::CStr, sync::Arc};

use libc::c_char;

use super::{
    probe::{EntryPoint, EntryPoints},
    PlayerHandle,
};
use crate::{audio::asset::AudioFormat, audio::cache::AudioData, hook::Hook};

/// `criAtomExPlayer_SetVolume`.
pub type SetVolumeFn = extern "C" fn(PlayerHandle, f32);

/// The hook on `criAtomExPlayer_SetVolume`. This is the only engine function we hook.
pub static SET_VOLUME: Hook<SetVolumeFn> = Hook::new();

/// The engine calls made by the redirector and the volume override state.
///
/// None of the engine's functions report failure, so none of these do either.
pub trait AtomEngine: Send + Sync {
    /// Sets a player's volume using the original implementation, without passing through our own
    /// volume hook.
    fn player_set_volume(&self, player: PlayerHandle, volume: f32);

    fn category_get_volume_by_id(&self, category: u32) -> f32;
    fn category_set_volume_by_id(&self, category: u32, volume: f32);

    /// Makes the player play the file at `path` next.
    fn player_set_file(&self, player: PlayerHandle, path: &CStr);

    /// Makes the player play the audio in `data` next. The data must remain valid for as long as
    /// the player might use it.
    fn player_set_data(&self, player: PlayerHandle, data: AudioData);

    fn player_set_format(&self, player: PlayerHandle, format: AudioFormat);
    fn player_set_sampling_rate(&self, player: PlayerHandle, sampling_rate: i32);
    fn player_set_num_channels(&self, player: PlayerHandle, num_channels: i32);
    fn player_set_category_by_id(&self, player: PlayerHandle, category: u32);
    fn player_start(&self, player: PlayerHandle);

    /// Resets all of the player's parameters, including volume, to the engine defaults.
    fn player_reset_parameters(&self, player: PlayerHandle);
}

/// Calls engine functions through the addresses in an [`EntryPoints`] table.
pub struct NativeEngine {
    entry_points: Arc<EntryPoints>,
}

/// Calls the native function for `$entry` with the signature `$sig`, or logs and evaluates to
/// `None` if the function hasn't been found.
macro_rules! call_native {
    ($engine:expr, $entry:expr, $sig:ty, $($args:expr),*) => {{
        match $engine.resolve::<$sig>($entry) {
            Some(function) => Some(unsafe { function($($args),*) }),
            None => {
                log::debug!("skipping call to {}; not found", $entry.symbol());
                None
            }
        }
    }};
}

impl NativeEngine {
    pub fn new(entry_points: Arc<EntryPoints>) -> NativeEngine {
        NativeEngine { entry_points }
    }

    fn resolve<FnType: Copy>(&self, entry: EntryPoint) -> Option<FnType> {
        let address = self.entry_points.address(entry)?;
        Some(unsafe { std::mem::transmute_copy(&address) })
    }
}

impl AtomEngine for NativeEngine {
    fn player_set_volume(&self, player: PlayerHandle, volume: f32) {
        // Before the hook is installed the function itself is the original.
        match SET_VOLUME.original() {
            Some(original) => original(player, volume),
            None => {
                call_native!(
                    self,
                    EntryPoint::PlayerSetVolume,
                    unsafe extern "C" fn(PlayerHandle, f32),
                    player,
                    volume
                );
            }
        }
    }

    fn category_get_volume_by_id(&self, category: u32) -> f32 {
        call_native!(
            self,
            EntryPoint::CategoryGetVolumeById,
            unsafe extern "C" fn(u32) -> f32,
            category
        )
        .unwrap_or(1.0)
    }

    fn category_set_volume_by_id(&self, category: u32, volume: f32) {
        call_native!(
            self,
            EntryPoint::CategorySetVolumeById,
            unsafe extern "C" fn(u32, f32),
            category,
            volume
        );
    }

    fn player_set_file(&self, player: PlayerHandle, path: &CStr) {
        // The binder is optional; null makes the engine load from the file system.
        call_native!(
            self,
            EntryPoint::PlayerSetFile,
            unsafe extern "C" fn(PlayerHandle, *const libc::c_void, *const c_char),
            player,
            std::ptr::null(),
            path.as_ptr()
        );
    }

    fn player_set_data(&self, player: PlayerHandle, data: AudioData) {
        let size = match i32::try_from(data.size) {
            Ok(size) => size,
            Err(_) => {
                log::error!(
                    "{} bytes of audio is too much for the engine; not playing it",
                    data.size
                );

                return;
            }
        };

        call_native!(
            self,
            EntryPoint::PlayerSetData,
            unsafe extern "C" fn(PlayerHandle, *const u8, i32),
            player,
            data.address as *const u8,
            size
        );
    }

    fn player_set_format(&self, player: PlayerHandle, format: AudioFormat) {
        call_native!(
            self,
            EntryPoint::PlayerSetFormat,
            unsafe extern "C" fn(PlayerHandle, u32),
            player,
            format as u32
        );
    }

    fn player_set_sampling_rate(&self, player: PlayerHandle, sampling_rate: i32) {
        call_native!(
            self,
            EntryPoint::PlayerSetSamplingRate,
            unsafe extern "C" fn(PlayerHandle, i32),
            player,
            sampling_rate
        );
    }

    fn player_set_num_channels(&self, player: PlayerHandle, num_channels: i32) {
        call_native!(
            self,
            EntryPoint::PlayerSetNumChannels,
            unsafe extern "C" fn(PlayerHandle, i32),
            player,
            num_channels
        );
    }

    fn player_set_category_by_id(&self, player: PlayerHandle, category: u32) {
        call_native!(
            self,
            EntryPoint::PlayerSetCategoryById,
            unsafe extern "C" fn(PlayerHandle, u32),
            player,
            category
        );
    }

    fn player_start(&self, player: PlayerHandle) {
        // The playback ID is not needed.
        let _ = call_native!(
            self,
            EntryPoint::PlayerStart,
            unsafe extern "C" fn(PlayerHandle) -> u32,
            player
        );
    }

    fn player_reset_parameters(&self, player: PlayerHandle) {
        call_native!(
            self,
            EntryPoint::PlayerResetParameters,
            unsafe extern "C" fn(PlayerHandle),
            player
        );
    }
}
