//! Finds the engine's entry points at runtime.
//!
//! Not every game exports every function we can use, and the search for some of them runs in the
//! background while the game is already starting up. Each entry point therefore has a slot that is
//! filled at most once; until a slot is filled, the entry point is treated as unsupported. Nothing
//! ever waits for a slot.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dlopen::symbor::Library;
use eyre::{Context, Result};
use libc::c_void;
use once_cell::sync::OnceCell;
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

/// A native engine function, named by the symbol it is exported under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
pub enum EntryPoint {
    #[strum(serialize = "criAtomExPlayer_SetVolume")]
    PlayerSetVolume,

    #[strum(serialize = "criAtomExCategory_GetVolumeById")]
    CategoryGetVolumeById,

    #[strum(serialize = "criAtomExCategory_SetVolumeById")]
    CategorySetVolumeById,

    #[strum(serialize = "criAtomExPlayer_SetFile")]
    PlayerSetFile,

    #[strum(serialize = "criAtomExPlayer_SetData")]
    PlayerSetData,

    #[strum(serialize = "criAtomExPlayer_SetFormat")]
    PlayerSetFormat,

    #[strum(serialize = "criAtomExPlayer_SetSamplingRate")]
    PlayerSetSamplingRate,

    #[strum(serialize = "criAtomExPlayer_SetNumChannels")]
    PlayerSetNumChannels,

    #[strum(serialize = "criAtomExPlayer_SetCategoryById")]
    PlayerSetCategoryById,

    #[strum(serialize = "criAtomExPlayer_Start")]
    PlayerStart,

    #[strum(serialize = "criAtomExPlayer_ResetParameters")]
    PlayerResetParameters,
}

impl EntryPoint {
    /// Returns the name of the exported symbol for this entry point.
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    /// Returns `true` if the game is allowed to not have this function. Optional entry points are
    /// looked for in the background; the rest must be found before we hook anything.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            EntryPoint::PlayerSetFile | EntryPoint::PlayerSetData | EntryPoint::PlayerResetParameters
        )
    }

    /// Returns an iterator over the entry points that are needed at startup.
    pub fn mandatory() -> impl Iterator<Item = EntryPoint> {
        EntryPoint::iter().filter(|entry| !entry.is_optional())
    }

    /// Returns an iterator over the entry points that may never be found.
    pub fn optional() -> impl Iterator<Item = EntryPoint> {
        EntryPoint::iter().filter(|entry| entry.is_optional())
    }
}

/// The addresses of every entry point found so far.
pub struct EntryPoints {
    slots: [OnceCell<usize>; EntryPoint::COUNT],
}

impl Default for EntryPoints {
    fn default() -> Self {
        EntryPoints {
            slots: std::array::from_fn(|_| OnceCell::new()),
        }
    }
}

impl EntryPoints {
    pub fn new() -> EntryPoints {
        EntryPoints::default()
    }

    /// Records the address of `entry`. Returns `false` if the address was already known, in which
    /// case the first address is kept.
    pub fn record(&self, entry: EntryPoint, address: usize) -> bool {
        self.slots[entry as usize].set(address).is_ok()
    }

    /// Returns the address of `entry`, if it has been found.
    pub fn address(&self, entry: EntryPoint) -> Option<usize> {
        self.slots[entry as usize].get().copied()
    }

    /// Returns `true` if `entry` has been found. Entry points that are still being searched for
    /// are unsupported.
    pub fn supports(&self, entry: EntryPoint) -> bool {
        self.address(entry).is_some()
    }
}

/// Somewhere that native symbols can be looked up.
pub trait SymbolSource: Send + Sync {
    fn find(&self, name: &str) -> Option<usize>;
}

/// Looks symbols up in a loaded module with `dlopen`.
pub struct ModuleSymbols {
    library: Library,
    name: String,
}

impl ModuleSymbols {
    /// Opens the module at `path`. The module should already be loaded by the host; this only
    /// obtains a handle to it.
    pub fn open(path: impl AsRef<Path>) -> Result<ModuleSymbols> {
        let path: PathBuf = path.as_ref().into();

        Ok(ModuleSymbols {
            library: Library::open(&path)
                .wrap_err_with(|| format!("failed to open engine module {path:?}"))?,
            name: path.display().to_string(),
        })
    }

    /// Uses the host executable itself, for games with the engine linked statically.
    pub fn host() -> Result<ModuleSymbols> {
        Ok(ModuleSymbols {
            library: Library::open_self().wrap_err("failed to open host executable")?,
            name: "<host>".to_string(),
        })
    }
}

impl SymbolSource for ModuleSymbols {
    fn find(&self, name: &str) -> Option<usize> {
        let symbol = unsafe { self.library.symbol::<*const c_void>(name) }.ok()?;
        let address = *symbol as usize;

        (address != 0).then_some(address)
    }
}

impl std::fmt::Debug for ModuleSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSymbols")
            .field("name", &self.name)
            .finish()
    }
}

/// Looks for `entry` in `source`, recording it in `entry_points` if found. Returns whether the
/// entry point is now known.
pub fn probe(source: &dyn SymbolSource, entry_points: &EntryPoints, entry: EntryPoint) -> bool {
    match source.find(entry.symbol()) {
        Some(address) => {
            if entry_points.record(entry, address) {
                log::debug!("found {} at {:#x}", entry.symbol(), address);
            }

            true
        }

        None => {
            if entry.is_optional() {
                log::info!("{} not found; it will be treated as unsupported", entry.symbol());
            } else {
                log::warn!("required function {} not found", entry.symbol());
            }

            entry_points.supports(entry)
        }
    }
}

/// Probes every entry point in `entries`, returning the ones that could not be found.
pub fn probe_all(
    source: &dyn SymbolSource,
    entry_points: &EntryPoints,
    entries: impl Iterator<Item = EntryPoint>,
) -> Vec<EntryPoint> {
    entries
        .filter(|&entry| !probe(source, entry_points, entry))
        .collect()
}

/// Probes the optional entry points on a background thread.
pub fn spawn_probe(
    source: Arc<dyn SymbolSource>,
    entry_points: Arc<EntryPoints>,
) -> std::thread::JoinHandle<Vec<EntryPoint>> {
    std::thread::spawn(move || {
        let missing = probe_all(source.as_ref(), &entry_points, EntryPoint::optional());

        log::info!(
            "optional engine functions probed; {} missing",
            missing.len()
        );

        missing
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    /// A symbol table backed by a map.
    #[derive(Default)]
    pub struct FakeSymbols(pub HashMap<&'static str, usize>);

    impl FakeSymbols {
        pub fn with(mut self, entry: EntryPoint, address: usize) -> FakeSymbols {
            self.0.insert(entry.symbol(), address);
            self
        }
    }

    impl SymbolSource for FakeSymbols {
        fn find(&self, name: &str) -> Option<usize> {
            self.0.get(name).copied()
        }
    }

    /// Entry points where everything has been found.
    pub fn all_supported() -> EntryPoints {
        let entry_points = EntryPoints::new();

        for (i, entry) in EntryPoint::iter().enumerate() {
            entry_points.record(entry, 0x1000 + i * 0x10);
        }

        entry_points
    }

    /// Entry points with every optional function missing.
    pub fn mandatory_only() -> EntryPoints {
        let entry_points = EntryPoints::new();

        for (i, entry) in EntryPoint::mandatory().enumerate() {
            entry_points.record(entry, 0x1000 + i * 0x10);
        }

        entry_points
    }
}
