//! The replacement audio available to the redirector, by name.

use std::sync::Mutex;

use case_insensitive_hashmap::CaseInsensitiveHashMap;

use super::asset::AudioAsset;

/// Looks up replacement audio by name.
pub trait AudioResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<AudioAsset>;
}

/// A case-insensitive collection of replacement audio.
pub struct AudioLibrary {
    assets: Mutex<CaseInsensitiveHashMap<AudioAsset>>,
}

impl Default for AudioLibrary {
    fn default() -> Self {
        AudioLibrary {
            assets: Mutex::new(CaseInsensitiveHashMap::new()),
        }
    }
}

impl AudioLibrary {
    pub fn new() -> AudioLibrary {
        AudioLibrary::default()
    }

    fn assets(&self) -> std::sync::MutexGuard<'_, CaseInsensitiveHashMap<AudioAsset>> {
        self.assets.lock().expect("Failed to lock audio library")
    }

    /// Adds `asset` under its name. Later assets replace earlier ones with the same name.
    pub fn insert(&self, asset: AudioAsset) {
        let name = asset.name.clone();

        if self.assets().insert(name.as_str(), asset).is_some() {
            log::info!("replacement for '{name}' overridden by a later one");
        }
    }

    pub fn remove(&self, name: &str) -> Option<AudioAsset> {
        self.assets().remove(name)
    }

    pub fn len(&self) -> usize {
        self.assets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioResolver for AudioLibrary {
    fn resolve(&self, name: &str) -> Option<AudioAsset> {
        self.assets().get(name).cloned()
    }
}
