//! Audio files loaded into memory for games that can only play audio from memory.
//!
//! The engine keeps using a buffer for as long as a player is playing from it, so loaded files
//! are never freed. Each file is only loaded once.

use std::path::{Path, PathBuf};

use cached::proc_macro::cached;

use crate::error::{Error, Result};

/// A block of audio data in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioData {
    pub address: usize,
    pub size: usize,
}

impl AudioData {
    /// Wraps a buffer which lives for the rest of the program.
    pub fn from_static(bytes: &'static [u8]) -> AudioData {
        AudioData {
            address: bytes.as_ptr() as usize,
            size: bytes.len(),
        }
    }
}

#[cached(result = true)]
fn load_owned(path: PathBuf) -> Result<AudioData> {
    let bytes = std::fs::read(&path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;

    log::debug!("loaded {} bytes from {:?}", bytes.len(), path);

    Ok(AudioData::from_static(Box::leak(bytes.into_boxed_slice())))
}

/// Returns the contents of the file at `path`, loading it if it hasn't been loaded before.
pub fn load(path: impl AsRef<Path>) -> Result<AudioData> {
    load_owned(path.as_ref().to_path_buf())
}
