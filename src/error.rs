//! Errors that stop a single redirect. None of them are fatal; the public entry points log them
//! and return.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The game has neither file nor data substitution, so new audio can't be played.
    #[error("no supported method for playing new audio")]
    NoSubstitution,

    #[error("no audio named '{0}'")]
    AssetNotFound(String),

    #[error("no player with ID {0}")]
    PlayerNotFound(i32),

    #[error("path {0:?} can't be passed to the engine")]
    InvalidPath(PathBuf),

    #[error("failed to load audio from {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
