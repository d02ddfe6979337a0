//! The parts of the CRI AtomEx engine that we talk to. The engine is linked into the host
//! application, so everything here works in terms of addresses found at runtime.

pub mod engine;
pub mod probe;
pub mod registry;
pub mod version;

/// An opaque `CriAtomExPlayerHn`. We never create or destroy the player behind it.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayerHandle(pub usize);

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A live AtomEx player, as tracked by a [`registry::PlayerRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Player {
    /// The ID the registry uses for this player. Audio configurations refer to players by ID.
    pub id: i32,

    /// The engine's handle for this player.
    pub handle: PlayerHandle,
}

impl Player {
    pub fn new(id: i32, handle: PlayerHandle) -> Player {
        Player { id, handle }
    }
}
