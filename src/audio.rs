//! Audio redirection: swapping the audio a player is about to play and overriding its volume.

pub mod asset;
pub mod cache;
pub mod defaults;
pub mod library;
pub mod service;
pub mod volume;
