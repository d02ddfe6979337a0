//! The plugin's own systems. These do not touch the engine.

pub mod settings;
