//! Descriptions of replacement audio.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{cache::AudioData, defaults::AudioConfig};

/// `CriAtomExFormat` values.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum AudioFormat {
    Adx = 0x1,
    Hca = 0x3,
    HcaMx = 0x4,
    Wave = 0x5,
    RawPcm = 0x6,
    Aiff = 0x7,
}

impl AudioFormat {
    /// Guesses the format from a file extension. Unknown extensions are treated as HCA, which is
    /// what almost every game uses.
    pub fn from_path(path: impl AsRef<Path>) -> AudioFormat {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
                "wav" => Some(AudioFormat::Wave),
                "aif" | "aiff" => Some(AudioFormat::Aiff),
                other => other.parse().ok(),
            })
            .unwrap_or(AudioFormat::Hca)
    }
}

/// Where the replacement audio comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioSource {
    File(PathBuf),

    /// Audio that is already in memory. The memory must outlive every player that uses it.
    Buffer(AudioData),
}

/// A piece of replacement audio and how it should be played.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAsset {
    /// The name the audio is known by, usually the cue it replaces.
    pub name: String,

    pub source: AudioSource,

    pub format: AudioFormat,
    pub sample_rate: i32,
    pub num_channels: i32,

    /// The volume to apply, or `None` to leave the volume alone.
    pub volume: Option<f32>,

    /// Whether `volume` should scale the player's own volume rather than a category's.
    pub use_player_volume: bool,

    /// The category to apply `volume` to, instead of the first category the audio is played in.
    pub volume_category_id: Option<u32>,

    /// The player that should play this audio, if not the player that requested it.
    pub player_id: Option<i32>,
}

impl AudioAsset {
    /// Creates an asset for the file at `path` with no volume changes. The format is guessed from
    /// the extension.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> AudioAsset {
        let path = path.into();

        AudioAsset {
            name: name.into(),
            format: AudioFormat::from_path(&path),
            source: AudioSource::File(path),
            sample_rate: 48000,
            num_channels: 2,
            volume: None,
            use_player_volume: false,
            volume_category_id: None,
            player_id: None,
        }
    }

    /// Applies the volume and player settings from `config`.
    pub fn configured(mut self, config: &AudioConfig) -> AudioAsset {
        self.volume = config.volume.and_then(volume_from_raw);
        self.use_player_volume = config.use_player_volume;
        self.volume_category_id = config.volume_category_id;
        self.player_id = config.player_id;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> AudioAsset {
        self.volume = volume_from_raw(volume);
        self
    }

    pub fn player_relative(mut self) -> AudioAsset {
        self.use_player_volume = true;
        self
    }

    /// Returns the path of the audio, if it comes from a file.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            AudioSource::File(path) => Some(path),
            AudioSource::Buffer(_) => None,
        }
    }
}

/// Converts a volume where negative values mean "no change" into an `Option`.
pub fn volume_from_raw(volume: f32) -> Option<f32> {
    (volume >= 0.0).then_some(volume)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_guessed_from_extension() {
        assert_eq!(AudioFormat::from_path("music/bgm_01.hca"), AudioFormat::Hca);
        assert_eq!(AudioFormat::from_path("music/bgm_01.ADX"), AudioFormat::Adx);
        assert_eq!(AudioFormat::from_path("music/bgm_01.wav"), AudioFormat::Wave);
        assert_eq!(AudioFormat::from_path("music/bgm_01"), AudioFormat::Hca);
    }

    #[test]
    fn negative_volume_means_no_override() {
        let asset = AudioAsset::from_file("bgm", "bgm.hca").with_volume(-1.0);
        assert_eq!(asset.volume, None);

        let asset = asset.with_volume(0.0);
        assert_eq!(asset.volume, Some(0.0));
    }

    #[test]
    fn config_is_applied() {
        let config = AudioConfig {
            volume: Some(0.35),
            category_ids: vec![11],
            volume_category_id: Some(4),
            player_id: Some(255),
            ..AudioConfig::default()
        };

        let asset = AudioAsset::from_file("bgm", "bgm.hca").configured(&config);

        assert_eq!(asset.volume, Some(0.35));
        assert_eq!(asset.volume_category_id, Some(4));
        assert_eq!(asset.player_id, Some(255));
        assert!(!asset.use_player_volume);
    }
}
