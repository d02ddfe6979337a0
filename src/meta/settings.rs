use std::{
    fs::File,
    io::Read,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::asset::volume_from_raw;

/// How much gets logged.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Logs every redirect, for people making replacement audio.
    #[serde(default)]
    pub dev_mode: bool,

    /// The volume for replacement audio in games that have no defaults of their own. Negative
    /// values are the same as no value.
    #[serde(default)]
    pub default_volume: Option<f32>,
}

impl Settings {
    /// Attempts to parse the contents of `reader` to get a `Settings` value.
    fn parse_json(reader: impl Read) -> Result<Settings> {
        let mut settings: Settings = serde_json::from_reader(reader)?;
        settings.default_volume = settings.default_volume.and_then(volume_from_raw);

        Ok(settings)
    }

    /// Returns a mutex guard around the global settings value.
    fn global_mut() -> MutexGuard<'static, Option<Settings>> {
        lazy_static::lazy_static! {
            static ref SETTINGS: Mutex<Option<Settings>> = Mutex::new(None);
        }

        SETTINGS.lock().expect("Failed to lock settings")
    }

    /// Returns the current settings. These are the defaults until settings have been loaded.
    pub fn get() -> Settings {
        Settings::global_mut().clone().unwrap_or_default()
    }

    /// Replaces the global settings.
    pub fn set(settings: Settings) {
        *Settings::global_mut() = Some(settings);
    }

    /// Looks for a settings file and loads it.
    fn load_from_file(path: &Path) -> Result<Option<Settings>> {
        if !path.exists() {
            // This isn't an error, but we didn't find any settings.
            return Ok(None);
        }

        let file = File::open(path).wrap_err("failed to open settings file")?;
        Ok(Some(Settings::parse_json(file)?))
    }

    /// Either loads the settings from `path` or generates default values for them.
    pub fn load(path: impl AsRef<Path>) -> Settings {
        match Settings::load_from_file(path.as_ref()) {
            Ok(Some(settings)) => return settings,

            Ok(None) => log::info!("No settings file found. Defaults will be used."),

            Err(err) => {
                log::error!("Error loading settings file: {err:?}. Defaults will be used.")
            }
        };

        Settings::default()
    }

    /// Saves the settings to a file, returning any errors encountered.
    fn try_save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .wrap_err_with(|| format!("failed to write {path:?}"))?;

        Ok(())
    }

    /// Saves the settings to a file. Errors will be logged.
    pub fn save(&self, path: impl AsRef<Path>) {
        if let Err(err) = self.try_save(path.as_ref()) {
            log::error!("Error saving settings to file: {err:?}.");
        } else {
            log::info!("Settings saved.");
        }
    }

    /// Loads the settings from `path` and stores them globally.
    pub fn init_global(path: impl AsRef<Path>) -> Settings {
        let settings = Settings::load(path);
        Settings::set(settings.clone());
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.json"));

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            log_level: LogLevel::Debug,
            dev_mode: true,
            default_volume: Some(0.5),
        };

        settings.save(&path);
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings = Settings::parse_json(r#"{ "dev_mode": true }"#.as_bytes()).unwrap();

        assert!(settings.dev_mode);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.default_volume, None);
    }

    #[test]
    fn negative_default_volume_is_ignored() {
        let settings = Settings::parse_json(r#"{ "default_volume": -1.0 }"#.as_bytes()).unwrap();
        assert_eq!(settings.default_volume, None);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load(&path), Settings::default());
    }
}
