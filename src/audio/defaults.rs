//! Per-game defaults. Each game mixes its music differently, so replacement audio needs different
//! volume handling depending on the game it's used in.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::meta::settings::Settings;

/// The games that need special treatment, identified by executable name.
#[derive(Clone, Debug, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Game {
    #[strum(serialize = "p5r")]
    Persona5Royal,

    #[strum(serialize = "p4g")]
    Persona4Golden,

    #[strum(serialize = "p3p")]
    Persona3Portable,

    #[strum(serialize = "p3r")]
    Persona3Reload,

    #[strum(serialize = "SMT5V-Win64-Shipping")]
    ShinMegamiTensei5Vengeance,

    #[strum(serialize = "likeadragon8")]
    LikeADragon8,

    #[strum(serialize = "likeadragongaiden")]
    LikeADragonGaiden,

    #[strum(serialize = "LostJudgment")]
    LostJudgment,

    #[strum(serialize = "likeadragonpirates")]
    LikeADragonPirates,

    #[strum(serialize = "RainCodePlus-Win64-Shipping")]
    RainCodePlus,

    /// Any game without its own defaults.
    #[strum(default)]
    Other(String),
}

impl Game {
    /// Identifies the game from its executable name (without the extension).
    pub fn from_exe_stem(stem: &str) -> Game {
        // `Game::Other` catches everything, so parsing can't fail.
        stem.parse().unwrap_or_else(|_| Game::Other(stem.to_string()))
    }

    /// Identifies the game that we are running inside.
    pub fn current() -> Game {
        let stem = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();

        Game::from_exe_stem(&stem)
    }
}

/// How replacement audio should be played when the audio itself doesn't say.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// The cue sheet the audio belongs to.
    pub acb_name: Option<String>,

    pub volume: Option<f32>,
    pub use_player_volume: bool,

    /// Categories the audio is played in.
    pub category_ids: Vec<u32>,

    pub volume_category_id: Option<u32>,
    pub player_id: Option<i32>,
}

impl AudioConfig {
    /// Returns the default configuration for `game`. Games without their own defaults use the
    /// default volume from `settings`, if there is one.
    pub fn for_game(game: &Game, settings: &Settings) -> AudioConfig {
        match game {
            Game::Persona5Royal | Game::Persona3Portable => AudioConfig {
                use_player_volume: true,
                ..Default::default()
            },

            Game::Persona3Reload => AudioConfig {
                acb_name: Some("bgm".to_string()),
                volume: Some(0.15),
                ..Default::default()
            },

            Game::ShinMegamiTensei5Vengeance => AudioConfig {
                acb_name: Some("bgm".to_string()),
                volume: Some(0.70),
                volume_category_id: Some(4),
                ..Default::default()
            },

            Game::LikeADragon8 | Game::LikeADragonGaiden | Game::LostJudgment => AudioConfig {
                category_ids: vec![11],
                volume: Some(0.35),
                ..Default::default()
            },

            Game::LikeADragonPirates => AudioConfig {
                category_ids: vec![11],
                volume: Some(1.0),
                ..Default::default()
            },

            Game::RainCodePlus => AudioConfig {
                volume: Some(0.35),
                ..Default::default()
            },

            Game::Persona4Golden | Game::Other(_) => AudioConfig {
                volume: settings.default_volume,
                ..Default::default()
            },
        }
    }
}

/// Settings for the players a game creates. Fields not set by a game are zero, which the engine
/// treats as its own default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerConfig {
    pub voice_allocation_method: i32,
    pub max_path_strings: i32,
    pub max_path: i32,
    pub enable_audio_synced_timer: bool,
    pub updates_time: bool,
}

/// Returns the id of the player that `game` plays music with and the configuration it needs for
/// file playback to work. Games that need no changes return `None`.
pub fn player_config(game: &Game) -> Option<(i32, PlayerConfig)> {
    let config = match game {
        Game::Persona5Royal => (
            255,
            PlayerConfig {
                max_path_strings: 2,
                max_path: 256,
                enable_audio_synced_timer: true,
                updates_time: true,
                ..Default::default()
            },
        ),

        Game::Persona4Golden => (
            0,
            PlayerConfig {
                max_path_strings: 2,
                voice_allocation_method: 1,
                max_path: 256,
                ..Default::default()
            },
        ),

        Game::Persona3Portable => (
            2,
            PlayerConfig {
                max_path_strings: 10,
                voice_allocation_method: 1,
                max_path: 256,
                ..Default::default()
            },
        ),

        _ => return None,
    };

    Some(config)
}

/// Victory themes in P3R have their own cue names.
const P3R_VICTORY_IDS: [u32; 5] = [5, 11, 27, 37, 44];

/// Converts the name of a "link" cue (a cue which only exists to point at another) into the name
/// of the cue it stands for, so the same replacement works for both.
pub fn link_cue(game: &Game, acb: &str, cue: &str) -> String {
    if acb != "bgm" {
        return cue.to_string();
    }

    match game {
        Game::Persona5Royal => cue.replace("link", "bgm"),
        Game::Persona3Reload => p3r_link_cue(cue),
        _ => cue.to_string(),
    }
}

fn p3r_link_cue(cue: &str) -> String {
    let bgm_id = match cue.split_once('_') {
        Some((_, id)) if !id.contains('_') => id.parse::<u32>().ok(),
        _ => None,
    };

    match bgm_id {
        Some(id @ 1000..=1999) => {
            let adjusted = id - 1000;

            match P3R_VICTORY_IDS.iter().position(|&victory| victory == adjusted) {
                Some(index) => format!("Sound_Result_{:02}", index + 1),
                None => format!("Sound_{adjusted:02}"),
            }
        }

        Some(id) if id >= 2000 => format!("EA_Sound_{:02}", id - 2000),

        _ => cue.replace("link_", ""),
    }
}
