//! Replaces audio played through CRI AtomEx and overrides its volume, without modifying the game.
//!
//! The plugin host calls [`init`] once, before the game creates any players. After that, the host
//! glue decides what to replace and calls [`Plugin::set_audio`] and
//! [`Plugin::reset_custom_volumes`].

use std::{path::PathBuf, sync::Arc};

use eyre::{eyre, Result};
use once_cell::sync::OnceCell;

pub mod atom;
pub mod audio;
pub mod error;
pub mod hook;
mod logging;
pub mod meta;

use atom::{
    engine::NativeEngine,
    probe::{self, EntryPoint, EntryPoints, ModuleSymbols, SymbolSource},
    registry::AtomRegistry,
    version::EngineVersion,
    Player,
};
use audio::{
    asset::AudioAsset,
    defaults::{self, AudioConfig, Game, PlayerConfig},
    library::AudioLibrary,
    service::AudioService,
    volume::{self, VolumeOverrides},
};
use meta::settings::Settings;

/// Where to find things at startup.
pub struct InitOptions {
    /// Where settings, logs and panic reports live.
    pub data_dir: PathBuf,

    /// The module that exports the engine functions. `None` means the game executable.
    pub engine_module: Option<PathBuf>,

    /// The hooking library to use.
    pub hook_library: String,

    /// The engine's build banner, if the host found it.
    pub build_banner: Option<String>,
}

/// Everything set up by [`init`].
pub struct Plugin {
    pub game: Game,

    /// The defaults for replacement audio in this game.
    pub audio_config: AudioConfig,

    /// The player the game plays music with and the settings it must be created with, if the
    /// game's own settings don't allow file playback.
    pub player_config: Option<(i32, PlayerConfig)>,

    /// The offset of the cue sheet name within the engine's ACB structure.
    pub acb_name_offset: usize,

    pub registry: Arc<AtomRegistry>,
    pub library: Arc<AudioLibrary>,
    pub service: AudioService<NativeEngine, AtomRegistry>,
}

impl Plugin {
    pub fn set_audio(&self, player: Player, asset: &AudioAsset, categories: &[u32]) {
        self.service.set_audio(player, asset, categories);
    }

    pub fn reset_custom_volumes(&self, player: Player, category_ids: &[u32]) {
        self.service.reset_custom_volumes(player, category_ids);
    }
}

static PLUGIN: OnceCell<Plugin> = OnceCell::new();

/// Returns the plugin, if it has been set up.
pub fn plugin() -> Option<&'static Plugin> {
    PLUGIN.get()
}

/// Sets up logging, finds the engine functions and hooks the engine. Optional engine functions
/// are searched for in the background, so some features may only become available after this
/// returns.
pub fn init(options: InitOptions) -> Result<&'static Plugin> {
    if PLUGIN.get().is_some() {
        return Err(eyre!("already initialised"));
    }

    let settings = Settings::init_global(options.data_dir.join("settings.atomswap.json"));
    logging::init(
        options.data_dir.join("atomswap.log"),
        settings.log_level.filter(),
    )?;

    log::info!("Cargo package version is {}", env!("CARGO_PKG_VERSION"));
    log::info!("Settings: {settings:#?}");

    let game = Game::current();
    log::info!("Game: {game:?}");

    let acb_name_offset = match options.build_banner.as_deref().map(EngineVersion::parse) {
        Some(Ok(version)) => {
            log::info!("AtomEx version: {version}");
            version.acb_name_offset()
        }

        Some(Err(err)) => {
            log::warn!("{err:?}");
            EngineVersion::default_acb_name_offset()
        }

        None => EngineVersion::default_acb_name_offset(),
    };

    let symbols: Arc<dyn SymbolSource> = match &options.engine_module {
        Some(path) => Arc::new(ModuleSymbols::open(path)?),
        None => Arc::new(ModuleSymbols::host()?),
    };

    let entry_points = Arc::new(EntryPoints::new());
    let missing = probe::probe_all(symbols.as_ref(), &entry_points, EntryPoint::mandatory());

    if missing.contains(&EntryPoint::PlayerSetVolume) {
        return Err(eyre!(
            "{} is required and was not found",
            EntryPoint::PlayerSetVolume.symbol()
        ));
    }

    let engine = Arc::new(NativeEngine::new(entry_points.clone()));
    let volumes = Arc::new(VolumeOverrides::new(engine.clone(), entry_points.clone()));

    volume::install_hook(
        &hook::SubstrateBackend::new(options.hook_library),
        volumes.clone(),
    )?;

    // Nothing waits for this; callers check for support each time they need it.
    probe::spawn_probe(symbols, entry_points.clone());

    let registry = Arc::new(AtomRegistry::new());

    let mut service = AudioService::new(engine, entry_points, registry.clone(), volumes);
    service.set_dev_mode(settings.dev_mode);

    let player_config = defaults::player_config(&game);

    if let Some((id, config)) = &player_config {
        log::info!("player {id} needs config {config:?}");
    }

    let plugin = Plugin {
        audio_config: AudioConfig::for_game(&game, &settings),
        player_config,
        game,
        acb_name_offset,
        registry,
        library: Arc::new(AudioLibrary::new()),
        service,
    };

    PLUGIN
        .set(plugin)
        .map_err(|_| eyre!("initialised concurrently"))?;

    log::info!("Ready.");

    PLUGIN.get().ok_or_else(|| eyre!("plugin vanished"))
}
