//! Redirects players to replacement audio.

use std::{ffi::CString, sync::Arc};

use crate::{
    atom::{
        engine::AtomEngine,
        probe::{EntryPoint, EntryPoints},
        registry::PlayerRegistry,
        Player,
    },
    error::{Error, Result},
};

use super::{
    asset::{AudioAsset, AudioSource},
    cache,
    library::AudioResolver,
    volume::VolumeOverrides,
};

/// The interface the rest of the plugin uses to play replacement audio.
pub struct AudioService<E, R> {
    engine: Arc<E>,
    entry_points: Arc<EntryPoints>,
    registry: Arc<R>,
    volumes: Arc<VolumeOverrides<E>>,
    dev_mode: bool,
}

impl<E: AtomEngine, R: PlayerRegistry> AudioService<E, R> {
    pub fn new(
        engine: Arc<E>,
        entry_points: Arc<EntryPoints>,
        registry: Arc<R>,
        volumes: Arc<VolumeOverrides<E>>,
    ) -> AudioService<E, R> {
        AudioService {
            engine,
            entry_points,
            registry,
            volumes,
            dev_mode: false,
        }
    }

    /// In dev mode every redirect is logged as info rather than debug.
    pub fn set_dev_mode(&mut self, dev_mode: bool) {
        self.dev_mode = dev_mode;
    }

    pub fn volumes(&self) -> &VolumeOverrides<E> {
        &self.volumes
    }

    /// Makes `player` play `asset` instead of what it was going to play. `categories` are the
    /// categories the audio should be played in. Failures are logged, and never affect the game
    /// beyond the audio not being replaced.
    pub fn set_audio(&self, player: Player, asset: &AudioAsset, categories: &[u32]) {
        if let Err(err) = self.try_set_audio(player, asset, categories) {
            log::error!("unable to redirect '{}': {}", asset.name, err);
        }
    }

    /// The same as `set_audio`, but returns the reason for any failure.
    ///
    /// If the game can't play new audio at all, nothing is changed. If loading the audio fails,
    /// the player is left however the engine leaves it.
    pub fn try_set_audio(
        &self,
        player: Player,
        asset: &AudioAsset,
        categories: &[u32],
    ) -> Result<()> {
        let (target, manual_start) = self.target_player(player, asset);

        self.substitute(target, asset)?;

        self.volumes.apply(target, asset, categories);

        self.engine.player_set_format(target.handle, asset.format);
        self.engine.player_set_sampling_rate(target.handle, asset.sample_rate);
        self.engine.player_set_num_channels(target.handle, asset.num_channels);

        // Categories belong to the requesting player, even when another player plays the audio.
        for &category in categories {
            self.engine.player_set_category_by_id(player.handle, category);
        }

        // The game only starts the player it asked to play, so a different player has to be
        // started by us.
        if manual_start {
            self.engine.player_start(target.handle);
            log::debug!("manually started player {}", target.id);
        }

        let source = match &asset.source {
            AudioSource::File(path) => path.display().to_string(),
            AudioSource::Buffer(data) => format!("{} bytes at {:#x}", data.size, data.address),
        };

        if self.dev_mode {
            log::info!("redirected '{}' to {}", asset.name, source);
        } else {
            log::debug!("redirected '{}' to {}", asset.name, source);
        }

        Ok(())
    }

    /// Finds the player that should play `asset`. The second value is `true` if the player is not
    /// the one that was asked to play.
    fn target_player(&self, player: Player, asset: &AudioAsset) -> (Player, bool) {
        let id = match asset.player_id {
            Some(id) if id != player.id => id,
            _ => return (player, false),
        };

        match self.registry.player_by_id(id) {
            Some(other) => (other, true),
            None => {
                log::warn!(
                    "can't switch player for '{}': {}; using player {}",
                    asset.name,
                    Error::PlayerNotFound(id),
                    player.id
                );

                (player, false)
            }
        }
    }

    /// Gives the audio from `asset` to `player`, using file playback if the game supports it and
    /// playback from memory otherwise.
    fn substitute(&self, player: Player, asset: &AudioAsset) -> Result<()> {
        let set_file = self.entry_points.supports(EntryPoint::PlayerSetFile);
        let set_data = self.entry_points.supports(EntryPoint::PlayerSetData);

        match &asset.source {
            AudioSource::File(path) if set_file => {
                let c_path = CString::new(path.to_string_lossy().into_owned())
                    .map_err(|_| Error::InvalidPath(path.clone()))?;

                self.engine.player_set_file(player.handle, &c_path);
            }

            AudioSource::File(path) if set_data => {
                let data = cache::load(path)?;
                self.engine.player_set_data(player.handle, data);
            }

            AudioSource::Buffer(data) if set_data => {
                self.engine.player_set_data(player.handle, *data);
            }

            _ => return Err(Error::NoSubstitution),
        }

        Ok(())
    }

    /// Plays the audio called `name` from `resolver` on `player`.
    pub fn redirect_by_name(
        &self,
        resolver: &dyn AudioResolver,
        player: Player,
        name: &str,
        categories: &[u32],
    ) {
        match resolver.resolve(name) {
            Some(asset) => self.set_audio(player, &asset, categories),
            None => log::warn!("{}", Error::AssetNotFound(name.to_string())),
        }
    }

    /// Undoes the volume changes made for `player` and the categories in `category_ids`. This
    /// should be called when the player goes back to its own audio.
    pub fn reset_custom_volumes(&self, player: Player, category_ids: &[u32]) {
        self.volumes.restore(player, category_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        atom::{
            engine::testing::{Call, FakeEngine},
            probe::testing::{all_supported, mandatory_only},
            registry::AtomRegistry,
            PlayerHandle,
        },
        audio::{cache::AudioData, library::AudioLibrary},
    };
    use std::io::Write;

    const PLAYER: Player = Player {
        id: 1,
        handle: PlayerHandle(0x100),
    };

    const OTHER: Player = Player {
        id: 255,
        handle: PlayerHandle(0x200),
    };

    struct Fixture {
        engine: Arc<FakeEngine>,
        entry_points: Arc<EntryPoints>,
        service: AudioService<FakeEngine, AtomRegistry>,
    }

    fn setup(entry_points: EntryPoints) -> Fixture {
        let engine = Arc::new(FakeEngine::new());
        let entry_points = Arc::new(entry_points);
        let registry = Arc::new(AtomRegistry::new());
        registry.register(PLAYER);
        registry.register(OTHER);

        let volumes = Arc::new(VolumeOverrides::new(engine.clone(), entry_points.clone()));

        Fixture {
            service: AudioService::new(engine.clone(), entry_points.clone(), registry, volumes),
            engine,
            entry_points,
        }
    }

    fn asset() -> AudioAsset {
        let mut asset = AudioAsset::from_file("bgm_01", "/mods/bgm_01.hca");
        asset.sample_rate = 44100;
        asset.num_channels = 2;
        asset
    }

    fn format_calls(player: PlayerHandle, asset: &AudioAsset) -> Vec<Call> {
        vec![
            Call::SetFormat(player, asset.format),
            Call::SetSamplingRate(player, asset.sample_rate),
            Call::SetNumChannels(player, asset.num_channels),
        ]
    }

    #[test]
    fn file_substitution_is_preferred() {
        let fixture = setup(all_supported());
        let asset = asset();

        fixture.service.try_set_audio(PLAYER, &asset, &[]).unwrap();

        let mut expected = vec![Call::SetFile(PLAYER.handle, "/mods/bgm_01.hca".to_string())];
        expected.extend(format_calls(PLAYER.handle, &asset));

        assert_eq!(fixture.engine.take_calls(), expected);
    }

    #[test]
    fn data_substitution_is_used_without_file_support() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4]).unwrap();

        let entry_points = mandatory_only();
        entry_points.record(EntryPoint::PlayerSetData, 0x10);

        let fixture = setup(entry_points);
        let asset = AudioAsset::from_file("bgm_02", file.path());

        fixture.service.try_set_audio(PLAYER, &asset, &[]).unwrap();

        let calls = fixture.engine.take_calls();
        match &calls[0] {
            Call::SetData(handle, data) => {
                assert_eq!(*handle, PLAYER.handle);
                assert_eq!(data.size, 4);
            }
            other => panic!("expected data substitution, got {other:?}"),
        }

        assert_eq!(calls[1..], format_calls(PLAYER.handle, &asset)[..]);
    }

    #[test]
    fn buffers_need_data_support() {
        static BYTES: [u8; 3] = [7, 8, 9];

        let mut asset = asset();
        asset.source = AudioSource::Buffer(AudioData::from_static(&BYTES));

        let fixture = setup(all_supported());
        fixture.service.try_set_audio(PLAYER, &asset, &[]).unwrap();
        assert_eq!(
            fixture.engine.take_calls()[0],
            Call::SetData(PLAYER.handle, AudioData::from_static(&BYTES))
        );

        let entry_points = mandatory_only();
        entry_points.record(EntryPoint::PlayerSetFile, 0x10);

        let fixture = setup(entry_points);
        assert!(matches!(
            fixture.service.try_set_audio(PLAYER, &asset, &[]),
            Err(Error::NoSubstitution)
        ));
    }

    #[test]
    fn nothing_happens_without_substitution_support() {
        let fixture = setup(mandatory_only());
        let asset = asset().with_volume(0.5);

        assert!(matches!(
            fixture.service.try_set_audio(PLAYER, &asset, &[11]),
            Err(Error::NoSubstitution)
        ));

        // The public entry point swallows the error.
        fixture.service.set_audio(PLAYER, &asset, &[11]);

        assert!(fixture.engine.take_calls().is_empty());
        assert_eq!(fixture.service.volumes().saved_category_volume(11), None);
    }

    #[test]
    fn substitution_support_can_arrive_late() {
        let fixture = setup(mandatory_only());
        let asset = asset();

        fixture.service.set_audio(PLAYER, &asset, &[]);
        assert!(fixture.engine.take_calls().is_empty());

        fixture.entry_points.record(EntryPoint::PlayerSetFile, 0x10);

        fixture.service.set_audio(PLAYER, &asset, &[]);
        assert_eq!(fixture.engine.take_calls().len(), 4);
    }

    #[test]
    fn load_failures_are_io_errors() {
        let entry_points = mandatory_only();
        entry_points.record(EntryPoint::PlayerSetData, 0x10);

        let fixture = setup(entry_points);
        let dir = tempfile::tempdir().unwrap();
        let asset = AudioAsset::from_file("missing", dir.path().join("missing.hca"));

        assert!(matches!(
            fixture.service.try_set_audio(PLAYER, &asset, &[]),
            Err(Error::Io { .. })
        ));
        assert!(fixture.engine.take_calls().is_empty());
    }

    #[test]
    fn categories_and_volume_are_applied() {
        let fixture = setup(all_supported());
        fixture.engine.preset_category_volume(11, 0.8);

        let asset = asset().with_volume(0.35);
        fixture.service.set_audio(PLAYER, &asset, &[11, 12]);

        let mut expected = vec![
            Call::SetFile(PLAYER.handle, "/mods/bgm_01.hca".to_string()),
            Call::GetCategoryVolume(11),
            Call::SetCategoryVolume(11, 0.35),
        ];
        expected.extend(format_calls(PLAYER.handle, &asset));
        expected.push(Call::SetCategory(PLAYER.handle, 11));
        expected.push(Call::SetCategory(PLAYER.handle, 12));

        assert_eq!(fixture.engine.take_calls(), expected);

        fixture.service.reset_custom_volumes(PLAYER, &[11, 12]);
        assert_eq!(
            fixture.engine.take_calls(),
            vec![Call::SetCategoryVolume(11, 0.8)]
        );
    }

    #[test]
    fn audio_for_another_player_is_started_manually() {
        let fixture = setup(all_supported());

        let mut asset = asset().with_volume(0.5).player_relative();
        asset.player_id = Some(OTHER.id);

        fixture.service.set_audio(PLAYER, &asset, &[3]);

        let mut expected = vec![
            Call::SetFile(OTHER.handle, "/mods/bgm_01.hca".to_string()),
            Call::SetVolume(OTHER.handle, 0.5),
        ];
        expected.extend(format_calls(OTHER.handle, &asset));
        expected.push(Call::SetCategory(PLAYER.handle, 3));
        expected.push(Call::Start(OTHER.handle));

        assert_eq!(fixture.engine.take_calls(), expected);
        assert!(fixture.service.volumes().is_modified(OTHER.handle));
    }

    #[test]
    fn same_or_unknown_player_is_not_started() {
        let fixture = setup(all_supported());

        let mut asset = asset();
        asset.player_id = Some(PLAYER.id);
        fixture.service.set_audio(PLAYER, &asset, &[]);

        asset.player_id = Some(77);
        fixture.service.set_audio(PLAYER, &asset, &[]);

        let calls = fixture.engine.take_calls();
        assert_eq!(calls.len(), 8);
        assert!(!calls.iter().any(|call| matches!(call, Call::Start(_))));
        assert!(calls
            .iter()
            .all(|call| !matches!(call, Call::SetFile(handle, _) if *handle != PLAYER.handle)));
    }

    #[test]
    fn redirect_by_name_uses_library() {
        let fixture = setup(all_supported());
        let library = AudioLibrary::new();
        library.insert(asset());

        fixture
            .service
            .redirect_by_name(&library, PLAYER, "BGM_01", &[]);
        assert_eq!(fixture.engine.take_calls().len(), 4);

        fixture
            .service
            .redirect_by_name(&library, PLAYER, "bgm_99", &[]);
        assert!(fixture.engine.take_calls().is_empty());
    }

    #[test]
    fn relative_override_follows_game_fades() {
        let fixture = setup(all_supported());
        let volumes = fixture.service.volumes();

        volumes.on_set_volume(PLAYER.handle, 0.8);
        fixture
            .service
            .set_audio(PLAYER, &asset().with_volume(0.5).player_relative(), &[]);
        fixture.engine.take_calls();

        volumes.on_set_volume(PLAYER.handle, 0.6);
        let forwarded = fixture.engine.volumes_for(PLAYER.handle);
        approx::assert_relative_eq!(forwarded[0], 0.3);

        fixture.service.reset_custom_volumes(PLAYER, &[]);
        fixture.engine.take_calls();

        volumes.on_set_volume(PLAYER.handle, 0.6);
        assert_eq!(fixture.engine.take_calls(), vec![Call::SetVolume(PLAYER.handle, 0.6)]);
    }
}
