//! Control side of real-time playback.
//!
//! [`Player`] never touches the engine. It plans seeks and edits on the
//! calling thread, hands the results to the [`RenderDriver`] through a
//! command queue and reads the cursor back from an atomic snapshot. The host
//! calls [`Player::pump`] from its own loop to free returned payloads and
//! deliver observer callbacks.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use slotmap::{new_key_type, SlotMap};
use tl_engine::{find_subsongs, Engine, LoadedModule, RenderParam, RenderSettings, SeekTarget, Subsong};
use tl_ir::{Cell, Module, PlaybackPosition};

use crate::config::PlayerConfig;
use crate::edit::{self, PatternEdit};
use crate::error::PlayerError;
use crate::module_player::{load_options, ModuleInfo};
use crate::realtime::{Command, Garbage, RenderDriver, Report, Shared};

new_key_type! {
    /// Handle to a module stored in a [`Player`].
    pub struct ModuleKey;
}

/// Playback notifications, delivered from [`Player::pump`].
pub trait PlayerObserver {
    fn on_start(&mut self) {}
    fn on_stop(&mut self) {}
    fn on_position(&mut self, _position: &PlaybackPosition) {}
    fn on_error(&mut self, _error: &PlayerError) {}
}

struct Entry {
    module: Arc<Module>,
    subsongs: Vec<Subsong>,
}

pub struct Player {
    config: PlayerConfig,
    settings: RenderSettings,
    modules: SlotMap<ModuleKey, Entry>,
    active: Option<ModuleKey>,
    subsong: usize,
    /// The render side reported the end of the song
    ended: bool,
    /// Cursor-moving commands sent; matches the driver's count once applied
    epoch: u32,
    commands: HeapProd<Command>,
    garbage: HeapCons<Garbage>,
    reports: HeapCons<Report>,
    shared: Arc<Shared>,
    observers: Vec<Box<dyn PlayerObserver>>,
    last_position: Option<Instant>,
}

impl Player {
    /// Create a player and the driver to run on the audio thread.
    pub fn new(config: PlayerConfig) -> (Player, RenderDriver) {
        let capacity = config.queue_capacity.max(1);
        let (commands, command_rx) = HeapRb::<Command>::new(capacity).split();
        // Loads and seeks each return one payload; leave room for a backlog
        let (garbage_tx, garbage) = HeapRb::<Garbage>::new(capacity * 2).split();
        let (report_tx, reports) = HeapRb::<Report>::new(capacity).split();
        let shared = Arc::new(Shared::default());

        let mut settings = config.render.clone();
        settings.sanitize();
        let engine = Engine::with_settings(config.sample_rate, settings.clone());
        let driver = RenderDriver::new(
            engine,
            config.block_frames,
            command_rx,
            garbage_tx,
            report_tx,
            shared.clone(),
        );

        let player = Player {
            config,
            settings,
            modules: SlotMap::with_key(),
            active: None,
            subsong: 0,
            ended: false,
            epoch: 0,
            commands,
            garbage,
            reports,
            shared,
            observers: Vec::new(),
            last_position: None,
        };
        (player, driver)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn send(&mut self, command: Command) -> Result<(), PlayerError> {
        self.collect_garbage();
        let moves_cursor = command.moves_cursor();
        self.commands
            .try_push(command)
            .map_err(|_| PlayerError::QueueFull)?;
        if moves_cursor {
            self.epoch = self.epoch.wrapping_add(1);
        }
        Ok(())
    }

    fn collect_garbage(&mut self) {
        while self.garbage.try_pop().is_some() {}
    }

    fn entry(&self, key: ModuleKey) -> Result<&Entry, PlayerError> {
        self.modules.get(key).ok_or(PlayerError::NotLoaded)
    }

    fn active_entry(&self) -> Result<&Entry, PlayerError> {
        self.entry(self.active.ok_or(PlayerError::NotLoaded)?)
    }

    fn start_order(&self) -> Result<(Arc<Module>, usize), PlayerError> {
        let entry = self.active_entry()?;
        let start = entry.subsongs.get(self.subsong).map_or(0, |s| s.start_order);
        Ok((entry.module.clone(), start))
    }

    // --- Module arena ---

    /// Parse a module into the arena. It does not play until selected.
    pub fn load(&mut self, data: &[u8]) -> Result<ModuleKey, PlayerError> {
        let module = tl_formats::load_module_with(data, &load_options(&self.settings))?;
        Ok(self.load_module(module))
    }

    pub fn load_module(&mut self, module: Module) -> ModuleKey {
        let subsongs = find_subsongs(&module);
        log::info!(
            "stored \"{}\" ({}, {} subsong(s))",
            module.title,
            module.format.short_name(),
            subsongs.len()
        );
        self.modules.insert(Entry {
            module: Arc::new(module),
            subsongs,
        })
    }

    pub fn module(&self, key: ModuleKey) -> Option<&Arc<Module>> {
        self.modules.get(key).map(|e| &e.module)
    }

    pub fn module_info(&self, key: ModuleKey) -> Option<ModuleInfo> {
        let entry = self.modules.get(key)?;
        let subsong = if self.active == Some(key) { self.subsong } else { 0 };
        Some(ModuleInfo::new(&entry.module, &entry.subsongs, subsong))
    }

    pub fn active(&self) -> Option<ModuleKey> {
        self.active
    }

    /// Make `key` the playing module, starting at its first subsong.
    pub fn select(&mut self, key: ModuleKey) -> Result<(), PlayerError> {
        let entry = self.entry(key)?;
        let start = entry.subsongs.first().map_or(0, |s| s.start_order);
        let loaded = Box::new(LoadedModule::new(entry.module.clone(), start));
        self.send(Command::Load(loaded))?;
        self.active = Some(key);
        self.subsong = 0;
        self.ended = false;
        Ok(())
    }

    /// Drop a module from the arena, stopping it first if it is playing.
    pub fn unload(&mut self, key: ModuleKey) -> Result<(), PlayerError> {
        self.entry(key)?;
        if self.active == Some(key) {
            self.send(Command::Unload)?;
            self.active = None;
            self.stop();
        }
        self.modules.remove(key);
        Ok(())
    }

    // --- Transport ---

    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.active_entry()?;
        if self.ended {
            self.select_subsong(self.subsong)?;
        }
        if !self.shared.playing.swap(true, Ordering::AcqRel) {
            self.last_position = None;
            for observer in &mut self.observers {
                observer.on_start();
            }
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.shared.playing.swap(false, Ordering::AcqRel) {
            for observer in &mut self.observers {
                observer.on_stop();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    // --- Seeking ---

    /// Seek the active module. Returns the time actually reached.
    pub fn seek_seconds(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        let (module, start) = self.start_order()?;
        let target = SeekTarget::seconds_target(&module, start, seconds, &self.settings);
        self.send_seek(target)
    }

    pub fn seek_order_row(&mut self, order: usize, row: usize) -> Result<f64, PlayerError> {
        let (module, start) = self.start_order()?;
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        let target = SeekTarget::order_row_target(&module, start, order, row, &self.settings)
            .ok_or(PlayerError::out_of_range("order", order))?;
        self.send_seek(target)
    }

    fn send_seek(&mut self, target: SeekTarget) -> Result<f64, PlayerError> {
        let reached = target.seconds();
        self.send(Command::Seek(Box::new(target)))?;
        self.ended = false;
        Ok(reached)
    }

    pub fn num_subsongs(&self) -> usize {
        self.active_entry().map_or(0, |e| e.subsongs.len())
    }

    pub fn selected_subsong(&self) -> usize {
        self.subsong
    }

    pub fn select_subsong(&mut self, index: usize) -> Result<(), PlayerError> {
        let entry = self.active_entry()?;
        let subsong = *entry
            .subsongs
            .get(index)
            .ok_or(PlayerError::out_of_range("subsong", index))?;
        let target = SeekTarget::subsong_start(&entry.module, subsong.start_order, &self.settings);
        self.send_seek(target)?;
        self.subsong = index;
        Ok(())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.active_entry()
            .ok()
            .and_then(|e| e.subsongs.get(self.subsong))
            .map_or(0.0, |s| s.duration)
    }

    // --- Settings ---

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Set a render parameter, returning the clamped value. The render side
    /// picks it up at its next tick.
    pub fn set_param(&mut self, param: RenderParam, value: i32) -> Result<i32, PlayerError> {
        let mut settings = self.settings.clone();
        let stored = settings.set_param(param, value);
        self.send(Command::Settings(settings.clone()))?;
        self.settings = settings;
        Ok(stored)
    }

    pub fn set_control(&mut self, key: &str, value: &str) -> Result<(), PlayerError> {
        let mut settings = self.settings.clone();
        settings.set_control(key, value)?;
        self.send(Command::Settings(settings.clone()))?;
        self.settings = settings;
        Ok(())
    }

    // --- Position ---

    /// Cursor as of the last audio callback.
    pub fn position(&self) -> Option<PlaybackPosition> {
        self.shared.snapshot.read()
    }

    // --- Patterns ---

    pub fn pattern_cell(&self, pattern: usize, channel: usize, row: usize) -> Result<Cell, PlayerError> {
        edit::cell(&self.active_entry()?.module, pattern, channel, row)
    }

    /// Edit the active module. Playback continues from the same cursor.
    pub fn edit(&mut self, pattern: usize, change: PatternEdit) -> Result<(), PlayerError> {
        let key = self.active.ok_or(PlayerError::NotLoaded)?;
        let edited = Arc::new(edit::apply_edit(&self.entry(key)?.module, pattern, change)?);
        self.send(Command::ReplaceModule(edited.clone()))?;
        let subsongs = find_subsongs(&edited);
        self.subsong = self.subsong.min(subsongs.len().saturating_sub(1));
        if let Some(entry) = self.modules.get_mut(key) {
            entry.module = edited;
            entry.subsongs = subsongs;
        }
        Ok(())
    }

    // --- Notifications ---

    pub fn add_observer(&mut self, observer: Box<dyn PlayerObserver>) {
        self.observers.push(observer);
    }

    /// Free returned payloads and deliver pending notifications. Position
    /// updates are rate limited to `position_interval`.
    pub fn pump(&mut self, now: Instant) {
        self.collect_garbage();

        while let Some(report) = self.reports.try_pop() {
            match report {
                // Reached before a later load or seek took effect
                Report::Ended { epoch } if epoch != self.epoch => {
                    log::debug!("ignoring stale song end");
                }
                Report::Ended { .. } => {
                    log::debug!("song ended");
                    self.ended = true;
                    self.stop();
                }
                Report::RenderFault(fault) => {
                    log::warn!("render fault: {}", fault);
                    let error = PlayerError::Render(fault);
                    for observer in &mut self.observers {
                        observer.on_error(&error);
                    }
                }
            }
        }

        if !self.is_playing() {
            return;
        }
        let due = self
            .last_position
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.position_interval());
        if !due {
            return;
        }
        if let Some(position) = self.position() {
            self.last_position = Some(now);
            for observer in &mut self.observers {
                observer.on_position(&position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tl_ir::{ModuleFormat, Note, Pattern};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Start,
        Stop,
        Position(u16, u16),
    }

    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl PlayerObserver for Recorder {
        fn on_start(&mut self) {
            self.0.lock().unwrap().push(Event::Start);
        }
        fn on_stop(&mut self) {
            self.0.lock().unwrap().push(Event::Stop);
        }
        fn on_position(&mut self, p: &PlaybackPosition) {
            self.0.lock().unwrap().push(Event::Position(p.order, p.row));
        }
    }

    fn module(rows: u16) -> Module {
        let mut m = Module::new(ModuleFormat::Mod { magic: *b"M.K." }, 4);
        m.patterns = vec![Pattern::new(rows, 4), Pattern::new(rows, 4)];
        m.order = vec![0, 1];
        m
    }

    fn setup(rows: u16) -> (Player, RenderDriver, Arc<Mutex<Vec<Event>>>) {
        let config = PlayerConfig {
            sample_rate: 8000,
            block_frames: 128,
            ..PlayerConfig::default()
        };
        let (mut player, driver) = Player::new(config);
        let events = Arc::new(Mutex::new(Vec::new()));
        player.add_observer(Box::new(Recorder(events.clone())));
        let key = player.load_module(module(rows));
        player.select(key).unwrap();
        (player, driver, events)
    }

    /// Run the driver for `frames` stereo frames.
    fn run(driver: &mut RenderDriver, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * 2];
        driver.process_interleaved(&mut out, 2);
        out
    }

    #[test]
    fn stopped_driver_is_silent_but_applies_commands() {
        let (player, mut driver, _) = setup(64);
        let out = run(&mut driver, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        // The load was applied and published
        assert_eq!(player.position().map(|p| (p.order, p.row)), Some((0, 0)));
    }

    #[test]
    fn position_advances_and_is_rate_limited() {
        let (mut player, mut driver, events) = setup(64);
        player.play().unwrap();
        // 0.12 s per row at 8 kHz
        run(&mut driver, 960 * 3 + 10);
        let t0 = Instant::now();
        player.pump(t0);
        player.pump(t0 + Duration::from_millis(50));
        run(&mut driver, 960);
        player.pump(t0 + Duration::from_millis(100));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![Event::Start, Event::Position(0, 3), Event::Position(0, 4)]
        );
    }

    #[test]
    fn song_end_stops_player() {
        let (mut player, mut driver, events) = setup(1);
        player.play().unwrap();
        run(&mut driver, 4000);
        player.pump(Instant::now());
        assert!(!player.is_playing());
        assert_eq!(*events.lock().unwrap(), vec![Event::Start, Event::Stop]);

        // Playing again restarts from the top
        player.play().unwrap();
        run(&mut driver, 100);
        assert_eq!(player.position().map(|p| (p.order, p.row)), Some((0, 0)));
        assert!(player.is_playing());
    }

    #[test]
    fn song_end_before_seek_is_ignored() {
        let (mut player, mut driver, events) = setup(1);
        player.play().unwrap();
        run(&mut driver, 4000);
        player.seek_order_row(0, 0).unwrap();
        player.pump(Instant::now());
        assert!(player.is_playing());

        run(&mut driver, 100);
        assert_eq!(player.position().map(|p| (p.order, p.row)), Some((0, 0)));
        player.pump(Instant::now());
        assert!(player.is_playing());

        // The end reached after the seek still counts
        run(&mut driver, 4000);
        player.pump(Instant::now());
        assert!(!player.is_playing());
        assert_eq!(events.lock().unwrap().last(), Some(&Event::Stop));
    }

    #[test]
    fn seek_and_subsongs() {
        let (mut player, mut driver, _) = setup(64);
        let reached = player.seek_order_row(1, 8).unwrap();
        assert!((reached - 72.0 * 0.12).abs() < 1e-9);
        run(&mut driver, 16);
        assert_eq!(player.position().map(|p| (p.order, p.row)), Some((1, 8)));

        assert_eq!(
            player.seek_order_row(2, 0),
            Err(PlayerError::out_of_range("order", 2))
        );
        assert_eq!(player.seek_seconds(-1.0), Ok(0.0));
        assert_eq!(player.num_subsongs(), 1);
        assert_eq!(
            player.select_subsong(1),
            Err(PlayerError::out_of_range("subsong", 1))
        );
        assert!((player.duration_seconds() - 128.0 * 0.12).abs() < 1e-9);
    }

    #[test]
    fn edits_reach_the_driver() {
        let (mut player, mut driver, _) = setup(64);
        player.seek_order_row(0, 5).unwrap();
        let cell = Cell::with_note(Note::On(60), 1, 0);
        player.edit(1, PatternEdit::SetCell { channel: 3, row: 2, cell }).unwrap();
        assert_eq!(player.pattern_cell(1, 3, 2), Ok(cell));
        run(&mut driver, 16);
        assert_eq!(driver.engine().module().map(|m| m.patterns[1].cell(2, 3).note), Some(Note::On(60)));
        assert_eq!(player.position().map(|p| (p.order, p.row)), Some((0, 5)));
    }

    #[test]
    fn settings_are_forwarded() {
        let (mut player, mut driver, _) = setup(64);
        assert_eq!(player.set_param(RenderParam::MasterGain, 9), Ok(4));
        player.set_control("play.repeats", "2").unwrap();
        assert!(player.set_control("play.repeats", "x").is_err());
        assert_eq!(player.settings().repeat_count, 2);
        player.play().unwrap();
        run(&mut driver, 256);
        assert_eq!(driver.engine().settings().master_gain, 4);
        assert_eq!(driver.engine().settings().repeat_count, 2);
    }

    #[test]
    fn full_queue_is_reported() {
        let config = PlayerConfig {
            queue_capacity: 2,
            ..PlayerConfig::default()
        };
        let (mut player, _driver) = Player::new(config);
        let key = player.load_module(module(64));
        player.select(key).unwrap();
        player.set_param(RenderParam::MasterGain, 2).unwrap();
        assert_eq!(player.set_param(RenderParam::MasterGain, 3), Err(PlayerError::QueueFull));
        // Rejected changes are not recorded
        assert_eq!(player.settings().master_gain, 2);
    }

    #[test]
    fn stale_keys_are_rejected() {
        let (mut player, mut driver, events) = setup(64);
        let key = player.active().unwrap();
        player.play().unwrap();
        player.unload(key).unwrap();
        assert!(!player.is_playing());
        assert_eq!(player.select(key), Err(PlayerError::NotLoaded));
        assert_eq!(player.unload(key), Err(PlayerError::NotLoaded));
        assert_eq!(player.play(), Err(PlayerError::NotLoaded));
        assert!(player.module(key).is_none());
        run(&mut driver, 16);
        assert_eq!(player.position(), None);
        assert_eq!(*events.lock().unwrap(), vec![Event::Start, Event::Stop]);
    }
}
