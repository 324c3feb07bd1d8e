//! Synchronous control and metadata surface.
//!
//! [`ModulePlayer`] owns an [`Engine`] directly and is meant for offline
//! rendering or hosts that call `render` themselves. Accessors never fail
//! when nothing is loaded; they return `-1`, `""`, `false`, `None` or `0.0`
//! instead.

use std::sync::Arc;

use tl_engine::{
    find_subsongs, Engine, LoadedModule, NotLoaded, RenderFault, RenderParam, RenderSettings,
    SeekTarget, Subsong,
};
use tl_formats::LoadOptions;
use tl_ir::{Cell, Module, Note, PlaybackPosition, METADATA_KEYS};

use crate::edit::{self, PatternEdit};
use crate::error::PlayerError;

/// Summary of a loaded module.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleInfo {
    pub title: String,
    pub artist: String,
    pub type_name: String,
    pub type_long: String,
    pub tracker: String,
    /// Length of the selected subsong in seconds
    pub duration: f64,
    pub num_instruments: usize,
    pub num_samples: usize,
    pub num_patterns: usize,
    pub num_channels: usize,
    pub num_orders: usize,
    pub num_subsongs: usize,
}

impl ModuleInfo {
    pub(crate) fn new(module: &Module, subsongs: &[Subsong], selected: usize) -> Self {
        Self {
            title: module.title.clone(),
            artist: module.artist.clone(),
            type_name: module.metadata("type"),
            type_long: module.metadata("type_long"),
            tracker: module.tracker.clone(),
            duration: subsongs.get(selected).map_or(0.0, |s| s.duration),
            num_instruments: module.num_instruments(),
            num_samples: module.num_samples(),
            num_patterns: module.num_patterns(),
            num_channels: module.num_channels(),
            num_orders: module.num_orders(),
            num_subsongs: subsongs.len(),
        }
    }
}

/// Load options from the `load.*` controls.
pub(crate) fn load_options(settings: &RenderSettings) -> LoadOptions {
    LoadOptions {
        skip_samples: settings.skip_samples,
        skip_patterns: settings.skip_patterns,
    }
}

struct Session {
    subsongs: Vec<Subsong>,
    selected: usize,
}

/// A single-threaded module player.
pub struct ModulePlayer {
    engine: Engine,
    session: Option<Session>,
}

impl ModulePlayer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_settings(sample_rate, RenderSettings::default())
    }

    /// Player with initial settings; `load.*` controls take effect here.
    pub fn with_settings(sample_rate: u32, settings: RenderSettings) -> Self {
        Self {
            engine: Engine::with_settings(sample_rate, settings),
            session: None,
        }
    }

    // --- Loading ---

    /// Parse and load a module, replacing any current one.
    pub fn load(&mut self, data: &[u8]) -> Result<(), PlayerError> {
        let module = tl_formats::load_module_with(data, &load_options(self.engine.settings()))?;
        self.load_module(module);
        Ok(())
    }

    /// Load an already parsed module.
    pub fn load_module(&mut self, module: Module) {
        let module = Arc::new(module);
        let subsongs = find_subsongs(&module);
        let start = subsongs.first().map_or(0, |s| s.start_order);
        log::info!(
            "module \"{}\" ready: {} subsong(s), {:.2}s",
            module.title,
            subsongs.len(),
            subsongs.first().map_or(0.0, |s| s.duration)
        );
        self.engine.load(Box::new(LoadedModule::new(module, start)));
        self.session = Some(Session {
            subsongs,
            selected: 0,
        });
    }

    pub fn unload(&mut self) {
        self.engine.unload();
        self.session = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    pub fn module(&self) -> Option<&Arc<Module>> {
        self.engine.module()
    }

    pub fn module_info(&self) -> Option<ModuleInfo> {
        let module = self.module()?;
        let session = self.session.as_ref()?;
        Some(ModuleInfo::new(module, &session.subsongs, session.selected))
    }

    // --- Rendering ---

    /// Render interleaved stereo frames. See [`Engine::render`].
    pub fn render(&mut self, sample_rate: u32, out: &mut [f32]) -> Result<usize, NotLoaded> {
        self.engine.render(sample_rate, out)
    }

    pub fn take_fault(&mut self) -> Option<RenderFault> {
        self.engine.take_fault()
    }

    // --- Position ---

    pub fn position(&self) -> Option<PlaybackPosition> {
        self.engine.position()
    }

    pub fn current_seconds(&self) -> f64 {
        self.position().map_or(0.0, |p| p.seconds)
    }

    pub fn current_order(&self) -> i32 {
        self.position().map_or(-1, |p| p.order as i32)
    }

    pub fn current_pattern(&self) -> i32 {
        self.position().map_or(-1, |p| p.pattern as i32)
    }

    pub fn current_row(&self) -> i32 {
        self.position().map_or(-1, |p| p.row as i32)
    }

    pub fn current_speed(&self) -> i32 {
        self.position().map_or(-1, |p| p.speed as i32)
    }

    pub fn current_tempo(&self) -> i32 {
        self.position().map_or(-1, |p| p.tempo as i32)
    }

    fn start_order(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.subsongs.get(s.selected))
            .map_or(0, |s| s.start_order)
    }

    /// Seek to the first row starting at or after `seconds` (negative
    /// clamps to 0). Returns the time actually reached.
    pub fn set_position_seconds(&mut self, seconds: f64) -> f64 {
        let Some(module) = self.engine.module().cloned() else {
            return 0.0;
        };
        let mut target =
            SeekTarget::seconds_target(&module, self.start_order(), seconds, self.engine.settings());
        let reached = target.seconds();
        self.engine.apply_seek(&mut target);
        reached
    }

    /// Seek to `(order, row)`. The row is clamped into its pattern; an order
    /// past the end of the order list leaves the cursor alone and returns 0.
    pub fn set_position_order_row(&mut self, order: usize, row: usize) -> f64 {
        let Some(module) = self.engine.module().cloned() else {
            return 0.0;
        };
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        let Some(mut target) = SeekTarget::order_row_target(
            &module,
            self.start_order(),
            order,
            row,
            self.engine.settings(),
        ) else {
            return 0.0;
        };
        let reached = target.seconds();
        self.engine.apply_seek(&mut target);
        reached
    }

    /// Single-pass length of the selected subsong.
    pub fn duration_seconds(&self) -> f64 {
        self.session
            .as_ref()
            .and_then(|s| s.subsongs.get(s.selected))
            .map_or(0.0, |s| s.duration)
    }

    // --- Subsongs ---

    pub fn num_subsongs(&self) -> i32 {
        self.session.as_ref().map_or(-1, |s| s.subsongs.len() as i32)
    }

    pub fn selected_subsong(&self) -> i32 {
        self.session.as_ref().map_or(-1, |s| s.selected as i32)
    }

    /// Select a subsong and restart playback at its first order.
    pub fn select_subsong(&mut self, index: usize) -> bool {
        let (Some(module), Some(session)) = (self.engine.module().cloned(), self.session.as_mut())
        else {
            return false;
        };
        let Some(subsong) = session.subsongs.get(index).copied() else {
            return false;
        };
        session.selected = index;
        let mut target =
            SeekTarget::subsong_start(&module, subsong.start_order, self.engine.settings());
        self.engine.apply_seek(&mut target);
        true
    }

    // --- Render parameters and controls ---

    pub fn render_param(&self, param: RenderParam) -> i32 {
        if !self.is_loaded() {
            return -1;
        }
        self.engine.settings().param(param)
    }

    /// Set a render parameter; out-of-range values are clamped.
    pub fn set_render_param(&mut self, param: RenderParam, value: i32) -> bool {
        if !self.is_loaded() {
            return false;
        }
        self.engine.set_param(param, value);
        true
    }

    /// Control value, or `""` for unknown keys.
    pub fn control(&self, key: &str) -> String {
        if !self.is_loaded() {
            return String::new();
        }
        self.engine.settings().control(key).unwrap_or_default()
    }

    pub fn set_control(&mut self, key: &str, value: &str) -> Result<(), PlayerError> {
        if !self.is_loaded() {
            return Err(PlayerError::NotLoaded);
        }
        self.engine.set_control(key, value)?;
        Ok(())
    }

    pub fn settings(&self) -> &RenderSettings {
        self.engine.settings()
    }

    // --- Metadata ---

    pub fn metadata(&self, key: &str) -> String {
        self.module().map(|m| m.metadata(key)).unwrap_or_default()
    }

    pub fn metadata_keys(&self) -> &'static [&'static str] {
        METADATA_KEYS
    }

    pub fn instrument_names(&self) -> Vec<String> {
        self.module().map_or_else(Vec::new, |m| {
            m.instruments.iter().map(|i| i.name.to_string()).collect()
        })
    }

    pub fn sample_names(&self) -> Vec<String> {
        self.module().map_or_else(Vec::new, |m| {
            m.samples.iter().map(|s| s.name.to_string()).collect()
        })
    }

    pub fn pattern_names(&self) -> Vec<String> {
        self.module().map_or_else(Vec::new, |m| {
            m.patterns.iter().map(|p| p.name.to_string()).collect()
        })
    }

    // --- Order list ---

    pub fn num_orders(&self) -> i32 {
        self.module().map_or(-1, |m| m.num_orders() as i32)
    }

    /// Pattern at an order position, or -1.
    pub fn order_pattern(&self, order: usize) -> i32 {
        self.module()
            .and_then(|m| m.order_pattern(order))
            .map_or(-1, |p| p as i32)
    }

    pub fn order_sequence(&self) -> Vec<u16> {
        self.module().map_or_else(Vec::new, |m| m.order.clone())
    }

    // --- Patterns ---

    pub fn pattern_rows(&self, pattern: usize) -> i32 {
        self.module()
            .and_then(|m| m.patterns.get(pattern))
            .map_or(-1, |p| p.rows as i32)
    }

    pub fn pattern_name(&self, pattern: usize) -> String {
        self.module()
            .and_then(|m| m.patterns.get(pattern))
            .map(|p| p.name.to_string())
            .unwrap_or_default()
    }

    pub fn pattern_rows_per_beat(&self, pattern: usize) -> i32 {
        self.module()
            .and_then(|m| {
                let p = m.patterns.get(pattern)?;
                Some(p.rows_per_beat.unwrap_or(m.rows_per_beat) as i32)
            })
            .unwrap_or(-1)
    }

    pub fn pattern_rows_per_measure(&self, pattern: usize) -> i32 {
        self.module()
            .and_then(|m| {
                let p = m.patterns.get(pattern)?;
                Some(p.rows_per_measure.unwrap_or(m.rows_per_measure) as i32)
            })
            .unwrap_or(-1)
    }

    pub fn pattern_cell(&self, pattern: usize, channel: usize, row: usize) -> Option<Cell> {
        edit::cell(self.module()?, pattern, channel, row).ok()
    }

    /// Apply an edit to a pattern. Playback continues from the same cursor.
    pub fn edit(&mut self, pattern: usize, change: PatternEdit) -> Result<(), PlayerError> {
        let module = self.module().ok_or(PlayerError::NotLoaded)?;
        let edited = Arc::new(edit::apply_edit(module, pattern, change)?);
        if let Some(session) = self.session.as_mut() {
            session.subsongs = find_subsongs(&edited);
            session.selected = session.selected.min(session.subsongs.len().saturating_sub(1));
        }
        self.engine.replace_module(edited);
        Ok(())
    }

    pub fn set_pattern_cell(
        &mut self,
        pattern: usize,
        channel: usize,
        row: usize,
        cell: Cell,
    ) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::SetCell { channel, row, cell })
    }

    pub fn set_pattern_note(
        &mut self,
        pattern: usize,
        channel: usize,
        row: usize,
        note: Note,
    ) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::SetNote { channel, row, note })
    }

    pub fn set_pattern_instrument(
        &mut self,
        pattern: usize,
        channel: usize,
        row: usize,
        instrument: u8,
    ) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::SetInstrument { channel, row, instrument })
    }

    pub fn clear_pattern_cell(&mut self, pattern: usize, channel: usize, row: usize) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::ClearCell { channel, row })
    }

    pub fn clear_pattern_row(&mut self, pattern: usize, row: usize) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::ClearRow { row })
    }

    pub fn insert_pattern_row(&mut self, pattern: usize, row: usize) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::InsertRow { row })
    }

    pub fn delete_pattern_row(&mut self, pattern: usize, row: usize) -> Result<(), PlayerError> {
        self.edit(pattern, PatternEdit::DeleteRow { row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_engine::AtEnd;
    use tl_ir::{effects::cmd, ModuleFormat, Pattern};

    fn module() -> Module {
        let mut m = Module::new(ModuleFormat::Mod { magic: *b"M.K." }, 4);
        m.title = "two patterns".into();
        m.patterns = vec![Pattern::new(64, 4), Pattern::new(64, 4)];
        m.order = vec![0, 1];
        m
    }

    fn loaded() -> ModulePlayer {
        let mut player = ModulePlayer::new(8000);
        player.load_module(module());
        player
    }

    #[test]
    fn unloaded_sentinels() {
        let mut player = ModulePlayer::new(44100);
        assert!(!player.is_loaded());
        assert_eq!(player.num_orders(), -1);
        assert_eq!(player.order_pattern(0), -1);
        assert_eq!(player.current_row(), -1);
        assert_eq!(player.num_subsongs(), -1);
        assert_eq!(player.render_param(RenderParam::MasterGain), -1);
        assert_eq!(player.pattern_rows(0), -1);
        assert_eq!(player.metadata("title"), "");
        assert_eq!(player.control("play.repeats"), "");
        assert_eq!(player.pattern_cell(0, 0, 0), None);
        assert!(player.module_info().is_none());
        assert!(player.order_sequence().is_empty());
        assert!(!player.set_render_param(RenderParam::MasterGain, 2));
        assert!(!player.select_subsong(0));
        assert_eq!(player.set_position_seconds(3.0), 0.0);
        assert_eq!(player.set_position_order_row(0, 0), 0.0);
        assert_eq!(player.set_control("play.repeats", "0"), Err(PlayerError::NotLoaded));
        assert_eq!(
            player.set_pattern_note(0, 0, 0, Note::On(60)),
            Err(PlayerError::NotLoaded)
        );
        let mut out = vec![1.0f32; 16];
        assert_eq!(player.render(44100, &mut out), Err(NotLoaded));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn order_list_and_info() {
        let player = loaded();
        assert_eq!(player.num_orders(), 2);
        assert_eq!(player.order_pattern(1), 1);
        assert_eq!(player.order_pattern(2), -1);
        assert_eq!(player.order_sequence(), vec![0, 1]);
        let info = player.module_info().unwrap();
        assert_eq!(info.title, "two patterns");
        assert_eq!(info.num_channels, 4);
        assert_eq!(info.num_patterns, 2);
        assert!((info.duration - 128.0 * 0.12).abs() < 1e-9);
        assert_eq!(player.pattern_rows_per_beat(0), 4);
        assert_eq!(player.pattern_rows_per_measure(1), 16);
    }

    #[test]
    fn seeking() {
        let mut player = loaded();
        assert_eq!(player.set_position_seconds(-5.0), 0.0);
        let t = player.set_position_order_row(1, 0);
        assert!((t - 64.0 * 0.12).abs() < 1e-9);
        assert_eq!((player.current_order(), player.current_row()), (1, 0));

        // Past the order list: cursor stays put
        assert_eq!(player.set_position_order_row(7, 3), 0.0);
        assert_eq!(player.current_order(), 1);

        let mut out = vec![0.0f32; 2 * 8000];
        player.render(8000, &mut out).unwrap();
        assert_eq!(player.current_order(), 1);
        assert!(player.current_seconds() > t);
    }

    #[test]
    fn controls_and_params() {
        let mut player = loaded();
        assert_eq!(player.control("play.at_end"), "stop");
        player.set_control("play.at_end", "continue").unwrap();
        assert_eq!(player.settings().at_end, AtEnd::Continue);
        assert!(player.set_control("bogus", "1").is_err());
        assert!(player.set_control("dsp.megabass", "maybe").is_err());
        assert_eq!(player.control("dsp.megabass"), "0");
        assert_eq!(player.control("bogus"), "");

        assert!(player.set_render_param(RenderParam::InterpolationFilterLength, 5));
        assert_eq!(player.render_param(RenderParam::InterpolationFilterLength), 4);
        assert!(player.set_render_param(RenderParam::StereoSeparation, 9));
        assert_eq!(player.render_param(RenderParam::StereoSeparation), 4);
    }

    #[test]
    fn edits_keep_cursor_and_update_subsongs() {
        let mut player = loaded();
        player.set_position_order_row(0, 10);
        let cell = Cell {
            effect: cmd::POSITION_JUMP,
            param: 0,
            ..Cell::empty()
        };
        player.set_pattern_cell(0, 0, 63, cell).unwrap();
        assert_eq!(player.pattern_cell(0, 0, 63), Some(cell));
        assert_eq!((player.current_order(), player.current_row()), (0, 10));
        // Order 1 is now unreachable from order 0
        assert_eq!(player.num_subsongs(), 2);
        assert!(player.select_subsong(1));
        assert_eq!(player.current_order(), 1);
        assert!(!player.select_subsong(2));
        assert_eq!(
            player.clear_pattern_row(0, 64),
            Err(PlayerError::out_of_range("row", 64))
        );
    }
}
