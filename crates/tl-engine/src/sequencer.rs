//! Order/row/tick sequencing.
//!
//! The sequencer owns the playback cursor and every piece of state that is
//! global to the song (speed, tempo, global volume, pattern loops, pending
//! jumps). Per-channel effects live in [`ChannelState`](crate::ChannelState).
//!
//! Song end is reached at the end of the order list or when a jump lands on
//! a row that was already played in this pass. Rows replayed by a pattern
//! loop are exempt.

use alloc::vec;
use alloc::vec::Vec;

use tl_ir::{slide_delta, Effect, Module, PlaybackPosition};

/// Most channels a module can have.
pub const MAX_CHANNELS: usize = 64;
/// Rows tracked per order in the visited bitmap.
const ROWS_PER_ORDER: usize = 256;
/// Upper bound on ticks simulated by a single scan.
const MAX_SCAN_TICKS: u64 = 1 << 24;

/// What happened on a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickEvent {
    /// A new row was entered on this tick
    pub row_changed: bool,
    /// The order index changed with this row
    pub order_changed: bool,
    /// Tick within the row (counts pattern-delay repeats)
    pub tick: u16,
    /// Repeat count exhausted; nothing more will play
    pub song_ended: bool,
}

/// Subsong start order and single-pass length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Subsong {
    pub start_order: usize,
    pub duration: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Cursor placed on a row that has not been entered yet
    Fresh,
    /// Row already entered by a scan; deliver it again without re-scanning
    Replay,
    Running,
    Ended,
}

#[derive(Clone, Debug)]
pub struct Sequencer {
    order: usize,
    row: u16,
    tick: u16,
    speed: u8,
    tempo: u8,
    global_volume: u8,
    /// EEx repeats of the current row
    row_delay: u8,
    /// Hxy delta applied on non-first ticks
    global_slide: i8,
    global_slide_memory: u8,
    jump_order: Option<usize>,
    break_row: Option<u16>,
    loop_target: Option<u16>,
    loop_rows: [u16; MAX_CHANNELS],
    loop_counts: [u8; MAX_CHANNELS],
    visited: Vec<u64>,
    num_orders: usize,
    start_order: usize,
    restart_order: usize,
    repeat_count: i32,
    repeats_done: u32,
    elapsed: f64,
    state: State,
}

impl Sequencer {
    /// Cursor at the first row of `start_order`.
    pub fn new(module: &Module, start_order: usize) -> Self {
        let num_orders = module.num_orders();
        let restart = module.restart_position as usize;
        let restart_order = if start_order == 0 && restart < num_orders {
            restart
        } else {
            start_order
        };
        Self {
            order: start_order,
            row: 0,
            tick: 0,
            speed: module.initial_speed.max(1),
            tempo: module.initial_tempo.max(1),
            global_volume: module.global_volume.min(64),
            row_delay: 0,
            global_slide: 0,
            global_slide_memory: 0,
            jump_order: None,
            break_row: None,
            loop_target: None,
            loop_rows: [0; MAX_CHANNELS],
            loop_counts: [0; MAX_CHANNELS],
            visited: vec![0; (num_orders * ROWS_PER_ORDER).div_ceil(64)],
            num_orders,
            start_order,
            restart_order,
            repeat_count: -1,
            repeats_done: 0,
            elapsed: 0.0,
            state: if start_order < num_orders {
                State::Fresh
            } else {
                State::Ended
            },
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn row(&self) -> u16 {
        self.row
    }

    pub fn tick(&self) -> u16 {
        self.tick
    }

    /// Tick within the current repetition of the row.
    pub fn effect_tick(&self) -> u16 {
        self.tick % self.speed as u16
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume
    }

    pub fn start_order(&self) -> usize {
        self.start_order
    }

    /// Seconds elapsed at the start of the current tick.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_ended(&self) -> bool {
        self.state == State::Ended
    }

    pub fn repeat_count(&self) -> i32 {
        self.repeat_count
    }

    /// -1 loops forever, 0 plays once, N plays N extra times.
    pub fn set_repeat_count(&mut self, count: i32) {
        self.repeat_count = count.max(-1);
    }

    /// Length of one tick: 2.5 / tempo seconds.
    pub fn tick_seconds(&self) -> f64 {
        2.5 / self.tempo as f64
    }

    pub fn position(&self, module: &Module) -> PlaybackPosition {
        PlaybackPosition {
            seconds: self.elapsed,
            order: self.order as u16,
            pattern: module.order_pattern(self.order).unwrap_or(0),
            row: self.row,
            speed: self.speed,
            tempo: self.tempo,
        }
    }

    /// Advance by one tick.
    pub fn advance_tick(&mut self, module: &Module) -> TickEvent {
        match self.state {
            State::Ended => {
                return TickEvent {
                    tick: self.tick,
                    song_ended: true,
                    ..Default::default()
                }
            }
            State::Fresh => {
                self.state = State::Running;
                self.enter_row(module);
                return Self::row_event(true);
            }
            State::Replay => {
                self.state = State::Running;
                return Self::row_event(true);
            }
            State::Running => {}
        }

        self.elapsed += self.tick_seconds();
        self.tick += 1;
        let ticks_in_row = self.speed as u16 * (1 + self.row_delay as u16);
        if self.tick < ticks_in_row {
            if self.effect_tick() != 0 && self.global_slide != 0 {
                let gv = self.global_volume as i16 + self.global_slide as i16;
                self.global_volume = gv.clamp(0, 64) as u8;
            }
            return TickEvent {
                tick: self.tick,
                ..Default::default()
            };
        }

        let previous_order = self.order;
        if !self.next_row(module) {
            self.state = State::Ended;
            return TickEvent {
                tick: self.tick,
                song_ended: true,
                ..Default::default()
            };
        }
        self.enter_row(module);
        Self::row_event(self.order != previous_order)
    }

    fn row_event(order_changed: bool) -> TickEvent {
        TickEvent {
            row_changed: true,
            order_changed,
            tick: 0,
            song_ended: false,
        }
    }

    fn in_loop(&self) -> bool {
        self.loop_counts.iter().any(|&c| c > 0)
    }

    fn visited_bit(&self, order: usize, row: u16) -> (usize, u64) {
        let index = order * ROWS_PER_ORDER + (row as usize).min(ROWS_PER_ORDER - 1);
        (index / 64, 1 << (index % 64))
    }

    fn is_visited(&self, order: usize, row: u16) -> bool {
        let (word, bit) = self.visited_bit(order, row);
        self.visited.get(word).is_some_and(|w| w & bit != 0)
    }

    fn mark_visited(&mut self) {
        let (word, bit) = self.visited_bit(self.order, self.row);
        if let Some(w) = self.visited.get_mut(word) {
            *w |= bit;
        }
    }

    /// Enter the current row: reset the tick and apply row-level globals.
    fn enter_row(&mut self, module: &Module) {
        self.tick = 0;
        self.row_delay = 0;
        self.global_slide = 0;
        self.jump_order = None;
        self.break_row = None;
        self.loop_target = None;
        if !self.in_loop() {
            self.mark_visited();
        }

        let Some(pattern) = module.pattern_at(self.order) else {
            return;
        };
        let channels = (pattern.channels as usize).min(MAX_CHANNELS);
        for ch in 0..channels {
            let Some(cell) = pattern.get(self.row, ch as u8) else {
                continue;
            };
            match Effect::decode(cell.effect, cell.param) {
                Effect::SetSpeed(speed) if speed > 0 => self.speed = speed,
                Effect::SetTempo(tempo) => self.tempo = tempo,
                Effect::PositionJump(order) => self.jump_order = Some(order as usize),
                Effect::PatternBreak(row) => self.break_row = Some(row as u16),
                Effect::PatternLoop(0) => self.loop_rows[ch] = self.row,
                Effect::PatternLoop(count) => {
                    if self.loop_counts[ch] == 0 {
                        self.loop_counts[ch] = count;
                        self.loop_target = Some(self.loop_rows[ch]);
                    } else {
                        self.loop_counts[ch] -= 1;
                        if self.loop_counts[ch] > 0 {
                            self.loop_target = Some(self.loop_rows[ch]);
                        }
                    }
                }
                Effect::PatternDelay(delay) if self.row_delay == 0 => self.row_delay = delay,
                Effect::SetGlobalVolume(volume) => self.global_volume = volume,
                Effect::GlobalVolumeSlide(param) => {
                    if param != 0 {
                        self.global_slide_memory = param;
                    }
                    self.global_slide = slide_delta(self.global_slide_memory);
                }
                _ => {}
            }
        }
    }

    /// Move to the row after the current one. Returns false at song end.
    fn next_row(&mut self, module: &Module) -> bool {
        if let Some(row) = self.loop_target {
            self.row = row;
            return true;
        }

        let (mut order, mut row) = if self.jump_order.is_some() || self.break_row.is_some() {
            (
                self.jump_order.unwrap_or(self.order + 1),
                self.break_row.unwrap_or(0),
            )
        } else if self.row + 1 >= module.rows_at(self.order) {
            (self.order + 1, 0)
        } else {
            (self.order, self.row + 1)
        };

        if order >= self.num_orders {
            order = self.restart_order;
            row = 0;
            return self.wrap(order, row);
        }
        if row >= module.rows_at(order) {
            row = 0;
        }
        if !self.in_loop() && self.is_visited(order, row) {
            return self.wrap(order, row);
        }
        self.goto(order, row);
        true
    }

    /// End of a pass: continue at `(order, row)` if repeats remain.
    fn wrap(&mut self, order: usize, row: u16) -> bool {
        if self.repeat_count >= 0 && self.repeats_done >= self.repeat_count as u32 {
            return false;
        }
        self.repeats_done += 1;
        self.visited.fill(0);
        self.goto(order, row);
        true
    }

    fn goto(&mut self, order: usize, row: u16) {
        if order != self.order {
            self.loop_rows = [0; MAX_CHANNELS];
            self.loop_counts = [0; MAX_CHANNELS];
        }
        self.order = order;
        self.row = row;
    }

    /// Run ticks until `on_row` returns false at a row start, the song
    /// ends, or the scan limit is hit. Returns true if `on_row` stopped the
    /// scan; the cursor then sits on that row, ready to be delivered again.
    pub fn scan<F: FnMut(&Sequencer) -> bool>(&mut self, module: &Module, mut on_row: F) -> bool {
        for _ in 0..MAX_SCAN_TICKS {
            let event = self.advance_tick(module);
            if event.song_ended {
                return false;
            }
            if event.row_changed && !on_row(self) {
                self.state = State::Replay;
                return true;
            }
        }
        false
    }

    /// Put the cursor on `(order, row)` as if arrived there at `elapsed`,
    /// with the song's initial speed and tempo.
    pub fn place(&mut self, module: &Module, order: usize, row: u16, elapsed: f64) {
        *self = Self::new(module, self.start_order);
        if order < self.num_orders {
            self.order = order;
            self.row = row.min(module.rows_at(order).saturating_sub(1));
            self.state = State::Fresh;
        }
        self.elapsed = elapsed;
    }

    /// Single-pass length from `start_order`.
    pub fn duration(module: &Module, start_order: usize) -> f64 {
        let mut seq = Self::new(module, start_order);
        seq.set_repeat_count(0);
        seq.scan(module, |_| true);
        seq.elapsed
    }
}

/// Split the order list into subsongs: each one starts at the first order
/// not reached by the ones before it.
pub fn find_subsongs(module: &Module) -> Vec<Subsong> {
    let mut covered = vec![false; module.num_orders()];
    let mut subsongs = Vec::new();
    while let Some(start) = covered.iter().position(|c| !c) {
        covered[start] = true;
        let mut seq = Sequencer::new(module, start);
        seq.set_repeat_count(0);
        seq.scan(module, |s| {
            if let Some(c) = covered.get_mut(s.order) {
                *c = true;
            }
            true
        });
        subsongs.push(Subsong {
            start_order: start,
            duration: seq.elapsed,
        });
    }
    if subsongs.is_empty() {
        subsongs.push(Subsong {
            start_order: 0,
            duration: 0.0,
        });
    }
    subsongs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_ir::effects::cmd;
    use tl_ir::{ModuleFormat, Pattern};

    const ROW_SECONDS: f64 = 6.0 * 2.5 / 125.0;

    fn module(num_patterns: usize, order: Vec<u16>) -> Module {
        let mut m = Module::new(ModuleFormat::Mod { magic: *b"M.K." }, 4);
        m.patterns = (0..num_patterns).map(|_| Pattern::new(64, 4)).collect();
        m.order = order;
        m
    }

    fn put(m: &mut Module, pattern: usize, row: u16, ch: u8, effect: u8, param: u8) {
        let cell = m.patterns[pattern].cell_mut(row, ch);
        cell.effect = effect;
        cell.param = param;
    }

    /// Rows entered until the song ends, as (order, row).
    fn played_rows(m: &Module, repeat: i32) -> Vec<(usize, u16)> {
        let mut seq = Sequencer::new(m, 0);
        seq.set_repeat_count(repeat);
        let mut rows = Vec::new();
        seq.scan(m, |s| {
            rows.push((s.order(), s.row()));
            rows.len() < 100_000
        });
        rows
    }

    #[test]
    fn first_tick_enters_first_row() {
        let m = module(1, vec![0]);
        let mut seq = Sequencer::new(&m, 0);
        let ev = seq.advance_tick(&m);
        assert!(ev.row_changed && ev.order_changed);
        assert_eq!((seq.order(), seq.row(), ev.tick), (0, 0, 0));
        for t in 1..6 {
            let ev = seq.advance_tick(&m);
            assert!(!ev.row_changed);
            assert_eq!(ev.tick, t);
        }
        let ev = seq.advance_tick(&m);
        assert!(ev.row_changed && !ev.order_changed);
        assert_eq!(seq.row(), 1);
    }

    #[test]
    fn order_change_is_signalled() {
        let m = module(2, vec![0, 1]);
        let rows = played_rows(&m, 0);
        assert_eq!(rows.len(), 128);
        assert_eq!(rows[64], (1, 0));
    }

    #[test]
    fn duration_of_plain_song() {
        let m = module(2, vec![0, 1]);
        let d = Sequencer::duration(&m, 0);
        assert!((d - 128.0 * ROW_SECONDS).abs() < 1e-9, "{}", d);
    }

    #[test]
    fn speed_and_tempo_apply_at_row_entry() {
        let mut m = module(1, vec![0]);
        put(&mut m, 0, 0, 0, cmd::SPEED_TEMPO, 3);
        put(&mut m, 0, 0, 1, cmd::SPEED_TEMPO, 250);
        let mut seq = Sequencer::new(&m, 0);
        seq.advance_tick(&m);
        assert_eq!((seq.speed(), seq.tempo()), (3, 250));
        seq.advance_tick(&m);
        seq.advance_tick(&m);
        assert!(seq.advance_tick(&m).row_changed);
        assert!((seq.elapsed() - 3.0 * 0.01).abs() < 1e-12);
    }

    #[test]
    fn speed_zero_is_ignored() {
        let mut m = module(1, vec![0]);
        put(&mut m, 0, 0, 0, cmd::SPEED_TEMPO, 0);
        let mut seq = Sequencer::new(&m, 0);
        seq.advance_tick(&m);
        assert_eq!(seq.speed(), 6);
    }

    #[test]
    fn repeats_control_song_end() {
        let m = module(1, vec![0]);
        assert_eq!(played_rows(&m, 0).len(), 64);
        assert_eq!(played_rows(&m, 2).len(), 192);
        // Infinite repeat never ends by itself
        assert_eq!(played_rows(&m, -1).len(), 100_000);
    }

    #[test]
    fn position_jump_back_ends_pass() {
        let mut m = module(2, vec![0, 1]);
        put(&mut m, 1, 63, 0, cmd::POSITION_JUMP, 0);
        assert_eq!(played_rows(&m, 0).len(), 128);
        let twice = played_rows(&m, 1);
        assert_eq!(twice.len(), 256);
        assert_eq!(twice[128], (0, 0));
    }

    #[test]
    fn restart_position_is_loop_target() {
        let mut m = module(2, vec![0, 1]);
        m.restart_position = 1;
        let rows = played_rows(&m, 1);
        assert_eq!(rows.len(), 192);
        assert_eq!(rows[128], (1, 0));
    }

    #[test]
    fn pattern_break_uses_decimal_row() {
        let mut m = module(2, vec![0, 1]);
        put(&mut m, 0, 0, 2, cmd::PATTERN_BREAK, 0x12);
        let rows = played_rows(&m, 0);
        assert_eq!(rows[1], (1, 12));
        assert_eq!(rows.len(), 1 + 52);
    }

    #[test]
    fn break_past_pattern_end_goes_to_row_zero() {
        let mut m = module(2, vec![0, 1]);
        put(&mut m, 0, 0, 0, cmd::PATTERN_BREAK, 0x99);
        let rows = played_rows(&m, 0);
        assert_eq!(rows[1], (1, 0));
    }

    #[test]
    fn jump_and_break_combine() {
        let mut m = module(3, vec![0, 1, 2]);
        put(&mut m, 0, 0, 0, cmd::POSITION_JUMP, 2);
        put(&mut m, 0, 0, 1, cmd::PATTERN_BREAK, 0x05);
        let rows = played_rows(&m, 0);
        assert_eq!(rows[1], (2, 5));
    }

    #[test]
    fn pattern_loop_repeats_rows_without_ending() {
        let mut m = module(1, vec![0]);
        put(&mut m, 0, 4, 0, cmd::EXTENDED, 0x60);
        put(&mut m, 0, 7, 0, cmd::EXTENDED, 0x62);
        let rows = played_rows(&m, 0);
        // Rows 4..=7 play three times
        assert_eq!(rows.len(), 64 + 2 * 4);
        assert_eq!(rows[8], (0, 4));
        assert_eq!(rows[12], (0, 4));
        assert_eq!(rows[16], (0, 8));
    }

    #[test]
    fn pattern_delay_stretches_row() {
        let mut m = module(1, vec![0]);
        put(&mut m, 0, 0, 0, cmd::EXTENDED, 0xE2);
        let mut seq = Sequencer::new(&m, 0);
        seq.advance_tick(&m);
        for _ in 1..18 {
            assert!(!seq.advance_tick(&m).row_changed);
        }
        assert!(seq.advance_tick(&m).row_changed);
        assert_eq!(seq.row(), 1);
    }

    #[test]
    fn global_volume_set_and_slide() {
        let mut m = module(1, vec![0]);
        put(&mut m, 0, 0, 0, cmd::GLOBAL_VOLUME, 32);
        put(&mut m, 0, 1, 0, cmd::GLOBAL_VOLUME_SLIDE, 0x02);
        put(&mut m, 0, 2, 0, cmd::GLOBAL_VOLUME_SLIDE, 0x00);
        let mut seq = Sequencer::new(&m, 0);
        seq.advance_tick(&m);
        assert_eq!(seq.global_volume(), 32);
        for _ in 0..6 {
            seq.advance_tick(&m);
        }
        assert_eq!(seq.row(), 1);
        for _ in 0..5 {
            seq.advance_tick(&m);
        }
        assert_eq!(seq.global_volume(), 22);
        for _ in 0..6 {
            seq.advance_tick(&m);
        }
        // H00 reuses the last slide
        assert_eq!(seq.global_volume(), 12);
    }

    #[test]
    fn ended_sequencer_stays_ended() {
        let m = module(1, vec![0]);
        let mut seq = Sequencer::new(&m, 0);
        seq.set_repeat_count(0);
        assert!(!seq.scan(&m, |_| true));
        assert!(seq.is_ended());
        let ev = seq.advance_tick(&m);
        assert!(ev.song_ended && !ev.row_changed);
    }

    #[test]
    fn empty_order_list_is_ended() {
        let m = module(0, vec![]);
        let mut seq = Sequencer::new(&m, 0);
        assert!(seq.advance_tick(&m).song_ended);
        assert_eq!(Sequencer::duration(&m, 0), 0.0);
    }

    #[test]
    fn missing_pattern_plays_empty_rows() {
        let m = module(1, vec![0, 9]);
        assert_eq!(played_rows(&m, 0).len(), 128);
    }

    #[test]
    fn place_cursor_enters_row_fresh() {
        let m = module(2, vec![0, 1]);
        let mut seq = Sequencer::new(&m, 0);
        seq.set_repeat_count(3);
        seq.place(&m, 1, 99, 2.5);
        assert_eq!((seq.order(), seq.row(), seq.elapsed()), (1, 63, 2.5));
        assert!(seq.advance_tick(&m).row_changed);
        assert_eq!(seq.repeat_count(), -1);
    }

    #[test]
    fn unreachable_orders_form_subsongs() {
        let mut m = module(2, vec![0, 1]);
        put(&mut m, 0, 63, 0, cmd::POSITION_JUMP, 0);
        let subsongs = find_subsongs(&m);
        assert_eq!(subsongs.len(), 2);
        assert_eq!(subsongs[1].start_order, 1);
        assert!((subsongs[0].duration - 64.0 * ROW_SECONDS).abs() < 1e-9);

        let linear = find_subsongs(&module(2, vec![0, 1]));
        assert_eq!(linear.len(), 1);
        assert_eq!(find_subsongs(&module(0, vec![])).len(), 1);
    }

    #[test]
    fn position_snapshot() {
        let m = module(2, vec![1, 0]);
        let mut seq = Sequencer::new(&m, 0);
        seq.advance_tick(&m);
        let pos = seq.position(&m);
        assert_eq!((pos.order, pos.pattern, pos.row), (0, 1, 0));
        assert_eq!((pos.speed, pos.tempo), (6, 125));
    }
}
