//! Seek planning.
//!
//! Seeking simulates the song from the start of the selected subsong
//! (tracker tempo changes make time non-linear), so it is done off the
//! audio thread. The result is a [`SeekTarget`] holding a ready sequencer
//! and, with sample syncing enabled, the voices that would be sounding at
//! the target so the engine can resume them mid-sample.

use alloc::vec;
use alloc::vec::Vec;

use tl_ir::{Effect, Module, Note, VolumeCommand};

use crate::channel::ChannelState;
use crate::frequency::{note_to_period, period_to_frequency, PHASE_ONE};
use crate::params::RenderSettings;
use crate::sequencer::{Sequencer, MAX_CHANNELS};

/// A voice to restart at a seek target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceSync {
    pub sample: u16,
    pub instrument: Option<u16>,
    pub note: u8,
    pub volume: u8,
    /// Position in the sample (32.32 fixed-point)
    pub phase: u64,
}

/// Cursor and voices for a seek, built on the control side.
#[derive(Clone, Debug)]
pub struct SeekTarget {
    pub sequencer: Sequencer,
    /// One slot per module channel
    pub voices: Vec<Option<VoiceSync>>,
}

impl SeekTarget {
    /// Song time the cursor lands on.
    pub fn seconds(&self) -> f64 {
        self.sequencer.elapsed()
    }

    /// Cursor at the start of a subsong, nothing sounding.
    pub fn subsong_start(module: &Module, start_order: usize, settings: &RenderSettings) -> Self {
        let mut sequencer = Sequencer::new(module, start_order);
        sequencer.set_repeat_count(settings.repeat_count);
        Self {
            sequencer,
            voices: vec![None; module.num_channels()],
        }
    }

    /// First row starting at or after `seconds` (negative clamps to 0).
    pub fn seconds_target(
        module: &Module,
        start_order: usize,
        seconds: f64,
        settings: &RenderSettings,
    ) -> Self {
        let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let mut tracker = VoiceTracker::new(module);
        let mut sequencer = Sequencer::new(module, start_order);
        sequencer.set_repeat_count(settings.repeat_count);
        sequencer.scan(module, |s| {
            if s.elapsed() < target {
                tracker.observe_row(module, s);
                true
            } else {
                false
            }
        });
        let voices = tracker.finish(module, &sequencer, settings.sync_samples);
        log::debug!(
            "seek {:.3}s -> order {} row {} at {:.3}s",
            seconds,
            sequencer.order(),
            sequencer.row(),
            sequencer.elapsed()
        );
        Self { sequencer, voices }
    }

    /// Cursor at `(order, row)`, row clamped into the pattern. `None` when
    /// the order does not exist. Positions never reached from the subsong
    /// start get a time estimated from the initial speed and tempo.
    pub fn order_row_target(
        module: &Module,
        start_order: usize,
        order: usize,
        row: u16,
        settings: &RenderSettings,
    ) -> Option<Self> {
        if order >= module.num_orders() {
            return None;
        }
        let row = row.min(module.rows_at(order).saturating_sub(1));

        let mut tracker = VoiceTracker::new(module);
        let mut sequencer = Sequencer::new(module, start_order);
        sequencer.set_repeat_count(0);
        let reached = sequencer.scan(module, |s| {
            if s.order() == order && s.row() == row {
                false
            } else {
                tracker.observe_row(module, s);
                true
            }
        });

        let voices = if reached {
            tracker.finish(module, &sequencer, settings.sync_samples)
        } else {
            let row_seconds = module.initial_speed.max(1) as f64 * 2.5
                / module.initial_tempo.max(1) as f64;
            let rows: u32 = (0..order).map(|o| module.rows_at(o) as u32).sum();
            let estimate = (rows + row as u32) as f64 * row_seconds;
            sequencer.place(module, order, row, estimate);
            vec![None; module.num_channels()]
        };
        sequencer.set_repeat_count(settings.repeat_count);
        Some(Self { sequencer, voices })
    }
}

#[derive(Clone, Copy, Debug)]
struct Started {
    sample: u16,
    instrument: Option<u16>,
    note: u8,
    volume: u8,
    at: f64,
}

/// Follows note triggers while a seek scan passes over rows.
struct VoiceTracker {
    instruments: Vec<Option<u16>>,
    voices: Vec<Option<Started>>,
}

impl VoiceTracker {
    fn new(module: &Module) -> Self {
        let channels = module.num_channels().min(MAX_CHANNELS);
        Self {
            instruments: vec![None; channels],
            voices: vec![None; channels],
        }
    }

    fn observe_row(&mut self, module: &Module, seq: &Sequencer) {
        let Some(pattern) = module.pattern_at(seq.order()) else {
            return;
        };
        for (ch, (instrument, voice)) in self
            .instruments
            .iter_mut()
            .zip(self.voices.iter_mut())
            .enumerate()
        {
            let Some(cell) = pattern.get(seq.row(), ch as u8) else {
                continue;
            };
            let effect = Effect::decode(cell.effect, cell.param);
            if cell.instrument > 0 {
                *instrument = Some(cell.instrument as u16 - 1);
            }
            let porta = matches!(effect, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
                || matches!(cell.volume, VolumeCommand::TonePorta(_));
            match cell.note {
                Note::On(n) if !porta && !matches!(effect, Effect::NoteDelay(d) if d > 0) => {
                    *voice = ChannelState::resolve_sample(module, *instrument, n)
                        .and_then(|s| module.samples.get(s as usize).map(|smp| (s, smp)))
                        .map(|(s, smp)| Started {
                            sample: s,
                            instrument: *instrument,
                            note: n,
                            volume: smp.default_volume.min(64),
                            at: seq.elapsed(),
                        });
                }
                Note::Off | Note::Cut => *voice = None,
                _ => {}
            }
            if let Some(v) = voice.as_mut() {
                if let VolumeCommand::Volume(vol) = cell.volume {
                    v.volume = vol.min(64);
                }
                if let Effect::SetVolume(vol) = effect {
                    v.volume = vol;
                }
            }
        }
    }

    /// Voices still sounding at the sequencer's position.
    fn finish(self, module: &Module, seq: &Sequencer, sync: bool) -> Vec<Option<VoiceSync>> {
        let mut out = vec![None; module.num_channels()];
        if !sync || seq.is_ended() {
            return out;
        }
        for (slot, started) in out.iter_mut().zip(self.voices) {
            let Some(v) = started else { continue };
            let Some(sample) = module.samples.get(v.sample as usize) else {
                continue;
            };
            let period = note_to_period(v.note, module.frequency_mode);
            let freq = period_to_frequency(period, sample.c4_speed, module.frequency_mode);
            let frames = (seq.elapsed() - v.at).max(0.0) * freq;
            let mut pos = frames as u64;
            let len = sample.len() as u64;
            if pos >= len {
                if !sample.has_loop() {
                    continue;
                }
                let start = sample.loop_start as u64;
                let span = sample.loop_end as u64 - start;
                pos = start + (pos.saturating_sub(start)) % span;
            }
            *slot = Some(VoiceSync {
                sample: v.sample,
                instrument: v.instrument,
                note: v.note,
                volume: v.volume,
                phase: pos * PHASE_ONE,
            });
        }
        out
    }
}
