//! Channel state for tracker playback.
//!
//! A channel interprets the cells of its pattern column: note triggers,
//! volume column commands and per-channel effects. Every tick it resolves
//! to a resampling increment and a pair of (ramped) stereo gains that the
//! mixer applies to the current sample.

use tl_ir::{
    slide_delta, Cell, ChannelSettings, Effect, Envelope, FrequencyMode, Module, Note, Sample,
    VolumeCommand,
};

use crate::frequency::{
    finetune_c4_speed, frequency_to_increment, note_to_period, period_to_frequency,
    semitone_offset, PHASE_ONE,
};
use crate::interpolation::{read, Interpolation, SincTable};

/// Full-scale instrument fadeout.
const FADE_MAX: u32 = 65536;

/// ProTracker vibrato/tremolo sine, first half period.
const SINE: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

/// Everything a channel needs to know about the current tick.
pub(crate) struct TickContext<'a> {
    pub module: &'a Module,
    /// Tick within the current row repetition
    pub tick: u16,
    pub mode: FrequencyMode,
    /// Period clamp range for slides
    pub limits: (i32, i32),
    pub xm: bool,
}

/// Mixing state for a single tracker channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    /// Sample being played (index into the module's samples)
    pub sample: Option<u16>,
    /// Instrument last selected (0-based; sample index for MOD)
    pub instrument: Option<u16>,
    /// Position in the sample (32.32 fixed-point)
    pub phase: u64,
    /// Per-frame step (32.32 fixed-point)
    pub increment: u64,
    pub playing: bool,
    /// Ping-pong direction
    pub forward: bool,
    pub note: u8,
    /// Base period before vibrato/arpeggio
    pub period: i32,
    pub c4_speed: u32,
    /// 0-64
    pub volume: u8,
    /// 0 (left) - 255 (right)
    pub panning: u8,
    /// Channel volume from the module header (0-64)
    pub channel_volume: u8,
    pub muted: bool,

    period_offset: i32,
    volume_offset: i16,
    tremor_silent: bool,

    effect: Effect,
    volume_command: VolumeCommand,
    delayed: Option<Cell>,
    delay_tick: u16,

    porta_up_memory: u8,
    porta_down_memory: u8,
    tone_porta_speed: u8,
    target_period: i32,
    vibrato_speed: u8,
    vibrato_depth: u8,
    vibrato_pos: u8,
    vibrato_waveform: u8,
    tremolo_speed: u8,
    tremolo_depth: u8,
    tremolo_pos: u8,
    tremolo_waveform: u8,
    volume_slide_memory: u8,
    sample_offset_memory: u8,
    pan_slide_memory: u8,
    retrigger_memory: (u8, u8),
    retrigger_counter: u8,
    tremor_memory: (u8, u8),
    tremor_counter: u8,
    extra_fine_memory: u8,

    key_on: bool,
    fading: bool,
    fadeout_volume: u32,
    volume_envelope_tick: u16,
    panning_envelope_tick: u16,
    envelope_volume: u8,
    envelope_panning: i8,
    autovibrato_pos: u8,
    autovibrato_ticks: u16,

    gain: (f32, f32),
    target_gain: (f32, f32),
    ramp_step: (f32, f32),
    ramp_left: u32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            sample: None,
            instrument: None,
            phase: 0,
            increment: 0,
            playing: false,
            forward: true,
            note: 0,
            period: 0,
            c4_speed: tl_ir::DEFAULT_C4_SPEED,
            volume: 64,
            panning: 128,
            channel_volume: 64,
            muted: false,
            period_offset: 0,
            volume_offset: 0,
            tremor_silent: false,
            effect: Effect::None,
            volume_command: VolumeCommand::None,
            delayed: None,
            delay_tick: 0,
            porta_up_memory: 0,
            porta_down_memory: 0,
            tone_porta_speed: 0,
            target_period: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_pos: 0,
            vibrato_waveform: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            tremolo_pos: 0,
            tremolo_waveform: 0,
            volume_slide_memory: 0,
            sample_offset_memory: 0,
            pan_slide_memory: 0,
            retrigger_memory: (0, 0),
            retrigger_counter: 0,
            tremor_memory: (0, 0),
            tremor_counter: 0,
            extra_fine_memory: 0,
            key_on: false,
            fading: false,
            fadeout_volume: FADE_MAX,
            volume_envelope_tick: 0,
            panning_envelope_tick: 0,
            envelope_volume: 64,
            envelope_panning: 0,
            autovibrato_pos: 0,
            autovibrato_ticks: 0,
            gain: (0.0, 0.0),
            target_gain: (0.0, 0.0),
            ramp_step: (0.0, 0.0),
            ramp_left: 0,
        }
    }

    /// Silence the channel and restore its header settings.
    pub fn reset(&mut self, settings: &ChannelSettings) {
        *self = Self::new();
        self.panning = pan_to_u8(settings.initial_pan);
        self.channel_volume = settings.initial_volume.min(64);
        self.muted = settings.muted;
    }

    /// Current output gains (left, right).
    pub fn gain(&self) -> (f32, f32) {
        self.gain
    }

    /// Stop playback.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Process the first tick of a row.
    pub(crate) fn process_row(&mut self, cell: &Cell, ctx: &TickContext) {
        self.effect = Effect::decode(cell.effect, cell.param);
        self.volume_command = cell.volume;
        self.delayed = None;
        self.period_offset = 0;
        self.volume_offset = 0;
        self.tremor_silent = false;

        if let Effect::NoteDelay(delay) = self.effect {
            if delay > 0 {
                self.delayed = Some(*cell);
                self.delay_tick = delay as u16;
                return;
            }
        }

        let triggered = self.trigger(cell, ctx);
        self.apply_volume_column_row();
        self.apply_row_effect(triggered, ctx);
    }

    /// Process a tick after the first one of the row.
    pub(crate) fn process_tick(&mut self, ctx: &TickContext) {
        self.period_offset = 0;
        self.volume_offset = 0;
        if let Some(cell) = self.delayed {
            if ctx.tick == self.delay_tick {
                self.delayed = None;
                let triggered = self.trigger(&cell, ctx);
                self.apply_volume_column_row();
                self.apply_row_effect(triggered, ctx);
            }
            return;
        }
        if ctx.tick == 0 {
            // Pattern-delay repeat of the row
            return;
        }
        self.apply_volume_column_tick(ctx);
        self.apply_tick_effect(ctx);
    }

    /// Resolve the sample an instrument plays for `note`.
    pub(crate) fn resolve_sample(module: &Module, instrument: Option<u16>, note: u8) -> Option<u16> {
        let instrument = instrument?;
        if module.instruments.is_empty() {
            Some(instrument)
        } else {
            module.instruments.get(instrument as usize)?.sample_for(note)
        }
    }

    fn is_tone_porta(&self) -> bool {
        matches!(
            self.effect,
            Effect::TonePorta(_) | Effect::TonePortaVolSlide(_)
        ) || matches!(self.volume_command, VolumeCommand::TonePorta(_))
    }

    /// Apply the note and instrument columns. Returns true if a note started.
    fn trigger(&mut self, cell: &Cell, ctx: &TickContext) -> bool {
        let porta = self.is_tone_porta() && self.playing;

        if cell.instrument > 0 {
            self.instrument = Some(cell.instrument as u16 - 1);
            let note = match cell.note {
                Note::On(n) if !porta => n,
                _ => self.note,
            };
            match Self::resolve_sample(ctx.module, self.instrument, note)
                .and_then(|i| ctx.module.samples.get(i as usize).map(|s| (i, s)))
            {
                Some((index, sample)) => {
                    self.volume = sample.default_volume.min(64);
                    if let Some(pan) = sample.default_pan {
                        self.panning = pan_to_u8(pan);
                    }
                    if !matches!(cell.note, Note::On(_)) && self.sample != Some(index) {
                        self.switch_sample(index, sample);
                    }
                    self.restart_envelopes();
                }
                None if ctx.xm => self.playing = false,
                None => {}
            }
        }

        match cell.note {
            Note::On(n) if porta => {
                self.target_period = note_to_period(n, ctx.mode);
                false
            }
            Note::On(n) => self.start_note(n, ctx),
            Note::Off => {
                self.release(ctx);
                false
            }
            Note::Cut => {
                self.volume = 0;
                false
            }
            Note::Fade => {
                self.fading = true;
                false
            }
            Note::None => false,
        }
    }

    /// Change sample mid-note without restarting it.
    fn switch_sample(&mut self, index: u16, sample: &Sample) {
        self.sample = Some(index);
        self.c4_speed = sample.c4_speed;
        let len = sample.len() as u64;
        if self.phase >> 32 >= len {
            self.phase = 0;
        }
    }

    fn start_note(&mut self, note: u8, ctx: &TickContext) -> bool {
        let Some((index, sample)) = Self::resolve_sample(ctx.module, self.instrument, note)
            .and_then(|i| ctx.module.samples.get(i as usize).map(|s| (i, s)))
        else {
            self.playing = false;
            return false;
        };
        self.sample = Some(index);
        self.note = note;
        self.c4_speed = match self.effect {
            Effect::SetFinetune(finetune) => finetune_c4_speed(finetune),
            _ => sample.c4_speed,
        };
        self.period = note_to_period(note, ctx.mode);
        self.target_period = self.period;
        self.phase = 0;
        self.forward = true;
        self.playing = !sample.is_empty();
        if self.vibrato_waveform & 4 == 0 {
            self.vibrato_pos = 0;
        }
        if self.tremolo_waveform & 4 == 0 {
            self.tremolo_pos = 0;
        }
        self.retrigger_counter = 0;
        self.tremor_counter = 0;
        self.restart_envelopes();
        true
    }

    fn restart_envelopes(&mut self) {
        self.key_on = true;
        self.fading = false;
        self.fadeout_volume = FADE_MAX;
        self.volume_envelope_tick = 0;
        self.panning_envelope_tick = 0;
        self.envelope_volume = 64;
        self.envelope_panning = 0;
        self.autovibrato_pos = 0;
        self.autovibrato_ticks = 0;
    }

    /// Note-off: release sustain, or cut when there is no volume envelope.
    fn release(&mut self, ctx: &TickContext) {
        self.key_on = false;
        let has_envelope = self
            .instrument
            .and_then(|i| ctx.module.instruments.get(i as usize))
            .and_then(|inst| inst.volume_envelope.as_ref())
            .is_some_and(|env| env.enabled);
        if !has_envelope {
            self.volume = 0;
        }
    }

    fn restart_sample(&mut self) {
        self.phase = 0;
        self.forward = true;
        if self.sample.is_some() && self.period > 0 {
            self.playing = true;
        }
    }

    fn apply_volume_column_row(&mut self) {
        match self.volume_command {
            VolumeCommand::Volume(v) => self.volume = v.min(64),
            VolumeCommand::FineVolSlideDown(x) => self.volume = self.volume.saturating_sub(x),
            VolumeCommand::FineVolSlideUp(x) => self.volume = (self.volume + x).min(64),
            VolumeCommand::VibratoSpeed(x) if x > 0 => self.vibrato_speed = x,
            VolumeCommand::Vibrato(x) if x > 0 => self.vibrato_depth = x,
            VolumeCommand::Panning(x) => self.panning = x << 4,
            VolumeCommand::TonePorta(x) if x > 0 => self.tone_porta_speed = x << 4,
            _ => {}
        }
    }

    fn apply_volume_column_tick(&mut self, ctx: &TickContext) {
        match self.volume_command {
            VolumeCommand::VolumeSlideDown(x) => self.volume = self.volume.saturating_sub(x),
            VolumeCommand::VolumeSlideUp(x) => self.volume = (self.volume + x).min(64),
            VolumeCommand::PanSlideLeft(x) => self.panning = self.panning.saturating_sub(x),
            VolumeCommand::PanSlideRight(x) => self.panning = self.panning.saturating_add(x),
            VolumeCommand::Vibrato(_) => self.vibrato(),
            VolumeCommand::TonePorta(_) => self.tone_porta(ctx),
            _ => {}
        }
    }

    /// Store a slide parameter. MOD slides have no memory; XM reuses the
    /// last non-zero value.
    fn remember(memory: &mut u8, param: u8, xm: bool) {
        if param != 0 || !xm {
            *memory = param;
        }
    }

    fn apply_row_effect(&mut self, triggered: bool, ctx: &TickContext) {
        let xm = ctx.xm;
        match self.effect {
            Effect::PortaUp(p) => Self::remember(&mut self.porta_up_memory, p, xm),
            Effect::PortaDown(p) => Self::remember(&mut self.porta_down_memory, p, xm),
            Effect::TonePorta(p) => {
                if p != 0 {
                    self.tone_porta_speed = p;
                }
            }
            Effect::Vibrato { speed, depth } => {
                if speed != 0 {
                    self.vibrato_speed = speed;
                }
                if depth != 0 {
                    self.vibrato_depth = depth;
                }
            }
            Effect::TonePortaVolSlide(p) | Effect::VibratoVolSlide(p) | Effect::VolumeSlide(p) => {
                Self::remember(&mut self.volume_slide_memory, p, xm)
            }
            Effect::Tremolo { speed, depth } => {
                if speed != 0 {
                    self.tremolo_speed = speed;
                }
                if depth != 0 {
                    self.tremolo_depth = depth;
                }
            }
            Effect::SetPan(p) => self.panning = p,
            Effect::SampleOffset(p) => {
                if p != 0 {
                    self.sample_offset_memory = p;
                }
                if triggered {
                    self.apply_sample_offset(ctx);
                }
            }
            Effect::SetVolume(v) => self.volume = v.min(64),
            Effect::FinePortaUp(x) => self.slide_period(-(x as i32) * 4, ctx),
            Effect::FinePortaDown(x) => self.slide_period(x as i32 * 4, ctx),
            Effect::SetVibratoWaveform(w) => self.vibrato_waveform = w & 7,
            Effect::SetTremoloWaveform(w) => self.tremolo_waveform = w & 7,
            Effect::SetPanPosition(x) => self.panning = x * 17,
            Effect::FineVolumeSlideUp(x) => self.volume = (self.volume + x).min(64),
            Effect::FineVolumeSlideDown(x) => self.volume = self.volume.saturating_sub(x),
            Effect::NoteCut(0) => self.volume = 0,
            Effect::KeyOff(0) => self.release(ctx),
            Effect::SetEnvelopePosition(p) => {
                self.volume_envelope_tick = p as u16;
                self.panning_envelope_tick = p as u16;
            }
            Effect::PanningSlide(p) => Self::remember(&mut self.pan_slide_memory, p, xm),
            Effect::Retrigger { interval, volume_change } => {
                if interval != 0 || volume_change != 0 {
                    self.retrigger_memory = (interval, volume_change);
                }
            }
            Effect::Tremor { on, off } => {
                if on != 0 || off != 0 {
                    self.tremor_memory = (on, off);
                }
            }
            Effect::ExtraFinePortaUp(x) => {
                if x != 0 {
                    self.extra_fine_memory = x;
                }
                self.slide_period(-(self.extra_fine_memory as i32), ctx);
            }
            Effect::ExtraFinePortaDown(x) => {
                if x != 0 {
                    self.extra_fine_memory = x;
                }
                self.slide_period(self.extra_fine_memory as i32, ctx);
            }
            _ => {}
        }
    }

    fn apply_sample_offset(&mut self, ctx: &TickContext) {
        let offset = self.sample_offset_memory as u64 * 256;
        self.phase = offset << 32;
        let Some(sample) = self.sample.and_then(|i| ctx.module.samples.get(i as usize)) else {
            return;
        };
        if offset >= sample.len() as u64 && !sample.has_loop() {
            self.playing = false;
        }
    }

    fn apply_tick_effect(&mut self, ctx: &TickContext) {
        let tick = ctx.tick;
        match self.effect {
            Effect::Arpeggio { x, y } => {
                self.period_offset = match tick % 3 {
                    0 => 0,
                    1 => semitone_offset(self.note, x, ctx.mode),
                    _ => semitone_offset(self.note, y, ctx.mode),
                };
            }
            Effect::PortaUp(_) => self.slide_period(-(self.porta_up_memory as i32) * 4, ctx),
            Effect::PortaDown(_) => self.slide_period(self.porta_down_memory as i32 * 4, ctx),
            Effect::TonePorta(_) => self.tone_porta(ctx),
            Effect::Vibrato { .. } => self.vibrato(),
            Effect::TonePortaVolSlide(_) => {
                self.tone_porta(ctx);
                self.volume_slide();
            }
            Effect::VibratoVolSlide(_) => {
                self.vibrato();
                self.volume_slide();
            }
            Effect::Tremolo { .. } => self.tremolo(),
            Effect::VolumeSlide(_) => self.volume_slide(),
            Effect::RetriggerNote(x) if x > 0 && tick % x as u16 == 0 => self.restart_sample(),
            Effect::NoteCut(x) if tick == x as u16 => self.volume = 0,
            Effect::KeyOff(x) if tick == x as u16 => self.release(ctx),
            Effect::PanningSlide(_) => {
                let pan = self.panning as i16 + slide_delta(self.pan_slide_memory) as i16;
                self.panning = pan.clamp(0, 255) as u8;
            }
            Effect::Retrigger { .. } => self.multi_retrigger(),
            Effect::Tremor { .. } => {
                let on = self.tremor_memory.0 as u16 + 1;
                let off = self.tremor_memory.1 as u16 + 1;
                self.tremor_silent = (self.tremor_counter as u16 % (on + off)) >= on;
                self.tremor_counter = self.tremor_counter.wrapping_add(1);
            }
            _ => {}
        }
    }

    fn slide_period(&mut self, delta: i32, ctx: &TickContext) {
        if self.period == 0 {
            return;
        }
        self.period = (self.period + delta).clamp(ctx.limits.0, ctx.limits.1);
    }

    fn tone_porta(&mut self, ctx: &TickContext) {
        if self.period == 0 || self.target_period == 0 {
            return;
        }
        let speed = self.tone_porta_speed as i32 * 4;
        if self.period < self.target_period {
            self.period = (self.period + speed).min(self.target_period);
        } else if self.period > self.target_period {
            self.period = (self.period - speed).max(self.target_period);
        }
        self.period = self.period.clamp(ctx.limits.0, ctx.limits.1);
    }

    fn vibrato(&mut self) {
        let wave = waveform(self.vibrato_waveform, self.vibrato_pos);
        self.period_offset = (wave * self.vibrato_depth as i32) >> 5;
        self.vibrato_pos = (self.vibrato_pos + self.vibrato_speed) & 63;
    }

    fn tremolo(&mut self) {
        let wave = waveform(self.tremolo_waveform, self.tremolo_pos);
        self.volume_offset = ((wave * self.tremolo_depth as i32) >> 6) as i16;
        self.tremolo_pos = (self.tremolo_pos + self.tremolo_speed) & 63;
    }

    fn volume_slide(&mut self) {
        let volume = self.volume as i16 + slide_delta(self.volume_slide_memory) as i16;
        self.volume = volume.clamp(0, 64) as u8;
    }

    fn multi_retrigger(&mut self) {
        let (interval, change) = self.retrigger_memory;
        if interval == 0 {
            return;
        }
        self.retrigger_counter += 1;
        if self.retrigger_counter < interval {
            return;
        }
        self.retrigger_counter = 0;
        let v = self.volume as i16;
        let v = match change {
            1..=5 => v - (1 << (change - 1)),
            6 => v * 2 / 3,
            7 => v / 2,
            9..=13 => v + (1 << (change - 9)),
            14 => v * 3 / 2,
            15 => v * 2,
            _ => v,
        };
        self.volume = v.clamp(0, 64) as u8;
        self.restart_sample();
    }

    /// Envelopes, fadeout and auto-vibrato; once per tick.
    pub(crate) fn update_instrument(&mut self, ctx: &TickContext) {
        if !self.playing {
            return;
        }
        if let Some(inst) = self.instrument.and_then(|i| ctx.module.instruments.get(i as usize)) {
            let mut volume_enabled = false;
            if let Some(env) = inst.volume_envelope.as_ref().filter(|e| e.enabled) {
                volume_enabled = true;
                let value = step_envelope(env, &mut self.volume_envelope_tick, self.key_on);
                self.envelope_volume = value.clamp(0, 64) as u8;
            }
            if let Some(env) = inst.panning_envelope.as_ref().filter(|e| e.enabled) {
                let value = step_envelope(env, &mut self.panning_envelope_tick, self.key_on);
                self.envelope_panning = value.clamp(-32, 32);
            }
            if self.fading || (!self.key_on && volume_enabled) {
                self.fadeout_volume = self.fadeout_volume.saturating_sub(inst.fadeout as u32 * 2);
                if self.fadeout_volume == 0 {
                    self.playing = false;
                }
            }
        }

        if let Some(vib) = self
            .sample
            .and_then(|i| ctx.module.samples.get(i as usize))
            .and_then(|s| s.vibrato)
            .filter(|v| v.depth > 0)
        {
            let mut depth = vib.depth as i32;
            if vib.sweep > 0 && self.autovibrato_ticks < vib.sweep as u16 {
                depth = depth * self.autovibrato_ticks as i32 / vib.sweep as i32;
            }
            self.autovibrato_ticks = self.autovibrato_ticks.saturating_add(1);
            let pos = self.autovibrato_pos >> 2;
            let wave = match vib.waveform {
                1 => waveform(2, pos),
                2 => -waveform(1, pos),
                3 => waveform(1, pos),
                _ => waveform(0, pos),
            };
            self.period_offset += (wave * depth) >> 6;
            self.autovibrato_pos = self.autovibrato_pos.wrapping_add(vib.speed);
        }
    }

    /// Final panning including the panning envelope.
    fn final_panning(&self) -> u8 {
        if self.envelope_panning == 0 {
            return self.panning;
        }
        let pan = self.panning as i32;
        let room = 128 - (pan - 128).abs();
        (pan + self.envelope_panning as i32 * room / 32).clamp(0, 255) as u8
    }

    /// Recompute the increment and retarget the gain ramp.
    pub(crate) fn update_output(
        &mut self,
        ctx: &TickContext,
        sample_rate: u32,
        global_volume: u8,
        preamp: f32,
        ramp_frames: u32,
    ) {
        if self.period > 0 {
            let period = (self.period + self.period_offset).max(1);
            let freq = period_to_frequency(period, self.c4_speed, ctx.mode);
            self.increment = frequency_to_increment(freq, sample_rate);
        }

        let volume = if self.tremor_silent {
            0
        } else {
            (self.volume as i16 + self.volume_offset).clamp(0, 64)
        };
        let level = if self.playing && !self.muted {
            volume as f32 / 64.0
                * self.envelope_volume as f32 / 64.0
                * self.fadeout_volume as f32 / FADE_MAX as f32
                * global_volume as f32 / 64.0
                * self.channel_volume as f32 / 64.0
                * preamp
        } else {
            0.0
        };
        // Centre (128) is full gain on both sides.
        let pan = self.final_panning() as f32;
        let left = level * ((256.0 - pan) / 128.0).min(1.0);
        let right = level * (pan / 128.0).min(1.0);
        self.set_target_gain((left, right), ramp_frames);
    }

    fn set_target_gain(&mut self, target: (f32, f32), ramp_frames: u32) {
        if target == self.target_gain && (self.ramp_left > 0 || self.gain == target) {
            return;
        }
        self.target_gain = target;
        if ramp_frames == 0 {
            self.gain = target;
            self.ramp_left = 0;
        } else {
            let n = ramp_frames as f32;
            self.ramp_step = ((target.0 - self.gain.0) / n, (target.1 - self.gain.1) / n);
            self.ramp_left = ramp_frames;
        }
    }

    /// Start a voice mid-sample after a seek.
    pub(crate) fn resume_voice(&mut self, sync: &crate::seek::VoiceSync, ctx: &TickContext) {
        let Some(sample) = ctx.module.samples.get(sync.sample as usize) else {
            return;
        };
        self.instrument = sync.instrument;
        self.sample = Some(sync.sample);
        self.note = sync.note;
        self.c4_speed = sample.c4_speed;
        self.period = note_to_period(sync.note, ctx.mode);
        self.target_period = self.period;
        self.volume = sync.volume.min(64);
        self.phase = sync.phase;
        self.forward = true;
        self.playing = true;
        self.restart_envelopes();
    }

    /// Mix `out.len() / 2` frames of this channel into `out`.
    pub(crate) fn mix(
        &mut self,
        sample: &Sample,
        out: &mut [f32],
        mode: Interpolation,
        table: &SincTable,
    ) {
        if !self.playing {
            return;
        }
        for frame in out.chunks_exact_mut(2) {
            if self.ramp_left > 0 {
                self.gain.0 += self.ramp_step.0;
                self.gain.1 += self.ramp_step.1;
                self.ramp_left -= 1;
                if self.ramp_left == 0 {
                    self.gain = self.target_gain;
                }
            }
            let pos = (self.phase >> 32) as i64;
            let frac = (self.phase & 0xFFFF_FFFF) as f32 / PHASE_ONE as f32;
            let (l, r) = read(sample, pos, frac, mode, table);
            frame[0] += l * self.gain.0;
            frame[1] += r * self.gain.1;
            self.advance_phase(sample);
            if !self.playing {
                break;
            }
        }
    }

    /// Step the read position, following loops.
    fn advance_phase(&mut self, sample: &Sample) {
        let len = (sample.len() as u64) << 32;
        if !sample.has_loop() {
            self.phase = self.phase.saturating_add(self.increment);
            if self.phase >= len {
                self.playing = false;
            }
            return;
        }

        let start = (sample.loop_start as u64) << 32;
        let end = (sample.loop_end as u64) << 32;
        let span = end - start;
        match sample.loop_type {
            tl_ir::LoopType::PingPong => {
                if self.forward {
                    self.phase = self.phase.saturating_add(self.increment);
                    if self.phase >= end {
                        let over = (self.phase - end) % (2 * span);
                        self.phase = if over < span {
                            self.forward = false;
                            end - over - 1
                        } else {
                            start + (over - span)
                        };
                    }
                } else if self.phase >= start + self.increment {
                    self.phase -= self.increment;
                } else {
                    let over = (self.increment - (self.phase - start.min(self.phase))) % (2 * span);
                    self.phase = if over < span {
                        self.forward = true;
                        start + over
                    } else {
                        end - (over - span) - 1
                    };
                }
            }
            _ => {
                self.phase = self.phase.saturating_add(self.increment);
                if self.phase >= end {
                    self.phase = start + (self.phase - end) % span;
                }
            }
        }
    }
}

/// Convert a -64..=64 pan to 0..=255.
fn pan_to_u8(pan: i8) -> u8 {
    (pan as i16 * 2 + 128).clamp(0, 255) as u8
}

/// Modulation waveform at position 0-63, range -255..=255.
fn waveform(kind: u8, pos: u8) -> i32 {
    let pos = pos & 63;
    match kind & 3 {
        1 => 255 - (pos as i32 * 510 / 63),
        2 => {
            if pos < 32 {
                255
            } else {
                -255
            }
        }
        _ => {
            let v = SINE[(pos & 31) as usize] as i32;
            if pos < 32 {
                v
            } else {
                -v
            }
        }
    }
}

/// Read an envelope and advance its tick, honouring sustain and loop.
fn step_envelope(env: &Envelope, tick: &mut u16, key_on: bool) -> i8 {
    let value = env.value_at(*tick);
    let sustain = env.tick_of(env.sustain_start);
    if key_on && sustain == Some(*tick) {
        return value;
    }
    *tick = tick.saturating_add(1);
    if let (Some(start), Some(end)) = (env.tick_of(env.loop_start), env.tick_of(env.loop_end)) {
        if *tick >= end {
            *tick = start;
        }
    }
    *tick = (*tick).min(env.last_tick());
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;
    use tl_ir::effects::cmd;
    use tl_ir::{Instrument, LoopType, ModuleFormat, SampleData};

    fn mod_module() -> Module {
        let mut m = Module::new(ModuleFormat::Mod { magic: *b"M.K." }, 4);
        let mut s = Sample::new("square");
        s.data = SampleData::Mono8(vec![64; 1000]);
        s.default_volume = 48;
        m.samples = Arc::from(vec![s]);
        m
    }

    fn xm_module() -> Module {
        let mut m = Module::new(ModuleFormat::Xm { version: 0x0104 }, 2);
        m.frequency_mode = FrequencyMode::Linear;
        let mut s = Sample::new("tone");
        s.data = SampleData::Mono16(vec![8000; 4000]);
        s.default_volume = 40;
        s.default_pan = Some(32);
        m.samples = Arc::from(vec![s]);
        let mut inst = Instrument::new("lead");
        inst.set_single_sample(0);
        inst.fadeout = 8192;
        let mut env = Envelope::new();
        env.add_point(0, 64);
        env.add_point(4, 32);
        env.add_point(8, 16);
        env.sustain_start = Some(1);
        env.sustain_end = Some(1);
        env.enabled = true;
        inst.volume_envelope = Some(env);
        m.instruments = vec![inst];
        m
    }

    fn ctx(module: &Module, tick: u16) -> TickContext<'_> {
        TickContext {
            module,
            tick,
            mode: module.frequency_mode,
            limits: crate::frequency::period_limits(module),
            xm: module.format.is_xm(),
        }
    }

    fn cell(note: Note, instrument: u8, effect: u8, param: u8) -> Cell {
        Cell {
            note,
            instrument,
            volume: VolumeCommand::None,
            effect,
            param,
        }
    }

    /// Run one row at speed 6.
    fn run_row(ch: &mut ChannelState, m: &Module, c: Cell) {
        ch.process_row(&c, &ctx(m, 0));
        for t in 1..6 {
            ch.process_tick(&ctx(m, t));
        }
    }

    #[test]
    fn note_with_instrument_triggers_at_default_volume() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        ch.volume = 10;
        run_row(&mut ch, &m, cell(Note::On(60), 1, 0, 0));
        assert!(ch.playing);
        assert_eq!(ch.sample, Some(0));
        assert_eq!(ch.volume, 48);
        assert_eq!(ch.period, 1712);
        assert_eq!(ch.c4_speed, 8363);
    }

    #[test]
    fn instrument_only_resets_volume_without_retrigger() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::SET_VOLUME, 5));
        assert_eq!(ch.volume, 5);
        ch.phase = 100 << 32;
        run_row(&mut ch, &m, cell(Note::None, 1, 0, 0));
        assert_eq!(ch.volume, 48);
        assert_eq!(ch.phase, 100 << 32);
    }

    #[test]
    fn note_without_sample_is_silent() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 9, 0, 0));
        assert!(!ch.playing);
        run_row(&mut ch, &m, cell(Note::On(60), 0, 0, 0));
        assert!(!ch.playing);
    }

    #[test]
    fn volume_slide_per_tick() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::VOLUME_SLIDE, 0x02));
        assert_eq!(ch.volume, 48 - 10);
        // MOD: A00 does nothing
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::VOLUME_SLIDE, 0x00));
        assert_eq!(ch.volume, 38);
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::VOLUME_SLIDE, 0xF0));
        assert_eq!(ch.volume, 64);
    }

    #[test]
    fn xm_slides_remember_parameters() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::VOLUME_SLIDE, 0x01));
        assert_eq!(ch.volume, 35);
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::VOLUME_SLIDE, 0x00));
        assert_eq!(ch.volume, 30);
    }

    #[test]
    fn portamento_moves_period() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::PORTA_UP, 2));
        assert_eq!(ch.period, 1712 - 5 * 8);
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::PORTA_DOWN, 4));
        assert_eq!(ch.period, 1712 - 40 + 80);
    }

    #[test]
    fn porta_clamps_to_mod_range() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(95), 1, cmd::PORTA_UP, 0xFF));
        assert_eq!(ch.period, 57 * 4);
    }

    #[test]
    fn tone_porta_reaches_target_without_retrigger() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, 0, 0));
        ch.phase = 7 << 32;
        let target = note_to_period(62, FrequencyMode::Amiga);
        run_row(&mut ch, &m, cell(Note::On(62), 0, cmd::TONE_PORTA, 0x40));
        assert_eq!(ch.period, target);
        assert_eq!(ch.note, 60);
        assert!(ch.phase >= 7 << 32);
    }

    #[test]
    fn arpeggio_cycles_offsets() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        ch.process_row(&cell(Note::On(60), 1, cmd::ARPEGGIO, 0x47), &ctx(&m, 0));
        ch.process_tick(&ctx(&m, 1));
        assert_eq!(ch.period_offset, -4 * 64);
        ch.process_tick(&ctx(&m, 2));
        assert_eq!(ch.period_offset, -7 * 64);
        ch.process_tick(&ctx(&m, 3));
        assert_eq!(ch.period_offset, 0);
    }

    #[test]
    fn vibrato_offsets_period() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        ch.process_row(&cell(Note::On(60), 1, cmd::VIBRATO, 0x8F), &ctx(&m, 0));
        ch.process_tick(&ctx(&m, 1));
        // position 0 of the sine is zero
        assert_eq!(ch.period_offset, 0);
        ch.process_tick(&ctx(&m, 2));
        assert_eq!(ch.period_offset, (SINE[8] as i32 * 15) >> 5);
        assert_eq!(ch.period, 1712);
    }

    #[test]
    fn note_cut_and_delay() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        ch.process_row(&cell(Note::On(60), 1, cmd::EXTENDED, 0xC2), &ctx(&m, 0));
        ch.process_tick(&ctx(&m, 1));
        assert_eq!(ch.volume, 48);
        ch.process_tick(&ctx(&m, 2));
        assert_eq!(ch.volume, 0);

        let mut ch = ChannelState::new();
        ch.process_row(&cell(Note::On(60), 1, cmd::EXTENDED, 0xD3), &ctx(&m, 0));
        assert!(!ch.playing);
        ch.process_tick(&ctx(&m, 2));
        assert!(!ch.playing);
        ch.process_tick(&ctx(&m, 3));
        assert!(ch.playing);
        assert_eq!(ch.volume, 48);
    }

    #[test]
    fn sample_offset_beyond_end_stops() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::SAMPLE_OFFSET, 0x02));
        assert!(ch.playing);
        assert_eq!(ch.phase >> 32, 512);
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::SAMPLE_OFFSET, 0x08));
        assert!(!ch.playing);
    }

    #[test]
    fn panning_commands() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::SET_PAN, 0x20));
        assert_eq!(ch.panning, 0x20);
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::EXTENDED, 0x8F));
        assert_eq!(ch.panning, 255);
    }

    #[test]
    fn xm_sample_default_pan_and_key_off_release() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, 0, 0));
        assert_eq!(ch.panning, 192);
        for _ in 0..10 {
            ch.update_instrument(&ctx(&m, 1));
        }
        // Held at the sustain point
        assert_eq!(ch.envelope_volume, 32);
        run_row(&mut ch, &m, cell(Note::Off, 0, 0, 0));
        assert!(!ch.key_on);
        assert_eq!(ch.volume, 40);
        for _ in 0..4 {
            ch.update_instrument(&ctx(&m, 1));
        }
        assert!(ch.envelope_volume < 32);
        assert!(ch.fadeout_volume < FADE_MAX);
        for _ in 0..4 {
            ch.update_instrument(&ctx(&m, 1));
        }
        assert!(!ch.playing);
    }

    #[test]
    fn key_off_without_envelope_cuts() {
        let mut m = xm_module();
        m.instruments[0].volume_envelope = None;
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, 0, 0));
        run_row(&mut ch, &m, cell(Note::None, 0, cmd::KEY_OFF, 2));
        assert_eq!(ch.volume, 0);
    }

    #[test]
    fn xm_volume_column() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        let mut c = cell(Note::On(60), 1, 0, 0);
        c.volume = VolumeCommand::Volume(20);
        run_row(&mut ch, &m, c);
        assert_eq!(ch.volume, 20);
        let mut c = cell(Note::None, 0, 0, 0);
        c.volume = VolumeCommand::VolumeSlideUp(2);
        run_row(&mut ch, &m, c);
        assert_eq!(ch.volume, 30);
        let mut c = cell(Note::None, 0, 0, 0);
        c.volume = VolumeCommand::Panning(4);
        run_row(&mut ch, &m, c);
        assert_eq!(ch.panning, 64);
    }

    #[test]
    fn multi_retrigger_changes_volume() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::MULTI_RETRIGGER, 0x72));
        // Retriggers on ticks 2 and 4, halving each time
        assert_eq!(ch.volume, 10);
    }

    #[test]
    fn tremor_silences_after_on_time() {
        let m = xm_module();
        let mut ch = ChannelState::new();
        ch.process_row(&cell(Note::On(60), 1, cmd::TREMOR, 0x11), &ctx(&m, 0));
        ch.process_tick(&ctx(&m, 1));
        assert!(!ch.tremor_silent);
        ch.process_tick(&ctx(&m, 2));
        assert!(!ch.tremor_silent);
        ch.process_tick(&ctx(&m, 3));
        assert!(ch.tremor_silent);
    }

    #[test]
    fn output_gain_follows_volume_and_pan() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        ch.reset(&ChannelSettings { initial_pan: -64, initial_volume: 64, muted: false });
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::SET_VOLUME, 64));
        ch.update_output(&ctx(&m, 0), 44100, 64, 1.0, 0);
        assert_eq!(ch.gain(), (1.0, 0.0));
        assert!(ch.increment > 0);

        ch.muted = true;
        ch.update_output(&ctx(&m, 0), 44100, 64, 1.0, 0);
        assert_eq!(ch.gain(), (0.0, 0.0));
    }

    #[test]
    fn gain_ramps_over_frames() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, cmd::SET_VOLUME, 64));
        ch.update_output(&ctx(&m, 0), 44100, 64, 1.0, 4);
        assert_eq!(ch.gain(), (0.0, 0.0));
        let mut out = vec![0.0f32; 8];
        ch.mix(&m.samples[0], &mut out, Interpolation::Nearest, &SincTable::new());
        assert_eq!(ch.gain(), (1.0, 1.0));
        assert!(out[0] < out[6]);
    }

    #[test]
    fn forward_loop_keeps_playing() {
        let mut s = Sample::new("loop");
        s.data = SampleData::Mono8(vec![10; 16]);
        s.loop_start = 8;
        s.loop_end = 16;
        s.loop_type = LoopType::Forward;
        let mut ch = ChannelState::new();
        ch.playing = true;
        ch.increment = 3 * PHASE_ONE;
        for _ in 0..100 {
            ch.advance_phase(&s);
            let pos = ch.phase >> 32;
            assert!(pos < 16);
        }
        assert!(ch.playing);
    }

    #[test]
    fn pingpong_loop_changes_direction() {
        let mut s = Sample::new("pp");
        s.data = SampleData::Mono8(vec![10; 16]);
        s.loop_start = 4;
        s.loop_end = 12;
        s.loop_type = LoopType::PingPong;
        let mut ch = ChannelState::new();
        ch.playing = true;
        ch.phase = 10 * PHASE_ONE;
        ch.increment = 3 * PHASE_ONE;
        ch.advance_phase(&s);
        assert!(!ch.forward);
        assert!(ch.phase < 12 * PHASE_ONE);
        for _ in 0..100 {
            ch.advance_phase(&s);
            let pos = ch.phase >> 32;
            assert!((4..12).contains(&pos), "pos {}", pos);
        }
    }

    #[test]
    fn unlooped_sample_ends() {
        let m = mod_module();
        let mut ch = ChannelState::new();
        run_row(&mut ch, &m, cell(Note::On(60), 1, 0, 0));
        ch.increment = 600 * PHASE_ONE;
        let mut out = vec![0.0f32; 8];
        ch.mix(&m.samples[0], &mut out, Interpolation::Linear, &SincTable::new());
        assert!(!ch.playing);
    }

    #[test]
    fn waveforms() {
        assert_eq!(waveform(0, 0), 0);
        assert_eq!(waveform(0, 16), 255);
        assert_eq!(waveform(0, 48), -255);
        assert_eq!(waveform(2, 0), 255);
        assert_eq!(waveform(2, 40), -255);
        assert_eq!(waveform(1, 0), 255);
        assert_eq!(waveform(1, 63), -255);
    }

    #[test]
    fn envelope_loop() {
        let mut env = Envelope::new();
        env.add_point(0, 0);
        env.add_point(2, 64);
        env.add_point(4, 0);
        env.loop_start = Some(1);
        env.loop_end = Some(2);
        env.enabled = true;
        let mut tick = 0;
        let values: Vec<i8> = (0..6).map(|_| step_envelope(&env, &mut tick, false)).collect();
        assert_eq!(values, vec![0, 32, 64, 64, 64, 64]);
        assert_eq!(tick, 2);
    }
}
