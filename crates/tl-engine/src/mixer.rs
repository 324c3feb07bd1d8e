//! Main playback engine.

use alloc::boxed::Box;
use alloc::sync::Arc;

use heapless::Vec;

use tl_ir::{Cell, Module, PlaybackPosition};

use crate::channel::{ChannelState, TickContext};
use crate::dsp::DspChain;
use crate::error::{NotLoaded, RenderFault};
use crate::frame::Frame;
use crate::frequency::period_limits;
use crate::interpolation::{Interpolation, SincTable};
use crate::params::{AtEnd, ControlError, RenderParam, RenderSettings};
use crate::seek::SeekTarget;
use crate::sequencer::{Sequencer, MAX_CHANNELS};

/// End-of-song fade lasts `sample_rate / FADEOUT_DIVISOR` frames (100 ms).
const FADEOUT_DIVISOR: u32 = 10;

/// A module together with its playback cursor, handed to the engine as one
/// allocation so swapping it in never allocates on the render thread.
#[derive(Clone, Debug)]
pub struct LoadedModule {
    pub module: Arc<Module>,
    pub sequencer: Sequencer,
}

impl LoadedModule {
    pub fn new(module: Arc<Module>, start_order: usize) -> Self {
        let sequencer = Sequencer::new(&module, start_order);
        Self { module, sequencer }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Playback {
    Running,
    /// Song over, voices ringing out
    Fading { left: u32, total: u32 },
    Ended,
}

/// The main playback engine.
pub struct Engine {
    loaded: Option<Box<LoadedModule>>,
    /// One state per module channel
    channels: Vec<ChannelState, MAX_CHANNELS>,
    /// Audio sample rate (e.g., 44100)
    sample_rate: u32,
    settings: RenderSettings,
    /// Settings waiting for the next tick boundary
    pending: Option<RenderSettings>,
    sinc: SincTable,
    dsp: DspChain,
    /// Frames left in the current tick
    tick_frames: u32,
    /// Remainder of the frames-per-tick division
    tick_carry: u64,
    playback: Playback,
    non_finite: u32,
}

impl Engine {
    /// Create an engine with nothing loaded.
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            loaded: None,
            channels: Vec::new(),
            sample_rate,
            settings: RenderSettings::default(),
            pending: None,
            sinc: SincTable::new(),
            dsp: DspChain::new(sample_rate),
            tick_frames: 0,
            tick_carry: 0,
            playback: Playback::Running,
            non_finite: 0,
        }
    }

    /// Engine with initial settings applied immediately.
    pub fn with_settings(sample_rate: u32, mut settings: RenderSettings) -> Self {
        settings.sanitize();
        let mut engine = Self::new(sample_rate);
        engine.settings = settings;
        engine
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == 0 || sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.dsp.set_sample_rate(sample_rate);
        self.tick_carry = 0;
    }

    /// Swap in a module. The previous one is returned so it can be dropped
    /// off the render thread.
    pub fn load(&mut self, mut loaded: Box<LoadedModule>) -> Option<Box<LoadedModule>> {
        loaded
            .sequencer
            .set_repeat_count(self.settings().repeat_count);
        let previous = self.loaded.replace(loaded);
        self.restart();
        previous
    }

    pub fn unload(&mut self) -> Option<Box<LoadedModule>> {
        let previous = self.loaded.take();
        self.channels.clear();
        self.playback = Playback::Running;
        previous
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn module(&self) -> Option<&Arc<Module>> {
        self.loaded.as_ref().map(|l| &l.module)
    }

    pub fn sequencer(&self) -> Option<&Sequencer> {
        self.loaded.as_ref().map(|l| &l.sequencer)
    }

    /// Replace the module data (after an edit) keeping cursor and voices.
    pub fn replace_module(&mut self, module: Arc<Module>) -> Option<Arc<Module>> {
        let loaded = self.loaded.as_mut()?;
        let previous = core::mem::replace(&mut loaded.module, module);
        let channels = loaded.module.num_channels().min(MAX_CHANNELS);
        self.channels.truncate(channels);
        Some(previous)
    }

    /// Jump to a planned position. The displaced sequencer ends up in
    /// `target` for disposal by the caller.
    pub fn apply_seek(&mut self, target: &mut SeekTarget) {
        let Some(loaded) = self.loaded.as_mut() else {
            return;
        };
        core::mem::swap(&mut loaded.sequencer, &mut target.sequencer);
        loaded
            .sequencer
            .set_repeat_count(self.pending.as_ref().unwrap_or(&self.settings).repeat_count);
        self.restart();

        let Some(loaded) = self.loaded.as_deref() else {
            return;
        };
        let module = &*loaded.module;
        let ctx = tick_context(module, 0);
        for (channel, voice) in self.channels.iter_mut().zip(target.voices.iter()) {
            if let Some(voice) = voice {
                channel.resume_voice(voice, &ctx);
            }
        }
    }

    /// Reset channels and timing to the module's initial state.
    fn restart(&mut self) {
        self.channels.clear();
        if let Some(loaded) = self.loaded.as_deref() {
            for settings in loaded.module.channels.iter().take(MAX_CHANNELS) {
                let mut channel = ChannelState::new();
                channel.reset(settings);
                // Bounded by `take` above
                let _ = self.channels.push(channel);
            }
        }
        self.tick_frames = 0;
        self.tick_carry = 0;
        self.playback = Playback::Running;
        self.dsp.reset();
    }

    /// Settings as they will be after the next tick boundary.
    pub fn settings(&self) -> &RenderSettings {
        self.pending.as_ref().unwrap_or(&self.settings)
    }

    /// Queue new settings; they take effect at the next tick.
    pub fn set_settings(&mut self, mut settings: RenderSettings) {
        settings.sanitize();
        self.pending = Some(settings);
    }

    /// Set a render parameter, returning the stored (clamped) value.
    pub fn set_param(&mut self, param: RenderParam, value: i32) -> i32 {
        let mut settings = self.settings().clone();
        let stored = settings.set_param(param, value);
        self.pending = Some(settings);
        stored
    }

    pub fn set_control(&mut self, key: &str, value: &str) -> Result<(), ControlError> {
        let mut settings = self.settings().clone();
        settings.set_control(key, value)?;
        self.pending = Some(settings);
        Ok(())
    }

    pub fn position(&self) -> Option<PlaybackPosition> {
        let loaded = self.loaded.as_deref()?;
        Some(loaded.sequencer.position(&loaded.module))
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    /// The song has ended and nothing more will sound.
    pub fn is_finished(&self) -> bool {
        self.playback == Playback::Ended
    }

    /// Faults accumulated since the last call.
    pub fn take_fault(&mut self) -> Option<RenderFault> {
        let count = core::mem::take(&mut self.non_finite);
        (count > 0).then_some(RenderFault::NonFinite(count))
    }

    /// Render interleaved stereo frames into `out`.
    ///
    /// Returns the number of frames produced. This is `out.len() / 2`
    /// except once the song has ended with [`AtEnd::Stop`] or after the
    /// fade of [`AtEnd::Fadeout`]; frames past the count are zero.
    pub fn render(&mut self, sample_rate: u32, out: &mut [f32]) -> Result<usize, NotLoaded> {
        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| self.render_block(sample_rate, out))
        }
        #[cfg(not(feature = "alloc_check"))]
        {
            self.render_block(sample_rate, out)
        }
    }

    fn render_block(&mut self, sample_rate: u32, out: &mut [f32]) -> Result<usize, NotLoaded> {
        out.fill(0.0);
        if self.loaded.is_none() {
            return Err(NotLoaded);
        }
        self.set_sample_rate(sample_rate);

        let frames = out.len() / 2;
        let mut done = 0;
        while done < frames {
            match self.playback {
                Playback::Ended => break,
                Playback::Fading { left, total } => {
                    let n = (left as usize).min(frames - done);
                    let block = &mut out[done * 2..(done + n) * 2];
                    self.mix_block(block);
                    for (i, frame) in block.chunks_exact_mut(2).enumerate() {
                        let gain = (left - i as u32) as f32 / total as f32;
                        frame[0] *= gain;
                        frame[1] *= gain;
                    }
                    done += n;
                    let left = left - n as u32;
                    self.playback = if left == 0 {
                        Playback::Ended
                    } else {
                        Playback::Fading { left, total }
                    };
                }
                Playback::Running => {
                    if self.tick_frames == 0 && !self.next_tick() {
                        self.finish_song();
                        continue;
                    }
                    let n = (self.tick_frames as usize).min(frames - done);
                    self.mix_block(&mut out[done * 2..(done + n) * 2]);
                    self.tick_frames -= n as u32;
                    done += n;
                }
            }
        }

        self.post_process(&mut out[..done * 2]);
        if self.playback == Playback::Ended && self.settings.at_end == AtEnd::Continue {
            Ok(frames)
        } else {
            Ok(done)
        }
    }

    fn finish_song(&mut self) {
        self.playback = match self.settings.at_end {
            AtEnd::Fadeout => {
                let total = (self.sample_rate / FADEOUT_DIVISOR).max(1);
                Playback::Fading { left: total, total }
            }
            AtEnd::Stop | AtEnd::Continue => Playback::Ended,
        };
    }

    /// Advance the sequencer one tick and update every channel. Returns
    /// false once the song has ended.
    fn next_tick(&mut self) -> bool {
        if let Some(settings) = self.pending.take() {
            self.settings = settings;
            if let Some(loaded) = self.loaded.as_mut() {
                loaded.sequencer.set_repeat_count(self.settings.repeat_count);
            }
        }
        let Some(loaded) = self.loaded.as_deref_mut() else {
            return false;
        };
        let module = &*loaded.module;
        let sequencer = &mut loaded.sequencer;
        let event = sequencer.advance_tick(module);
        if event.song_ended {
            return false;
        }

        let ctx = tick_context(module, sequencer.effect_tick());
        if event.row_changed {
            let pattern = module.pattern_at(sequencer.order());
            let empty = Cell::empty();
            for (ch, channel) in self.channels.iter_mut().enumerate() {
                let cell = pattern
                    .and_then(|p| p.get(sequencer.row(), ch as u8))
                    .unwrap_or(&empty);
                channel.process_row(cell, &ctx);
            }
        } else {
            for channel in self.channels.iter_mut() {
                channel.process_tick(&ctx);
            }
        }

        let global_volume = sequencer.global_volume();
        let preamp = (2.0 / self.channels.len().max(1) as f32).min(1.0);
        let ramp_frames = self.settings.ramp_frames(self.sample_rate);
        for channel in self.channels.iter_mut() {
            channel.update_instrument(&ctx);
            channel.update_output(&ctx, self.sample_rate, global_volume, preamp, ramp_frames);
        }

        // 2.5 / tempo seconds per tick
        let numerator = self.sample_rate as u64 * 5 + self.tick_carry;
        let denominator = sequencer.tempo().max(1) as u64 * 2;
        self.tick_frames = ((numerator / denominator) as u32).max(1);
        self.tick_carry = numerator % denominator;
        true
    }

    /// Add every playing channel into `block`.
    fn mix_block(&mut self, block: &mut [f32]) {
        let Some(loaded) = self.loaded.as_deref() else {
            return;
        };
        let mode = Interpolation::from_taps(self.settings.filter_length);
        for channel in self.channels.iter_mut() {
            let Some(sample) = channel
                .sample
                .and_then(|s| loaded.module.samples.get(s as usize))
            else {
                continue;
            };
            channel.mix(sample, block, mode, &self.sinc);
        }
    }

    /// Stereo separation, master gain and DSP over the rendered frames.
    fn post_process(&mut self, block: &mut [f32]) {
        let separation = self.settings.stereo_separation_percent as f32 / 100.0;
        let gain = self.settings.master_gain as f32;
        for pair in block.chunks_exact_mut(2) {
            let frame = Frame {
                left: pair[0],
                right: pair[1],
            }
            .separate(separation)
            .scale(gain);
            pair[0] = frame.left;
            pair[1] = frame.right;
        }
        self.dsp.process(self.settings.dsp, block);
        self.non_finite = self.non_finite.saturating_add(scrub(block));
    }
}

fn tick_context(module: &Module, tick: u16) -> TickContext<'_> {
    TickContext {
        module,
        tick,
        mode: module.frequency_mode,
        limits: period_limits(module),
        xm: module.format.is_xm(),
    }
}

/// Replace NaN and infinities with silence, returning how many there were.
fn scrub(block: &mut [f32]) -> u32 {
    let mut count = 0;
    for s in block.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
            count += 1;
        }
    }
    count
}
