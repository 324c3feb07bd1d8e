//! Audio-thread side of the player.
//!
//! The [`RenderDriver`] owns the [`Engine`]. Everything else reaches it
//! through lock-free queues: commands in, replaced payloads and reports out.
//! Commands are drained at the top of every callback; render settings are
//! then latched by the engine at its next tick boundary. A command is only
//! taken while the return queue has room for what it displaces, so the
//! audio thread never frees a payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};
use tl_audio::AudioCallback;
use tl_engine::{Engine, LoadedModule, RenderFault, RenderSettings, SeekTarget};
use tl_ir::Module;

use crate::snapshot::PositionSnapshot;

/// Control → audio thread.
pub(crate) enum Command {
    Load(Box<LoadedModule>),
    Unload,
    /// Same song with edited pattern data
    ReplaceModule(Arc<Module>),
    Seek(Box<SeekTarget>),
    Settings(RenderSettings),
}

impl Command {
    /// Whether applying the command moves the cursor somewhere new.
    pub(crate) fn moves_cursor(&self) -> bool {
        matches!(self, Command::Load(_) | Command::Unload | Command::Seek(_))
    }
}

/// Payloads displaced on the audio thread, dropped on the control side.
pub(crate) enum Garbage {
    Module(Box<LoadedModule>),
    Data(Arc<Module>),
    Seek(Box<SeekTarget>),
}

/// Audio thread → control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Report {
    /// Song end, tagged with the number of cursor moves applied before it
    Ended { epoch: u32 },
    RenderFault(RenderFault),
}

/// State shared by both sides without queues.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub playing: AtomicBool,
    pub snapshot: PositionSnapshot,
}

/// Renders audio on the host's audio thread.
pub struct RenderDriver {
    engine: Engine,
    commands: HeapCons<Command>,
    garbage: HeapProd<Garbage>,
    reports: HeapProd<Report>,
    shared: Arc<Shared>,
    /// Interleaved stereo scratch, `block_frames * 2` long
    block: Box<[f32]>,
    ended_reported: bool,
    epoch: u32,
}

impl RenderDriver {
    pub(crate) fn new(
        engine: Engine,
        block_frames: usize,
        commands: HeapCons<Command>,
        garbage: HeapProd<Garbage>,
        reports: HeapProd<Report>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            engine,
            commands,
            garbage,
            reports,
            shared,
            block: vec![0.0; block_frames.max(1) * 2].into_boxed_slice(),
            ended_reported: false,
            epoch: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Match the device rate. Call before handing the driver to a backend.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.engine.set_sample_rate(sample_rate);
    }

    /// Fill an interleaved buffer of `channels` samples per frame. Mono gets
    /// the average of left and right; channels past the second are zeroed.
    pub fn process_interleaved(&mut self, out: &mut [f32], channels: usize) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.interleaved(out, channels));
        #[cfg(not(feature = "alloc_check"))]
        self.interleaved(out, channels);
    }

    /// Fill separate left and right buffers.
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.planar(left, right));
        #[cfg(not(feature = "alloc_check"))]
        self.planar(left, right);
    }

    fn interleaved(&mut self, out: &mut [f32], channels: usize) {
        if !self.begin() || channels == 0 {
            out.fill(0.0);
            return;
        }
        let block_frames = self.block.len() / 2;
        for chunk in out.chunks_mut(block_frames * channels) {
            let frames = chunk.len() / channels;
            let stereo = self.render_block(frames);
            for (dst, src) in chunk.chunks_mut(channels).zip(stereo.chunks_exact(2)) {
                match dst {
                    [mono] => *mono = (src[0] + src[1]) * 0.5,
                    [l, r, rest @ ..] => {
                        *l = src[0];
                        *r = src[1];
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
            // Partial trailing frame
            chunk[frames * channels..].fill(0.0);
        }
        self.finish();
    }

    fn planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
        if !self.begin() {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        let block_frames = self.block.len() / 2;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(block_frames);
            let stereo = self.render_block(n);
            for (i, src) in stereo.chunks_exact(2).enumerate() {
                left[done + i] = src[0];
                right[done + i] = src[1];
            }
            done += n;
        }
        self.finish();
    }

    /// Apply queued commands. Returns whether audio should be rendered.
    fn begin(&mut self) -> bool {
        while !self.garbage.is_full() {
            let Some(command) = self.commands.try_pop() else {
                break;
            };
            self.apply(command);
        }
        let playing = self.shared.playing.load(Ordering::Acquire);
        if !playing {
            self.publish();
        }
        playing
    }

    fn apply(&mut self, command: Command) {
        if command.moves_cursor() {
            self.epoch = self.epoch.wrapping_add(1);
        }
        let displaced = match command {
            Command::Load(loaded) => {
                self.ended_reported = false;
                self.engine.load(loaded).map(Garbage::Module)
            }
            Command::Unload => self.engine.unload().map(Garbage::Module),
            Command::ReplaceModule(module) => self.engine.replace_module(module).map(Garbage::Data),
            Command::Seek(mut target) => {
                self.ended_reported = false;
                self.engine.apply_seek(&mut target);
                Some(Garbage::Seek(target))
            }
            Command::Settings(settings) => {
                self.engine.set_settings(settings);
                None
            }
        };
        if let Some(garbage) = displaced {
            // Room was checked before the command was taken
            let _ = self.garbage.try_push(garbage);
        }
    }

    /// Render up to `frames` into the scratch block, zero-filling whatever
    /// the engine did not produce.
    fn render_block(&mut self, frames: usize) -> &[f32] {
        let sample_rate = self.engine.sample_rate();
        let stereo = &mut self.block[..frames * 2];
        let produced = self.engine.render(sample_rate, stereo).unwrap_or(0);
        stereo[produced * 2..].fill(0.0);
        stereo
    }

    fn finish(&mut self) {
        if let Some(fault) = self.engine.take_fault() {
            let _ = self.reports.try_push(Report::RenderFault(fault));
        }
        if self.engine.is_finished() && !self.ended_reported {
            let report = Report::Ended { epoch: self.epoch };
            self.ended_reported = self.reports.try_push(report).is_ok();
        }
        self.publish();
    }

    fn publish(&self) {
        self.shared.snapshot.publish(self.engine.position().as_ref());
    }
}

impl AudioCallback for RenderDriver {
    fn process(&mut self, out: &mut [f32], channels: usize) {
        self.process_interleaved(out, channels);
    }
}
