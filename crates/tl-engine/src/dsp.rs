//! Optional post-mix DSP stages.
//!
//! All stages run in place over interleaved stereo `f32` buffers and keep
//! their filter memory between calls, so block boundaries are seamless.

use core::f32::consts::TAU;

/// Cutoff of the bass-boost low-pass.
const MEGABASS_CUTOFF: f32 = 100.0;
/// Amount of low-passed signal fed back into the mix.
const MEGABASS_GAIN: f32 = 0.75;

/// Which DSP stages are enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DspFlags {
    pub megabass: bool,
    pub noise_reduction: bool,
    pub eq_4tap: bool,
}

/// One-pole RC low-pass: `y = y_prev + alpha * (x - y_prev)`.
#[derive(Clone, Copy, Debug, Default)]
struct OnePole {
    left: f32,
    right: f32,
}

impl OnePole {
    #[inline]
    fn process(&mut self, alpha: f32, left: f32, right: f32) -> (f32, f32) {
        self.left += alpha * (left - self.left);
        self.right += alpha * (right - self.right);
        (self.left, self.right)
    }
}

/// Filter memory for the DSP chain.
#[derive(Clone, Debug, Default)]
pub struct DspChain {
    bass: OnePole,
    bass_alpha: f32,
    /// Previous input frame (noise reduction)
    prev: (f32, f32),
    /// Three previous input frames, newest first (4-tap EQ)
    history: [(f32, f32); 3],
}

impl DspChain {
    pub fn new(sample_rate: u32) -> Self {
        let mut chain = Self::default();
        chain.set_sample_rate(sample_rate);
        chain
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let rate = sample_rate.max(1) as f32;
        self.bass_alpha = (TAU * MEGABASS_CUTOFF / rate).min(1.0);
    }

    /// Clear all filter memory.
    pub fn reset(&mut self) {
        self.bass = OnePole::default();
        self.prev = (0.0, 0.0);
        self.history = [(0.0, 0.0); 3];
    }

    /// Run the enabled stages over an interleaved stereo buffer.
    pub fn process(&mut self, flags: DspFlags, buffer: &mut [f32]) {
        if flags == DspFlags::default() {
            return;
        }
        for pair in buffer.chunks_exact_mut(2) {
            let (mut l, mut r) = (pair[0], pair[1]);

            if flags.eq_4tap {
                let [h1, h2, h3] = self.history;
                self.history = [(l, r), h1, h2];
                l = (l + 3.0 * h1.0 + 3.0 * h2.0 + h3.0) * 0.125;
                r = (r + 3.0 * h1.1 + 3.0 * h2.1 + h3.1) * 0.125;
            }

            if flags.noise_reduction {
                let (pl, pr) = self.prev;
                self.prev = (l, r);
                l = (l + pl) * 0.5;
                r = (r + pr) * 0.5;
            }

            if flags.megabass {
                let (bl, br) = self.bass.process(self.bass_alpha, l, r);
                l += bl * MEGABASS_GAIN;
                r += br * MEGABASS_GAIN;
            }

            pair[0] = l;
            pair[1] = r;
        }
    }
}
