//! Sample data types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Playback rate of an untransposed sample at C-4.
pub const DEFAULT_C4_SPEED: u32 = 8363;

/// A sample definition.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<26>,
    /// Audio data
    pub data: SampleData,
    /// Loop start position (in frames)
    pub loop_start: u32,
    /// Loop end position (in frames, exclusive)
    pub loop_end: u32,
    /// Loop type
    pub loop_type: LoopType,
    /// Default volume (0-64)
    pub default_volume: u8,
    /// Default panning (-64 to +64, 0 = center). `None` keeps the channel pan.
    pub default_pan: Option<i8>,
    /// Frequency of C-4 in Hz, with relative note and finetune folded in
    pub c4_speed: u32,
    /// Auto-vibrato settings
    pub vibrato: Option<AutoVibrato>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Mono8(Vec::new()),
            loop_start: 0,
            loop_end: 0,
            loop_type: LoopType::None,
            default_volume: 64,
            default_pan: None,
            c4_speed: DEFAULT_C4_SPEED,
            vibrato: None,
        }
    }
}

impl Sample {
    /// Create a new empty sample. Names longer than 26 bytes are truncated.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        push_truncated(&mut sample.name, name);
        sample
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a loop.
    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_end > self.loop_start
    }

    /// Clamp loop points into the sample and drop loops that end up empty.
    pub fn sanitize_loop(&mut self) {
        let len = self.len() as u32;
        self.loop_end = self.loop_end.min(len);
        if self.loop_start >= self.loop_end {
            self.loop_start = 0;
            self.loop_end = 0;
            self.loop_type = LoopType::None;
        }
    }
}

/// Sample audio data.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// 8-bit mono samples
    Mono8(Vec<i8>),
    /// 16-bit mono samples
    Mono16(Vec<i16>),
    /// 8-bit stereo samples (left, right)
    Stereo8(Vec<i8>, Vec<i8>),
    /// 16-bit stereo samples (left, right)
    Stereo16(Vec<i16>, Vec<i16>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
            SampleData::Stereo8(l, _) => l.len(),
            SampleData::Stereo16(l, _) => l.len(),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a mono sample value at position (as i16).
    /// For stereo, returns the left channel. Out of range reads are silent.
    pub fn get_mono(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Mono16(v) => v.get(pos).copied().unwrap_or(0),
            SampleData::Stereo8(l, _) => l.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Stereo16(l, _) => l.get(pos).copied().unwrap_or(0),
        }
    }

    /// Get a sample from the right channel (returns left for mono).
    pub fn get_right(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Mono16(v) => v.get(pos).copied().unwrap_or(0),
            SampleData::Stereo8(_, r) => r.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Stereo16(_, r) => r.get(pos).copied().unwrap_or(0),
        }
    }

    /// Left/right pair normalized to [-1.0, 1.0).
    #[inline]
    pub fn frame_f32(&self, pos: usize) -> (f32, f32) {
        const SCALE: f32 = 1.0 / 32768.0;
        match self {
            SampleData::Mono8(_) | SampleData::Mono16(_) => {
                let v = self.get_mono(pos) as f32 * SCALE;
                (v, v)
            }
            _ => (
                self.get_mono(pos) as f32 * SCALE,
                self.get_right(pos) as f32 * SCALE,
            ),
        }
    }

    /// Number of channels in the sample data.
    pub fn num_channels(&self) -> u16 {
        match self {
            SampleData::Mono8(_) | SampleData::Mono16(_) => 1,
            SampleData::Stereo8(_, _) | SampleData::Stereo16(_, _) => 2,
        }
    }

    /// Bits per sample point (8 or 16).
    pub fn bits(&self) -> u8 {
        match self {
            SampleData::Mono8(_) | SampleData::Stereo8(_, _) => 8,
            SampleData::Mono16(_) | SampleData::Stereo16(_, _) => 16,
        }
    }
}

/// Sample loop type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// No loop
    #[default]
    None,
    /// Forward loop
    Forward,
    /// Ping-pong (bidirectional) loop
    PingPong,
}

/// Auto-vibrato settings for a sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Vibrato speed
    pub speed: u8,
    /// Vibrato depth
    pub depth: u8,
    /// Vibrato sweep (ramp-up time in ticks)
    pub sweep: u8,
    /// Waveform type (0=sine, 1=square, 2=ramp down, 3=ramp up)
    pub waveform: u8,
}

pub(crate) fn push_truncated<const N: usize>(dst: &mut ArrayString<N>, src: &str) {
    for ch in src.chars() {
        if dst.try_push(ch).is_err() {
            break;
        }
    }
}
