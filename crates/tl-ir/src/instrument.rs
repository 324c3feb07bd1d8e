//! Instrument and envelope types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::sample::push_truncated;

/// Number of entries in an instrument's note→sample map.
pub const NOTE_MAP_SIZE: usize = 120;

/// An instrument definition.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<26>,
    /// Sample mapping: note (0-119) -> global sample index
    pub sample_map: [Option<u16>; NOTE_MAP_SIZE],
    /// Volume envelope
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope
    pub panning_envelope: Option<Envelope>,
    /// Fadeout speed per tick, out of 65536 (0 = no fade)
    pub fadeout: u16,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            sample_map: [None; NOTE_MAP_SIZE],
            volume_envelope: None,
            panning_envelope: None,
            fadeout: 0,
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        let mut inst = Self::default();
        push_truncated(&mut inst.name, name);
        inst
    }

    /// Set all notes to map to a single sample.
    pub fn set_single_sample(&mut self, sample_index: u16) {
        self.sample_map.fill(Some(sample_index));
    }

    /// Sample played for `note` (1-119), if any.
    pub fn sample_for(&self, note: u8) -> Option<u16> {
        self.sample_map.get(note as usize).copied().flatten()
    }
}

/// An envelope (volume or panning).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Envelope points
    pub points: Vec<EnvelopePoint>,
    /// Sustain loop start point index (None = no sustain)
    pub sustain_start: Option<u8>,
    /// Sustain loop end point index
    pub sustain_end: Option<u8>,
    /// Regular loop start point index (None = no loop)
    pub loop_start: Option<u8>,
    /// Regular loop end point index
    pub loop_end: Option<u8>,
    /// Is the envelope enabled?
    pub enabled: bool,
}

impl Envelope {
    /// Create a new empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point to the envelope.
    pub fn add_point(&mut self, tick: u16, value: i8) {
        self.points.push(EnvelopePoint { tick, value });
    }

    /// Tick of the point at `index`, if it exists.
    pub fn tick_of(&self, index: Option<u8>) -> Option<u16> {
        index.and_then(|i| self.points.get(i as usize)).map(|p| p.tick)
    }

    /// Tick of the last point.
    pub fn last_tick(&self) -> u16 {
        self.points.last().map_or(0, |p| p.tick)
    }

    /// Get the interpolated value at a given tick.
    pub fn value_at(&self, tick: u16) -> i8 {
        if self.points.is_empty() {
            return 0;
        }

        let mut prev = &self.points[0];
        for point in &self.points {
            if point.tick > tick {
                if point.tick <= prev.tick {
                    return point.value;
                }
                let t = (tick.saturating_sub(prev.tick)) as i32;
                let d = (point.tick - prev.tick) as i32;
                let v = prev.value as i32 + (point.value as i32 - prev.value as i32) * t / d;
                return v as i8;
            }
            prev = point;
        }

        // Past the last point
        prev.value
    }
}

/// A point in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Tick position (0-65535)
    pub tick: u16,
    /// Value (0 to 64 for volume, -32 to +32 for panning)
    pub value: i8,
}
