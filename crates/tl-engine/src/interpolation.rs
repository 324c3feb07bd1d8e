//! Loop-aware sample reads and resampling filters.

use alloc::vec::Vec;
use core::f64::consts::PI;

use tl_ir::{LoopType, Sample};

/// Sub-sample resolution of the windowed-sinc table.
const SINC_PHASES: usize = 256;
/// Taps of the windowed-sinc filter.
pub const SINC_TAPS: usize = 8;

/// Resampling filter chosen by the interpolation filter length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Sinc,
}

impl Interpolation {
    /// Map a filter length (1, 2, 4, 8 taps) to a filter.
    pub fn from_taps(taps: i32) -> Self {
        match taps {
            i32::MIN..=1 => Interpolation::Nearest,
            2..=3 => Interpolation::Linear,
            4..=7 => Interpolation::Cubic,
            _ => Interpolation::Sinc,
        }
    }
}

/// Precomputed Lanczos-windowed sinc coefficients, `SINC_PHASES` rows of
/// `SINC_TAPS` taps covering offsets -3..=4 around the read position.
pub struct SincTable {
    coeffs: Vec<f32>,
}

impl SincTable {
    pub fn new() -> Self {
        let mut coeffs = Vec::with_capacity(SINC_PHASES * SINC_TAPS);
        let half = (SINC_TAPS / 2) as f64;
        for phase in 0..SINC_PHASES {
            let frac = phase as f64 / SINC_PHASES as f64;
            let mut row = [0.0f64; SINC_TAPS];
            let mut sum = 0.0;
            for (k, c) in row.iter_mut().enumerate() {
                let x = k as f64 - (half - 1.0) - frac;
                *c = sinc(x) * sinc(x / half);
                sum += *c;
            }
            for c in row {
                coeffs.push((c / sum) as f32);
            }
        }
        Self { coeffs }
    }

    #[inline]
    fn row(&self, frac: f32) -> &[f32] {
        let phase = ((frac * SINC_PHASES as f32) as usize).min(SINC_PHASES - 1);
        &self.coeffs[phase * SINC_TAPS..(phase + 1) * SINC_TAPS]
    }
}

impl Default for SincTable {
    fn default() -> Self {
        Self::new()
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        libm::sin(PI * x) / (PI * x)
    }
}

/// Read one frame at a (possibly out-of-range) index, following the loop.
/// Indices before the start or past an unlooped end are silent.
#[inline]
pub fn tap(sample: &Sample, index: i64) -> (f32, f32) {
    let len = sample.len() as i64;
    let index = if sample.has_loop() && index >= sample.loop_end as i64 {
        let start = sample.loop_start as i64;
        let end = sample.loop_end as i64;
        let span = end - start;
        match sample.loop_type {
            LoopType::Forward => start + (index - end) % span,
            LoopType::PingPong => {
                let offset = (index - end) % (2 * span);
                if offset < span {
                    end - 1 - offset
                } else {
                    start + (offset - span)
                }
            }
            LoopType::None => index,
        }
    } else {
        index
    };
    if index < 0 || index >= len {
        (0.0, 0.0)
    } else {
        sample.data.frame_f32(index as usize)
    }
}

/// Interpolated read at integer position `pos` plus fraction `frac` in [0, 1).
#[inline]
pub fn read(sample: &Sample, pos: i64, frac: f32, mode: Interpolation, table: &SincTable) -> (f32, f32) {
    match mode {
        Interpolation::Nearest => tap(sample, pos),
        Interpolation::Linear => {
            let (l0, r0) = tap(sample, pos);
            let (l1, r1) = tap(sample, pos + 1);
            (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
        }
        Interpolation::Cubic => {
            let a = tap(sample, pos - 1);
            let b = tap(sample, pos);
            let c = tap(sample, pos + 1);
            let d = tap(sample, pos + 2);
            (
                hermite(a.0, b.0, c.0, d.0, frac),
                hermite(a.1, b.1, c.1, d.1, frac),
            )
        }
        Interpolation::Sinc => {
            let row = table.row(frac);
            let mut left = 0.0;
            let mut right = 0.0;
            for (k, &c) in row.iter().enumerate() {
                let (l, r) = tap(sample, pos - 3 + k as i64);
                left += l * c;
                right += r * c;
            }
            (left, right)
        }
    }
}

#[inline]
fn hermite(y0: f32, y1: f32, y2: f32, y3: f32, t: f32) -> f32 {
    let c0 = y1;
    let c1 = 0.5 * (y2 - y0);
    let c2 = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c3 = 0.5 * (y3 - y0) + 1.5 * (y1 - y2);
    ((c3 * t + c2) * t + c1) * t + c0
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tl_ir::SampleData;

    fn ramp(len: usize) -> Sample {
        let mut s = Sample::new("ramp");
        s.data = SampleData::Mono16((0..len as i16).map(|i| i * 1000).collect());
        s
    }

    #[test]
    fn filter_length_mapping() {
        assert_eq!(Interpolation::from_taps(0), Interpolation::Nearest);
        assert_eq!(Interpolation::from_taps(1), Interpolation::Nearest);
        assert_eq!(Interpolation::from_taps(2), Interpolation::Linear);
        assert_eq!(Interpolation::from_taps(3), Interpolation::Linear);
        assert_eq!(Interpolation::from_taps(4), Interpolation::Cubic);
        assert_eq!(Interpolation::from_taps(8), Interpolation::Sinc);
        assert_eq!(Interpolation::from_taps(100), Interpolation::Sinc);
    }

    #[test]
    fn unlooped_reads_outside_are_silent() {
        let s = ramp(4);
        assert_eq!(tap(&s, -1), (0.0, 0.0));
        assert_eq!(tap(&s, 4), (0.0, 0.0));
        assert!(tap(&s, 3).0 > 0.0);
    }

    #[test]
    fn forward_loop_wraps_reads() {
        let mut s = ramp(8);
        s.loop_start = 4;
        s.loop_end = 8;
        s.loop_type = LoopType::Forward;
        assert_eq!(tap(&s, 8), tap(&s, 4));
        assert_eq!(tap(&s, 13), tap(&s, 5));
    }

    #[test]
    fn pingpong_loop_reflects_reads() {
        let mut s = ramp(8);
        s.loop_start = 4;
        s.loop_end = 8;
        s.loop_type = LoopType::PingPong;
        assert_eq!(tap(&s, 8), tap(&s, 7));
        assert_eq!(tap(&s, 11), tap(&s, 4));
        assert_eq!(tap(&s, 12), tap(&s, 4));
        assert_eq!(tap(&s, 13), tap(&s, 5));
    }

    #[test]
    fn sinc_rows_are_normalized() {
        let table = SincTable::new();
        for frac in [0.0, 0.25, 0.5, 0.99] {
            let sum: f32 = table.row(frac).iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "frac {} sum {}", frac, sum);
        }
    }

    #[test]
    fn all_filters_reproduce_dc() {
        let mut s = Sample::new("dc");
        s.data = SampleData::Mono16(vec![16384; 64]);
        let table = SincTable::new();
        for mode in [
            Interpolation::Nearest,
            Interpolation::Linear,
            Interpolation::Cubic,
            Interpolation::Sinc,
        ] {
            let (l, r) = read(&s, 32, 0.4, mode, &table);
            assert!((l - 0.5).abs() < 1e-3, "{:?} gave {}", mode, l);
            assert_eq!(l, r);
        }
    }

    #[test]
    fn linear_interpolates_between_points() {
        let s = ramp(4);
        let table = SincTable::new();
        let (l, _) = read(&s, 1, 0.5, Interpolation::Linear, &table);
        let expected = 1500.0 / 32768.0;
        assert!((l - expected).abs() < 1e-6);
    }
}
