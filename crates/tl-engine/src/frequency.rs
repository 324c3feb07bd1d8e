//! Note/period/frequency conversion for sample playback.
//!
//! Periods are kept in FastTracker-style units: Amiga periods scaled by
//! four (C-4 = 1712), or linear periods of 64 units per semitone
//! (C-4 = 4608). The resampling increment is a 32.32 fixed-point step
//! through the sample data per output frame.

use tl_ir::{FrequencyMode, Module, ModuleFormat};

/// Amiga period (×4) of C-4, the note a sample's `c4_speed` refers to.
pub const AMIGA_C4_PERIOD: i32 = 1712;
/// Linear period of C-4.
pub const LINEAR_C4_PERIOD: i32 = 4608;
/// Linear period units per semitone.
pub const LINEAR_SEMITONE: i32 = 64;

/// Amiga periods (×4) for notes 60-71 (C-4 to B-4).
const BASE_PERIODS: [i32; 12] = [
    1712, 1616, 1525, 1440, 1357, 1281, 1209, 1141, 1077, 1017, 961, 907,
];

/// Fixed-point one (32.32).
pub const PHASE_ONE: u64 = 1 << 32;

/// Convert a note (60 = C-4) to a period in the given mode.
pub fn note_to_period(note: u8, mode: FrequencyMode) -> i32 {
    match mode {
        FrequencyMode::Linear => LINEAR_C4_PERIOD - (note as i32 - 60) * LINEAR_SEMITONE,
        FrequencyMode::Amiga => {
            let offset = note as i32 - 60;
            let semitone = offset.rem_euclid(12) as usize;
            let octave = offset.div_euclid(12);
            let base = BASE_PERIODS[semitone];
            if octave >= 0 {
                (base >> octave).max(1)
            } else {
                base << (-octave).min(16)
            }
        }
    }
}

/// Playback frequency in Hz for a period and the sample's C-4 rate.
pub fn period_to_frequency(period: i32, c4_speed: u32, mode: FrequencyMode) -> f64 {
    if period <= 0 {
        return 0.0;
    }
    match mode {
        FrequencyMode::Amiga => c4_speed as f64 * AMIGA_C4_PERIOD as f64 / period as f64,
        FrequencyMode::Linear => {
            let octaves = (LINEAR_C4_PERIOD - period) as f64 / (12 * LINEAR_SEMITONE) as f64;
            c4_speed as f64 * libm::exp2(octaves)
        }
    }
}

/// 32.32 fixed-point step through sample data per output frame.
pub fn frequency_to_increment(freq: f64, sample_rate: u32) -> u64 {
    if sample_rate == 0 || !(freq > 0.0) {
        return 0;
    }
    let step = freq / sample_rate as f64 * PHASE_ONE as f64;
    if step >= u64::MAX as f64 {
        u64::MAX
    } else {
        step as u64
    }
}

/// Period change for transposing `note` by `semitones` (arpeggio).
pub fn semitone_offset(note: u8, semitones: u8, mode: FrequencyMode) -> i32 {
    match mode {
        FrequencyMode::Linear => -(semitones as i32) * LINEAR_SEMITONE,
        FrequencyMode::Amiga => {
            let target = note.saturating_add(semitones).min(tl_ir::NOTE_MAX);
            note_to_period(target, mode) - note_to_period(note, mode)
        }
    }
}

/// Allowed period range for slides in this module.
pub fn period_limits(module: &Module) -> (i32, i32) {
    match module.format {
        // ProTracker's five octaves, B-6 .. C-2
        ModuleFormat::Mod { .. } => (57 * 4, 1712 * 4),
        ModuleFormat::Xm { .. } => (1, 32000),
    }
}

/// C-4 rate for a ProTracker-style finetune (-8..=7).
pub fn finetune_c4_speed(finetune: i8) -> u32 {
    let factor = libm::exp2(finetune as f64 / 96.0);
    (tl_ir::DEFAULT_C4_SPEED as f64 * factor + 0.5) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const C4_SPEED: u32 = 8363;
    const SAMPLE_RATE: u32 = 44100;

    #[test]
    fn c4_plays_at_c4_speed() {
        let amiga = note_to_period(60, FrequencyMode::Amiga);
        assert_eq!(amiga, AMIGA_C4_PERIOD);
        let f = period_to_frequency(amiga, C4_SPEED, FrequencyMode::Amiga);
        assert!((f - C4_SPEED as f64).abs() < 1e-9);

        let linear = note_to_period(60, FrequencyMode::Linear);
        assert_eq!(linear, LINEAR_C4_PERIOD);
        let f = period_to_frequency(linear, C4_SPEED, FrequencyMode::Linear);
        assert!((f - C4_SPEED as f64).abs() < 1e-9);
    }

    #[test]
    fn octave_up_doubles_frequency() {
        for mode in [FrequencyMode::Amiga, FrequencyMode::Linear] {
            let base = period_to_frequency(note_to_period(60, mode), C4_SPEED, mode);
            let up = period_to_frequency(note_to_period(72, mode), C4_SPEED, mode);
            assert!((up / base - 2.0).abs() < 1e-3, "{:?}", mode);
        }
    }

    #[test]
    fn amiga_periods_match_protracker_table() {
        // ProTracker C-2 = 856, C-3 = 428, B-4 = 113 (×4 here)
        assert_eq!(note_to_period(48, FrequencyMode::Amiga), 856 * 4);
        assert_eq!(note_to_period(61, FrequencyMode::Amiga), 404 * 4);
        assert_eq!(note_to_period(36, FrequencyMode::Amiga), 1712 * 4);
    }

    #[test]
    fn increment_is_ratio_of_rates() {
        let inc = frequency_to_increment(SAMPLE_RATE as f64, SAMPLE_RATE);
        assert_eq!(inc, PHASE_ONE);
        let half = frequency_to_increment(SAMPLE_RATE as f64 / 2.0, SAMPLE_RATE);
        assert_eq!(half, PHASE_ONE / 2);
        assert_eq!(frequency_to_increment(8363.0, 0), 0);
        assert_eq!(frequency_to_increment(f64::NAN, SAMPLE_RATE), 0);
    }

    #[test]
    fn zero_period_is_silent() {
        assert_eq!(period_to_frequency(0, C4_SPEED, FrequencyMode::Amiga), 0.0);
    }

    #[test]
    fn arpeggio_offsets() {
        assert_eq!(semitone_offset(60, 12, FrequencyMode::Linear), -768);
        assert_eq!(
            semitone_offset(60, 12, FrequencyMode::Amiga),
            note_to_period(72, FrequencyMode::Amiga) - AMIGA_C4_PERIOD
        );
    }

    #[test]
    fn finetune_scales_c4_speed() {
        assert_eq!(finetune_c4_speed(0), 8363);
        assert!(finetune_c4_speed(-8) < 8363);
        assert!(finetune_c4_speed(7) > 8363);
    }
}
