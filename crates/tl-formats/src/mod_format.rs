//! ProTracker MOD format parser.
//!
//! Covers the 31-sample family (`M.K.`, `M!K!`, `M&K!`, `FLT4/8`, `xCHN`,
//! `xxCH`, `xxCN`, `OCTA`, `CD81`, `TDZx`) and the headerless 15-sample
//! Soundtracker layout.

use tl_ir::{Cell, LoopType, Module, ModuleFormat, Note, Pattern, Sample, SampleData, DEFAULT_C4_SPEED};

use crate::reader::ByteReader;
use crate::{FormatError, LoadOptions};

const ROWS: u16 = 64;
const SAMPLE_HEADER_LEN: usize = 30;

/// Amiga periods for notes 36 (C-2) through 95 (B-6); period 428 is C-4.
const PERIODS: [u16; 60] = [
    1712, 1616, 1525, 1440, 1357, 1281, 1209, 1141, 1077, 1017, 961, 907,
    856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453,
    428, 404, 381, 360, 339, 320, 302, 285, 269, 254, 240, 226,
    214, 202, 190, 180, 170, 160, 151, 143, 135, 127, 120, 113,
    107, 101, 95, 90, 85, 80, 76, 71, 67, 64, 60, 57,
];
const FIRST_PERIOD_NOTE: u8 = 36;

/// Header layout of a detected MOD variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ModLayout {
    pub channels: u8,
    pub num_samples: usize,
    pub magic: [u8; 4],
    pub tracker: &'static str,
}

impl ModLayout {
    fn is_soundtracker(&self) -> bool {
        self.num_samples == 15
    }

    fn is_flt8(&self) -> bool {
        &self.magic == b"FLT8"
    }

    fn order_offset(&self) -> usize {
        20 + self.num_samples * SAMPLE_HEADER_LEN
    }

    fn pattern_offset(&self) -> usize {
        self.order_offset() + 2 + 128 + if self.is_soundtracker() { 0 } else { 4 }
    }
}

/// Identify a MOD variant by its signature, falling back to the
/// 15-sample layout when the header looks plausible.
pub(crate) fn detect(data: &[u8]) -> Option<ModLayout> {
    if data.len() >= 1084 {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[1080..1084]);
        if let Some((channels, tracker)) = channels_for_magic(&magic) {
            return Some(ModLayout {
                channels,
                num_samples: 31,
                magic,
                tracker,
            });
        }
    }
    detect_soundtracker(data)
}

fn channels_for_magic(magic: &[u8; 4]) -> Option<(u8, &'static str)> {
    let digit = |b: u8| b.is_ascii_digit().then(|| b - b'0');
    match magic {
        b"M.K." | b"M!K!" => Some((4, "ProTracker")),
        b"M&K!" | b"N.T." => Some((4, "NoiseTracker")),
        b"FLT4" => Some((4, "StarTrekker")),
        b"FLT8" => Some((8, "StarTrekker")),
        b"OCTA" => Some((8, "Octalyser")),
        b"CD81" => Some((8, "Octalyser")),
        [b'T', b'D', b'Z', n] => match digit(*n) {
            Some(c @ 1..=3) => Some((c, "TakeTracker")),
            _ => None,
        },
        [n, b'C', b'H', b'N'] => match digit(*n) {
            Some(c @ 1..=9) => Some((c, "FastTracker")),
            _ => None,
        },
        [a, b, b'C', kind @ (b'H' | b'N')] => {
            let count = digit(*a)? * 10 + digit(*b)?;
            if !(10..=32).contains(&count) {
                return None;
            }
            let tracker = if *kind == b'H' { "FastTracker" } else { "TakeTracker" };
            Some((count, tracker))
        }
        _ => None,
    }
}

fn detect_soundtracker(data: &[u8]) -> Option<ModLayout> {
    let layout = ModLayout {
        channels: 4,
        num_samples: 15,
        magic: [0; 4],
        tracker: "Soundtracker",
    };
    if data.len() < layout.pattern_offset() {
        return None;
    }
    let text_ok = |bytes: &[u8]| bytes.iter().all(|&b| b == 0 || (0x20..0x7F).contains(&b));
    if !text_ok(&data[0..20]) {
        return None;
    }
    for i in 0..layout.num_samples {
        let h = &data[20 + i * SAMPLE_HEADER_LEN..20 + (i + 1) * SAMPLE_HEADER_LEN];
        let words = u16::from_be_bytes([h[22], h[23]]);
        if !text_ok(&h[..22]) || h[24] > 0x0F || h[25] > 64 || words > 32768 {
            return None;
        }
    }
    let orders_at = layout.order_offset();
    let song_length = data[orders_at] as usize;
    if !(1..=128).contains(&song_length) {
        return None;
    }
    let orders = &data[orders_at + 2..orders_at + 2 + song_length];
    if orders.iter().any(|&o| o >= 64) {
        return None;
    }
    let patterns = orders.iter().copied().max().unwrap_or(0) as usize + 1;
    if layout.pattern_offset() + patterns * 1024 > data.len() {
        return None;
    }
    Some(layout)
}

/// Load a MOD file from bytes.
pub fn load_mod(data: &[u8]) -> Result<Module, FormatError> {
    if data.is_empty() {
        return Err(FormatError::Empty);
    }
    parse(data, &LoadOptions::default())
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<Module, FormatError> {
    let layout = detect(data).ok_or(FormatError::UnknownFormat)?;
    let channels = layout.channels;
    let mut r = ByteReader::new(data);

    let mut module = Module::new(ModuleFormat::Mod { magic: layout.magic }, channels);
    module.title = r.string(20)?;
    module.tracker = layout.tracker.into();

    // Amiga hard panning: LRRL
    for (i, ch) in module.channels.iter_mut().enumerate() {
        ch.initial_pan = if matches!(i % 4, 0 | 3) { -64 } else { 64 };
    }

    let mut samples = Vec::with_capacity(layout.num_samples);
    let mut declared_lengths = Vec::with_capacity(layout.num_samples);
    for _ in 0..layout.num_samples {
        let (sample, len) = parse_sample_header(&mut r, layout.is_soundtracker())?;
        samples.push(sample);
        declared_lengths.push(len);
    }

    let song_length = r.u8()? as usize;
    let restart = r.u8()? as usize;
    let raw_orders = r.array::<128>()?;
    if !(1..=128).contains(&song_length) {
        return Err(FormatError::Inconsistent("order list length out of range"));
    }
    r.seek(layout.pattern_offset())?;

    // Soundtracker files often carry junk after the song length.
    let scanned = if layout.is_soundtracker() {
        &raw_orders[..song_length]
    } else {
        &raw_orders[..]
    };
    let max_order = scanned.iter().copied().max().unwrap_or(0) as usize;
    let (num_patterns, order_div) = if layout.is_flt8() {
        (max_order / 2 + 1, 2)
    } else {
        (max_order + 1, 1)
    };

    module.order = raw_orders[..song_length]
        .iter()
        .map(|&o| (o / order_div) as u16)
        .collect();
    if restart < song_length {
        module.restart_position = restart as u16;
    }

    let pattern_bytes = ROWS as usize * channels as usize * 4;
    for _ in 0..num_patterns {
        let raw = r.bytes(pattern_bytes)?;
        let pattern = if options.skip_patterns {
            Pattern::new(ROWS, channels)
        } else if layout.is_flt8() {
            parse_flt8_pattern(raw)
        } else {
            parse_pattern(raw, channels)
        };
        module.patterns.push(pattern);
    }

    for (i, (sample, &len)) in samples.iter_mut().zip(&declared_lengths).enumerate() {
        if len > 0 {
            let raw = r.bytes_truncated(len);
            if raw.len() < len {
                module.warnings.push(format!(
                    "sample {} truncated ({} of {} bytes present)",
                    i + 1,
                    raw.len(),
                    len
                ));
            }
            if !options.skip_samples {
                sample.data = SampleData::Mono8(raw.iter().map(|&b| b as i8).collect());
            }
        }
        // Empty samples keep no loop either
        sample.sanitize_loop();
    }

    module.message = sample_name_message(&samples);
    module.samples = samples.into();
    Ok(module)
}

/// Parse a sample header (30 bytes). Returns the sample and its declared
/// length in bytes.
fn parse_sample_header(
    r: &mut ByteReader<'_>,
    soundtracker: bool,
) -> Result<(Sample, usize), FormatError> {
    let name = r.string(22)?;
    let length = r.u16_be()? as usize * 2;
    let finetune = (r.u8()? & 0x0F) as i8;
    let finetune = if finetune > 7 { finetune - 16 } else { finetune };
    let volume = r.u8()?.min(64);
    let loop_start = r.u16_be()? as u32;
    let loop_length = r.u16_be()? as u32 * 2;

    let mut sample = Sample::new(&name);
    sample.default_volume = volume;
    sample.c4_speed = finetuned_c4_speed(finetune);

    // Soundtracker stores the loop start in bytes, later trackers in words.
    let loop_start = if soundtracker { loop_start } else { loop_start * 2 };
    if loop_length > 2 {
        sample.loop_start = loop_start;
        sample.loop_end = loop_start + loop_length;
        sample.loop_type = LoopType::Forward;
    }

    Ok((sample, length))
}

/// C-4 rate for a ProTracker finetune (-8..=7, eighths of a semitone).
fn finetuned_c4_speed(finetune: i8) -> u32 {
    if finetune == 0 {
        return DEFAULT_C4_SPEED;
    }
    let factor = 2f64.powf(finetune as f64 / 96.0);
    (DEFAULT_C4_SPEED as f64 * factor).round() as u32
}

fn parse_pattern(data: &[u8], channels: u8) -> Pattern {
    let mut pattern = Pattern::new(ROWS, channels);
    for (cell, raw) in pattern.data.iter_mut().zip(data.chunks_exact(4)) {
        *cell = parse_cell(raw);
    }
    pattern
}

/// FLT8 stores each pattern as two 4-channel halves.
fn parse_flt8_pattern(data: &[u8]) -> Pattern {
    let mut pattern = Pattern::new(ROWS, 8);
    let (left, right) = data.split_at(data.len() / 2);
    for (half, bytes) in [(0u8, left), (4u8, right)] {
        for (i, raw) in bytes.chunks_exact(4).enumerate() {
            let row = (i / 4) as u16;
            let ch = half + (i % 4) as u8;
            *pattern.cell_mut(row, ch) = parse_cell(raw);
        }
    }
    pattern
}

/// Parse a single pattern cell (4 bytes).
fn parse_cell(data: &[u8]) -> Cell {
    // MOD cell format:
    // Byte 0: Upper 4 bits of sample number, upper 4 bits of period
    // Byte 1: Lower 8 bits of period
    // Byte 2: Lower 4 bits of sample number, effect command
    // Byte 3: Effect parameter
    let sample_hi = data[0] & 0xF0;
    let period = (((data[0] & 0x0F) as u16) << 8) | data[1] as u16;
    let sample_lo = (data[2] & 0xF0) >> 4;

    Cell {
        note: period_to_note(period),
        instrument: sample_hi | sample_lo,
        effect: data[2] & 0x0F,
        param: data[3],
        ..Cell::empty()
    }
}

/// Convert an Amiga period to the closest note (period 428 = C-4 = 60).
fn period_to_note(period: u16) -> Note {
    if period == 0 {
        return Note::None;
    }
    let best = PERIODS
        .iter()
        .enumerate()
        .min_by_key(|&(_, p)| (period as i32 - *p as i32).unsigned_abs())
        .map_or(0, |(i, _)| i);
    Note::On(FIRST_PERIOD_NOTE + best as u8)
}

/// MOD files have no comment field; trackers traditionally use sample names.
fn sample_name_message(samples: &[Sample]) -> String {
    let lines: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    let used = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    lines[..used].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_to_note() {
        assert_eq!(period_to_note(428), Note::On(60));
        assert_eq!(period_to_note(856), Note::On(48));
        assert_eq!(period_to_note(113), Note::On(83));
        assert_eq!(period_to_note(430), Note::On(60));
        assert_eq!(period_to_note(0), Note::None);
    }

    #[test]
    fn magic_channel_counts() {
        assert_eq!(channels_for_magic(b"M.K."), Some((4, "ProTracker")));
        assert_eq!(channels_for_magic(b"6CHN").map(|c| c.0), Some(6));
        assert_eq!(channels_for_magic(b"16CH").map(|c| c.0), Some(16));
        assert_eq!(channels_for_magic(b"32CN").map(|c| c.0), Some(32));
        assert_eq!(channels_for_magic(b"TDZ3").map(|c| c.0), Some(3));
        assert_eq!(channels_for_magic(b"CD81").map(|c| c.0), Some(8));
        assert_eq!(channels_for_magic(b"40CH"), None);
        assert_eq!(channels_for_magic(b"0CHN"), None);
        assert_eq!(channels_for_magic(b"XXXX"), None);
    }

    #[test]
    fn finetune_changes_c4_speed() {
        assert_eq!(finetuned_c4_speed(0), 8363);
        assert!(finetuned_c4_speed(7) > 8363);
        assert!(finetuned_c4_speed(-8) < 8363);
    }

    #[test]
    fn cell_decoding() {
        // sample 0x1F, period 428, effect C40
        let cell = parse_cell(&[0x11, 0xAC, 0xFC, 0x40]);
        assert_eq!(cell.instrument, 0x1F);
        assert_eq!(cell.note, Note::On(60));
        assert_eq!(cell.effect, 0xC);
        assert_eq!(cell.param, 0x40);
    }

    #[test]
    fn message_drops_trailing_empty_names() {
        let samples = [Sample::new("hello"), Sample::new(""), Sample::new("world"), Sample::new("")];
        assert_eq!(sample_name_message(&samples), "hello\n\nworld");
    }
}
