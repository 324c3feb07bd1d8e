//! FastTracker 2 XM format parser (version 0x0104).

use tl_ir::{
    AutoVibrato, Cell, Envelope, FrequencyMode, Instrument, LoopType, Module, ModuleFormat, Note,
    Pattern, Sample, SampleData, VolumeCommand, DEFAULT_C4_SPEED, NOTE_MAP_SIZE,
};

use crate::reader::ByteReader;
use crate::{FormatError, LoadOptions};

const MAGIC: &[u8; 17] = b"Extended Module: ";
const SUPPORTED_VERSION: u16 = 0x0104;
const MAX_CHANNELS: u16 = 64;
const MAX_PATTERNS: u16 = 256;
const MAX_INSTRUMENTS: u16 = 128;
const MAX_ENVELOPE_POINTS: usize = 12;
const XM_NOTE_OFF: u8 = 97;
/// XM note 1 is C-0; ours puts C-0 at 12.
const NOTE_OFFSET: u8 = 11;

pub(crate) fn is_xm(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && &data[..MAGIC.len()] == MAGIC
}

/// Load an XM file from bytes.
pub fn load_xm(data: &[u8]) -> Result<Module, FormatError> {
    if data.is_empty() {
        return Err(FormatError::Empty);
    }
    parse(data, &LoadOptions::default())
}

pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<Module, FormatError> {
    if !is_xm(data) {
        return Err(FormatError::UnknownFormat);
    }
    let mut r = ByteReader::new(data);
    r.skip(MAGIC.len())?;
    let title = r.string(20)?;
    r.skip(1)?; // 0x1A
    let tracker = r.string(20)?;
    let version = r.u16_le()?;
    if version != SUPPORTED_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let header_start = r.position();
    let header_size = r.u32_le()? as usize;
    let song_length = r.u16_le()?;
    let restart = r.u16_le()?;
    let num_channels = r.u16_le()?;
    let num_patterns = r.u16_le()?;
    let num_instruments = r.u16_le()?;
    let flags = r.u16_le()?;
    let speed = r.u16_le()?;
    let bpm = r.u16_le()?;
    let orders = r.array::<256>()?;

    if num_channels == 0 || num_channels > MAX_CHANNELS {
        return Err(FormatError::Inconsistent("channel count out of range"));
    }
    if song_length as usize > orders.len() {
        return Err(FormatError::Inconsistent("order list longer than 256 entries"));
    }
    if num_patterns > MAX_PATTERNS {
        return Err(FormatError::Inconsistent("too many patterns"));
    }
    if num_instruments > MAX_INSTRUMENTS {
        return Err(FormatError::Inconsistent("too many instruments"));
    }
    let next = header_start
        .checked_add(header_size)
        .ok_or(FormatError::Inconsistent("header size overflows"))?;
    r.seek(next)?;

    let channels = num_channels as u8;
    let mut module = Module::new(ModuleFormat::Xm { version }, channels);
    module.title = title;
    module.tracker = tracker;
    module.frequency_mode = if flags & 1 != 0 {
        FrequencyMode::Linear
    } else {
        FrequencyMode::Amiga
    };
    module.initial_speed = speed.clamp(1, 31) as u8;
    module.initial_tempo = bpm.clamp(32, 255) as u8;
    module.order = orders[..song_length as usize].iter().map(|&o| o as u16).collect();
    if restart < song_length {
        module.restart_position = restart;
    }

    for _ in 0..num_patterns {
        let pattern = parse_pattern(&mut r, channels, options.skip_patterns)?;
        module.patterns.push(pattern);
    }

    let mut samples = Vec::new();
    for index in 0..num_instruments {
        let instrument = parse_instrument(&mut r, &mut samples, &mut module.warnings, index, options)?;
        module.instruments.push(instrument);
    }

    module.message = instrument_name_message(&module.instruments);
    module.samples = samples.into();
    Ok(module)
}

fn parse_pattern(
    r: &mut ByteReader<'_>,
    channels: u8,
    skip: bool,
) -> Result<Pattern, FormatError> {
    let start = r.position();
    let header_len = r.u32_le()? as usize;
    let _packing = r.u8()?;
    let rows = r.u16_le()?;
    let packed_size = r.u16_le()? as usize;
    if rows == 0 || rows > 256 {
        return Err(FormatError::Inconsistent("pattern row count out of range"));
    }
    r.seek(start.checked_add(header_len).ok_or(FormatError::Inconsistent("pattern header overflows"))?)?;
    let packed = r.bytes(packed_size)?;

    let mut pattern = Pattern::new(rows, channels);
    if !skip {
        unpack_cells(packed, &mut pattern.data)?;
    }
    Ok(pattern)
}

/// Decode packed pattern data. Missing trailing cells stay empty.
fn unpack_cells(packed: &[u8], cells: &mut [Cell]) -> Result<(), FormatError> {
    let mut r = ByteReader::new(packed);
    for cell in cells.iter_mut() {
        if r.remaining() == 0 {
            break;
        }
        let first = r.u8()?;
        let (mask, note) = if first & 0x80 != 0 {
            let note = if first & 0x01 != 0 { r.u8()? } else { 0 };
            (first, note)
        } else {
            (0x1E, first)
        };
        let instrument = if mask & 0x02 != 0 { r.u8()? } else { 0 };
        let volume = if mask & 0x04 != 0 { r.u8()? } else { 0 };
        let effect = if mask & 0x08 != 0 { r.u8()? } else { 0 };
        let param = if mask & 0x10 != 0 { r.u8()? } else { 0 };

        *cell = Cell {
            note: xm_note(note),
            instrument,
            volume: VolumeCommand::from_xm_byte(volume),
            effect,
            param,
        };
    }
    if r.remaining() > 0 {
        return Err(FormatError::Inconsistent("packed pattern data longer than pattern"));
    }
    Ok(())
}

fn xm_note(value: u8) -> Note {
    match value {
        1..=96 => Note::On(value + NOTE_OFFSET),
        XM_NOTE_OFF => Note::Off,
        _ => Note::None,
    }
}

struct SampleHeader {
    sample: Sample,
    byte_len: usize,
    sixteen_bit: bool,
}

fn parse_instrument(
    r: &mut ByteReader<'_>,
    samples: &mut Vec<Sample>,
    warnings: &mut Vec<String>,
    index: u16,
    options: &LoadOptions,
) -> Result<Instrument, FormatError> {
    let start = r.position();
    let header_size = r.u32_le()? as usize;
    let name = r.string(22)?;
    let _kind = r.u8()?;
    let num_samples = r.u16_le()? as usize;
    let mut instrument = Instrument::new(&name);

    let header_end = start
        .checked_add(header_size)
        .ok_or(FormatError::Inconsistent("instrument header overflows"))?;
    if num_samples == 0 {
        r.seek(header_end.max(r.position()))?;
        return Ok(instrument);
    }
    if header_size < 241 {
        return Err(FormatError::Inconsistent("instrument header too small"));
    }
    if num_samples > 16 {
        return Err(FormatError::Inconsistent("too many samples in instrument"));
    }

    let sample_header_size = r.u32_le()? as usize;
    let keymap = r.array::<96>()?;
    let vol_points = r.array::<48>()?;
    let pan_points = r.array::<48>()?;
    let num_vol = r.u8()? as usize;
    let num_pan = r.u8()? as usize;
    let vol_sustain = r.u8()?;
    let vol_loop_start = r.u8()?;
    let vol_loop_end = r.u8()?;
    let pan_sustain = r.u8()?;
    let pan_loop_start = r.u8()?;
    let pan_loop_end = r.u8()?;
    let vol_type = r.u8()?;
    let pan_type = r.u8()?;
    let vibrato = AutoVibrato {
        waveform: r.u8()?,
        sweep: r.u8()?,
        depth: r.u8()?,
        speed: r.u8()?,
    };
    instrument.fadeout = r.u16_le()?;
    r.seek(header_end)?;

    instrument.volume_envelope = build_envelope(
        &vol_points, num_vol, vol_type, vol_sustain, vol_loop_start, vol_loop_end, 0,
    );
    instrument.panning_envelope = build_envelope(
        &pan_points, num_pan, pan_type, pan_sustain, pan_loop_start, pan_loop_end, 32,
    );

    let base = samples.len() as u16;
    for (k, &entry) in keymap.iter().enumerate() {
        let note = k + 12;
        if note < NOTE_MAP_SIZE && (entry as usize) < num_samples {
            instrument.sample_map[note] = Some(base + entry as u16);
        }
    }

    let mut headers = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let header_start = r.position();
        let mut header = parse_sample_header(r)?;
        if vibrato.depth > 0 && vibrato.speed > 0 {
            header.sample.vibrato = Some(vibrato);
        }
        headers.push(header);
        let header_end = header_start
            .checked_add(sample_header_size.max(40))
            .ok_or(FormatError::Inconsistent("sample header overflows"))?;
        r.seek(header_end)?;
    }

    for (n, header) in headers.into_iter().enumerate() {
        let SampleHeader { mut sample, byte_len, sixteen_bit } = header;
        let raw = r.bytes_truncated(byte_len);
        if raw.len() < byte_len {
            warnings.push(format!(
                "instrument {} sample {} truncated ({} of {} bytes present)",
                index + 1,
                n + 1,
                raw.len(),
                byte_len
            ));
        }
        if !options.skip_samples {
            sample.data = if sixteen_bit {
                SampleData::Mono16(decode_delta16(raw))
            } else {
                SampleData::Mono8(decode_delta8(raw))
            };
        }
        sample.sanitize_loop();
        samples.push(sample);
    }

    Ok(instrument)
}

fn parse_sample_header(r: &mut ByteReader<'_>) -> Result<SampleHeader, FormatError> {
    let length = r.u32_le()? as usize;
    let loop_start = r.u32_le()?;
    let loop_length = r.u32_le()?;
    let volume = r.u8()?;
    let finetune = r.i8()?;
    let kind = r.u8()?;
    let panning = r.u8()?;
    let relative_note = r.i8()?;
    let _reserved = r.u8()?;
    let name = r.string(22)?;

    let sixteen_bit = kind & 0x10 != 0;
    let shift = if sixteen_bit { 1 } else { 0 };

    let mut sample = Sample::new(&name);
    sample.default_volume = volume.min(64);
    sample.default_pan = Some(((panning as i16 - 128) / 2) as i8);
    sample.c4_speed = transposed_c4_speed(relative_note, finetune);
    sample.loop_type = match kind & 0x03 {
        1 => LoopType::Forward,
        2 | 3 => LoopType::PingPong,
        _ => LoopType::None,
    };
    if sample.loop_type != LoopType::None {
        sample.loop_start = loop_start >> shift;
        sample.loop_end = loop_start.saturating_add(loop_length) >> shift;
    }

    Ok(SampleHeader {
        sample,
        byte_len: length,
        sixteen_bit,
    })
}

/// C-4 rate for a relative note and finetune (1/128 semitone).
fn transposed_c4_speed(relative_note: i8, finetune: i8) -> u32 {
    let semitones = relative_note as f64 + finetune as f64 / 128.0;
    (DEFAULT_C4_SPEED as f64 * 2f64.powf(semitones / 12.0)).round() as u32
}

fn build_envelope(
    raw: &[u8; 48],
    count: usize,
    kind: u8,
    sustain: u8,
    loop_start: u8,
    loop_end: u8,
    center: i8,
) -> Option<Envelope> {
    let count = count.min(MAX_ENVELOPE_POINTS);
    if count == 0 {
        return None;
    }
    let mut env = Envelope::new();
    env.enabled = kind & 0x01 != 0;
    for point in raw.chunks_exact(4).take(count) {
        let tick = u16::from_le_bytes([point[0], point[1]]);
        let value = u16::from_le_bytes([point[2], point[3]]).min(64) as i8 - center;
        // Ticks must not go backwards; clamp rather than reorder.
        let tick = env.points.last().map_or(tick, |p| tick.max(p.tick));
        env.add_point(tick, value);
    }
    let valid = |i: u8| ((i as usize) < count).then_some(i);
    if kind & 0x02 != 0 {
        env.sustain_start = valid(sustain);
        env.sustain_end = env.sustain_start;
    }
    if kind & 0x04 != 0 {
        if let (Some(s), Some(e)) = (valid(loop_start), valid(loop_end)) {
            if s <= e {
                env.loop_start = Some(s);
                env.loop_end = Some(e);
            }
        }
    }
    Some(env)
}

fn decode_delta8(raw: &[u8]) -> Vec<i8> {
    let mut acc = 0i8;
    raw.iter()
        .map(|&b| {
            acc = acc.wrapping_add(b as i8);
            acc
        })
        .collect()
}

fn decode_delta16(raw: &[u8]) -> Vec<i16> {
    let mut acc = 0i16;
    raw.chunks_exact(2)
        .map(|c| {
            acc = acc.wrapping_add(i16::from_le_bytes([c[0], c[1]]));
            acc
        })
        .collect()
}

fn instrument_name_message(instruments: &[Instrument]) -> String {
    let lines: Vec<&str> = instruments.iter().map(|i| i.name.as_str()).collect();
    let used = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    lines[..used].join("\n")
}
