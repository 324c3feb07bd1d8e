//! Effect command types for tracker patterns.
//!
//! Cells store the raw command/parameter bytes so that edits round-trip
//! exactly. [`Effect::decode`] turns them into a typed command using the
//! ProTracker numbering (0x0-0xF) extended with the FastTracker 2 letters
//! (G = 0x10 ... X = 0x21).

/// Effect command numbers.
pub mod cmd {
    pub const ARPEGGIO: u8 = 0x00;
    pub const PORTA_UP: u8 = 0x01;
    pub const PORTA_DOWN: u8 = 0x02;
    pub const TONE_PORTA: u8 = 0x03;
    pub const VIBRATO: u8 = 0x04;
    pub const TONE_PORTA_VOL_SLIDE: u8 = 0x05;
    pub const VIBRATO_VOL_SLIDE: u8 = 0x06;
    pub const TREMOLO: u8 = 0x07;
    pub const SET_PAN: u8 = 0x08;
    pub const SAMPLE_OFFSET: u8 = 0x09;
    pub const VOLUME_SLIDE: u8 = 0x0A;
    pub const POSITION_JUMP: u8 = 0x0B;
    pub const SET_VOLUME: u8 = 0x0C;
    pub const PATTERN_BREAK: u8 = 0x0D;
    pub const EXTENDED: u8 = 0x0E;
    pub const SPEED_TEMPO: u8 = 0x0F;
    pub const GLOBAL_VOLUME: u8 = 0x10;
    pub const GLOBAL_VOLUME_SLIDE: u8 = 0x11;
    pub const KEY_OFF: u8 = 0x14;
    pub const ENVELOPE_POSITION: u8 = 0x15;
    pub const PANNING_SLIDE: u8 = 0x19;
    pub const MULTI_RETRIGGER: u8 = 0x1B;
    pub const TREMOR: u8 = 0x1D;
    pub const EXTRA_FINE_PORTA: u8 = 0x21;
}

/// Volume column command (XM style).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VolumeCommand {
    #[default]
    None,
    /// Set volume (0-64)
    Volume(u8),
    VolumeSlideDown(u8),
    VolumeSlideUp(u8),
    FineVolSlideDown(u8),
    FineVolSlideUp(u8),
    /// Set vibrato speed (0-15)
    VibratoSpeed(u8),
    /// Vibrato with the given depth (0-15)
    Vibrato(u8),
    /// Set panning (0-15, 0 = left, 15 = right)
    Panning(u8),
    PanSlideLeft(u8),
    PanSlideRight(u8),
    TonePorta(u8),
}

impl VolumeCommand {
    /// Decode an XM volume column byte.
    pub const fn from_xm_byte(value: u8) -> Self {
        let x = value & 0x0F;
        match value {
            0x10..=0x50 => VolumeCommand::Volume(value - 0x10),
            0x60..=0x6F => VolumeCommand::VolumeSlideDown(x),
            0x70..=0x7F => VolumeCommand::VolumeSlideUp(x),
            0x80..=0x8F => VolumeCommand::FineVolSlideDown(x),
            0x90..=0x9F => VolumeCommand::FineVolSlideUp(x),
            0xA0..=0xAF => VolumeCommand::VibratoSpeed(x),
            0xB0..=0xBF => VolumeCommand::Vibrato(x),
            0xC0..=0xCF => VolumeCommand::Panning(x),
            0xD0..=0xDF => VolumeCommand::PanSlideLeft(x),
            0xE0..=0xEF => VolumeCommand::PanSlideRight(x),
            0xF0..=0xFF => VolumeCommand::TonePorta(x),
            _ => VolumeCommand::None,
        }
    }

    /// Encode as an XM volume column byte.
    pub const fn to_xm_byte(self) -> u8 {
        match self {
            VolumeCommand::None => 0,
            VolumeCommand::Volume(v) => 0x10 + if v > 64 { 64 } else { v },
            VolumeCommand::VolumeSlideDown(x) => 0x60 | (x & 0x0F),
            VolumeCommand::VolumeSlideUp(x) => 0x70 | (x & 0x0F),
            VolumeCommand::FineVolSlideDown(x) => 0x80 | (x & 0x0F),
            VolumeCommand::FineVolSlideUp(x) => 0x90 | (x & 0x0F),
            VolumeCommand::VibratoSpeed(x) => 0xA0 | (x & 0x0F),
            VolumeCommand::Vibrato(x) => 0xB0 | (x & 0x0F),
            VolumeCommand::Panning(x) => 0xC0 | (x & 0x0F),
            VolumeCommand::PanSlideLeft(x) => 0xD0 | (x & 0x0F),
            VolumeCommand::PanSlideRight(x) => 0xE0 | (x & 0x0F),
            VolumeCommand::TonePorta(x) => 0xF0 | (x & 0x0F),
        }
    }

    /// Returns the variant name as a static string (ignoring parameters).
    pub fn name(&self) -> &'static str {
        match self {
            VolumeCommand::None => "None",
            VolumeCommand::Volume(_) => "Volume",
            VolumeCommand::VolumeSlideDown(_) => "VolumeSlideDown",
            VolumeCommand::VolumeSlideUp(_) => "VolumeSlideUp",
            VolumeCommand::FineVolSlideDown(_) => "FineVolSlideDown",
            VolumeCommand::FineVolSlideUp(_) => "FineVolSlideUp",
            VolumeCommand::VibratoSpeed(_) => "VibratoSpeed",
            VolumeCommand::Vibrato(_) => "Vibrato",
            VolumeCommand::Panning(_) => "Panning",
            VolumeCommand::PanSlideLeft(_) => "PanSlideLeft",
            VolumeCommand::PanSlideRight(_) => "PanSlideRight",
            VolumeCommand::TonePorta(_) => "TonePorta",
        }
    }
}

/// Typed effect command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    None,

    // === Arpeggio & Portamento ===
    /// Arpeggio: cycle between note, note+x, note+y each tick
    Arpeggio { x: u8, y: u8 },
    /// Slide pitch up by amount per tick
    PortaUp(u8),
    /// Slide pitch down by amount per tick
    PortaDown(u8),
    /// Slide toward target note
    TonePorta(u8),
    /// Vibrato with speed and depth
    Vibrato { speed: u8, depth: u8 },
    /// Tone portamento + volume slide
    TonePortaVolSlide(u8),
    /// Vibrato + volume slide
    VibratoVolSlide(u8),

    // === Tremolo & Volume ===
    /// Tremolo (volume oscillation)
    Tremolo { speed: u8, depth: u8 },
    /// Set channel panning (0-255)
    SetPan(u8),
    /// Set sample offset (in 256-frame units)
    SampleOffset(u8),
    /// Volume slide, raw `xy` parameter (x up, y down)
    VolumeSlide(u8),
    /// Jump to order position
    PositionJump(u8),
    /// Set channel volume (0-64)
    SetVolume(u8),
    /// Break to row in next pattern (already decoded from BCD)
    PatternBreak(u8),

    // === Extended effects (Exy) ===
    /// Fine porta up (once per row)
    FinePortaUp(u8),
    /// Fine porta down (once per row)
    FinePortaDown(u8),
    /// Set vibrato waveform (0=sine, 1=ramp, 2=square; +4 = no retrigger)
    SetVibratoWaveform(u8),
    /// Set finetune (-8 to +7)
    SetFinetune(i8),
    /// Pattern loop (0=set start, n=loop n times)
    PatternLoop(u8),
    /// Set tremolo waveform
    SetTremoloWaveform(u8),
    /// Coarse panning (0-15)
    SetPanPosition(u8),
    /// Retrigger note every n ticks
    RetriggerNote(u8),
    /// Fine volume slide up (once per row)
    FineVolumeSlideUp(u8),
    /// Fine volume slide down (once per row)
    FineVolumeSlideDown(u8),
    /// Cut note after n ticks
    NoteCut(u8),
    /// Delay note by n ticks
    NoteDelay(u8),
    /// Delay pattern by n rows
    PatternDelay(u8),

    // === Speed & Tempo ===
    /// Set ticks per row (speed)
    SetSpeed(u8),
    /// Set BPM tempo
    SetTempo(u8),

    // === FastTracker 2 ===
    /// Set global volume (0-64)
    SetGlobalVolume(u8),
    /// Global volume slide, raw `xy` parameter
    GlobalVolumeSlide(u8),
    /// Key off after n ticks
    KeyOff(u8),
    /// Set envelope position (ticks)
    SetEnvelopePosition(u8),
    /// Panning slide, raw `xy` parameter (x right, y left)
    PanningSlide(u8),
    /// Retrigger with volume change
    Retrigger { interval: u8, volume_change: u8 },
    /// Tremor (on/off volume)
    Tremor { on: u8, off: u8 },
    /// Extra fine porta up
    ExtraFinePortaUp(u8),
    /// Extra fine porta down
    ExtraFinePortaDown(u8),
}

impl Effect {
    /// Decode a command/parameter byte pair. Unknown commands decode to `None`.
    pub fn decode(command: u8, param: u8) -> Effect {
        let hi = param >> 4;
        let lo = param & 0x0F;
        match command {
            cmd::ARPEGGIO if param != 0 => Effect::Arpeggio { x: hi, y: lo },
            cmd::ARPEGGIO => Effect::None,
            cmd::PORTA_UP => Effect::PortaUp(param),
            cmd::PORTA_DOWN => Effect::PortaDown(param),
            cmd::TONE_PORTA => Effect::TonePorta(param),
            cmd::VIBRATO => Effect::Vibrato { speed: hi, depth: lo },
            cmd::TONE_PORTA_VOL_SLIDE => Effect::TonePortaVolSlide(param),
            cmd::VIBRATO_VOL_SLIDE => Effect::VibratoVolSlide(param),
            cmd::TREMOLO => Effect::Tremolo { speed: hi, depth: lo },
            cmd::SET_PAN => Effect::SetPan(param),
            cmd::SAMPLE_OFFSET => Effect::SampleOffset(param),
            cmd::VOLUME_SLIDE => Effect::VolumeSlide(param),
            cmd::POSITION_JUMP => Effect::PositionJump(param),
            cmd::SET_VOLUME => Effect::SetVolume(param.min(64)),
            cmd::PATTERN_BREAK => Effect::PatternBreak(hi * 10 + lo),
            cmd::EXTENDED => decode_extended(hi, lo),
            cmd::SPEED_TEMPO => {
                if param < 32 {
                    Effect::SetSpeed(param)
                } else {
                    Effect::SetTempo(param)
                }
            }
            cmd::GLOBAL_VOLUME => Effect::SetGlobalVolume(param.min(64)),
            cmd::GLOBAL_VOLUME_SLIDE => Effect::GlobalVolumeSlide(param),
            cmd::KEY_OFF => Effect::KeyOff(param),
            cmd::ENVELOPE_POSITION => Effect::SetEnvelopePosition(param),
            cmd::PANNING_SLIDE => Effect::PanningSlide(param),
            cmd::MULTI_RETRIGGER => Effect::Retrigger { interval: lo, volume_change: hi },
            cmd::TREMOR => Effect::Tremor { on: hi, off: lo },
            cmd::EXTRA_FINE_PORTA => match hi {
                1 => Effect::ExtraFinePortaUp(lo),
                2 => Effect::ExtraFinePortaDown(lo),
                _ => Effect::None,
            },
            _ => Effect::None,
        }
    }

    /// Returns the variant name as a static string (ignoring parameters).
    pub fn name(&self) -> &'static str {
        match self {
            Effect::None => "None",
            Effect::Arpeggio { .. } => "Arpeggio",
            Effect::PortaUp(_) => "PortaUp",
            Effect::PortaDown(_) => "PortaDown",
            Effect::TonePorta(_) => "TonePorta",
            Effect::Vibrato { .. } => "Vibrato",
            Effect::TonePortaVolSlide(_) => "TonePortaVolSlide",
            Effect::VibratoVolSlide(_) => "VibratoVolSlide",
            Effect::Tremolo { .. } => "Tremolo",
            Effect::SetPan(_) => "SetPan",
            Effect::SampleOffset(_) => "SampleOffset",
            Effect::VolumeSlide(_) => "VolumeSlide",
            Effect::PositionJump(_) => "PositionJump",
            Effect::SetVolume(_) => "SetVolume",
            Effect::PatternBreak(_) => "PatternBreak",
            Effect::FinePortaUp(_) => "FinePortaUp",
            Effect::FinePortaDown(_) => "FinePortaDown",
            Effect::SetVibratoWaveform(_) => "SetVibratoWaveform",
            Effect::SetFinetune(_) => "SetFinetune",
            Effect::PatternLoop(_) => "PatternLoop",
            Effect::SetTremoloWaveform(_) => "SetTremoloWaveform",
            Effect::SetPanPosition(_) => "SetPanPosition",
            Effect::RetriggerNote(_) => "RetriggerNote",
            Effect::FineVolumeSlideUp(_) => "FineVolumeSlideUp",
            Effect::FineVolumeSlideDown(_) => "FineVolumeSlideDown",
            Effect::NoteCut(_) => "NoteCut",
            Effect::NoteDelay(_) => "NoteDelay",
            Effect::PatternDelay(_) => "PatternDelay",
            Effect::SetSpeed(_) => "SetSpeed",
            Effect::SetTempo(_) => "SetTempo",
            Effect::SetGlobalVolume(_) => "SetGlobalVolume",
            Effect::GlobalVolumeSlide(_) => "GlobalVolumeSlide",
            Effect::KeyOff(_) => "KeyOff",
            Effect::SetEnvelopePosition(_) => "SetEnvelopePosition",
            Effect::PanningSlide(_) => "PanningSlide",
            Effect::Retrigger { .. } => "Retrigger",
            Effect::Tremor { .. } => "Tremor",
            Effect::ExtraFinePortaUp(_) => "ExtraFinePortaUp",
            Effect::ExtraFinePortaDown(_) => "ExtraFinePortaDown",
        }
    }
}

/// Decode an extended effect (Exy).
fn decode_extended(x: u8, y: u8) -> Effect {
    match x {
        0x1 => Effect::FinePortaUp(y),
        0x2 => Effect::FinePortaDown(y),
        0x4 => Effect::SetVibratoWaveform(y),
        0x5 => Effect::SetFinetune(if y > 7 { y as i8 - 16 } else { y as i8 }),
        0x6 => Effect::PatternLoop(y),
        0x7 => Effect::SetTremoloWaveform(y),
        0x8 => Effect::SetPanPosition(y),
        0x9 => Effect::RetriggerNote(y),
        0xA => Effect::FineVolumeSlideUp(y),
        0xB => Effect::FineVolumeSlideDown(y),
        0xC => Effect::NoteCut(y),
        0xD => Effect::NoteDelay(y),
        0xE => Effect::PatternDelay(y),
        _ => Effect::None,
    }
}

/// Split a slide parameter into a signed delta. Up (high nibble) wins.
pub fn slide_delta(param: u8) -> i8 {
    let up = (param >> 4) & 0x0F;
    let down = param & 0x0F;
    if up > 0 {
        up as i8
    } else {
        -(down as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_protracker_commands() {
        assert_eq!(Effect::decode(0x0, 0x37), Effect::Arpeggio { x: 3, y: 7 });
        assert_eq!(Effect::decode(0x0, 0x00), Effect::None);
        assert_eq!(Effect::decode(0x4, 0x8F), Effect::Vibrato { speed: 8, depth: 15 });
        assert_eq!(Effect::decode(0xC, 0x80), Effect::SetVolume(64));
        assert_eq!(Effect::decode(0xD, 0x32), Effect::PatternBreak(32));
        assert_eq!(Effect::decode(0xF, 0x06), Effect::SetSpeed(6));
        assert_eq!(Effect::decode(0xF, 0x7D), Effect::SetTempo(125));
    }

    #[test]
    fn decodes_extended_commands() {
        assert_eq!(Effect::decode(0xE, 0x63), Effect::PatternLoop(3));
        assert_eq!(Effect::decode(0xE, 0x5F), Effect::SetFinetune(-1));
        assert_eq!(Effect::decode(0xE, 0xD2), Effect::NoteDelay(2));
        assert_eq!(Effect::decode(0xE, 0x30), Effect::None);
    }

    #[test]
    fn decodes_fasttracker_commands() {
        assert_eq!(Effect::decode(cmd::GLOBAL_VOLUME, 0x90), Effect::SetGlobalVolume(64));
        assert_eq!(Effect::decode(cmd::KEY_OFF, 3), Effect::KeyOff(3));
        assert_eq!(
            Effect::decode(cmd::MULTI_RETRIGGER, 0x83),
            Effect::Retrigger { interval: 3, volume_change: 8 }
        );
        assert_eq!(Effect::decode(cmd::EXTRA_FINE_PORTA, 0x12), Effect::ExtraFinePortaUp(2));
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(Effect::decode(0x12, 0xFF), Effect::None);
        assert_eq!(Effect::decode(0xFF, 0x01), Effect::None);
    }

    #[test]
    fn volume_column_roundtrips_xm_bytes() {
        for byte in 0x10..=0xFFu8 {
            let cmd = VolumeCommand::from_xm_byte(byte);
            if byte <= 0x50 || byte >= 0x60 {
                assert_eq!(cmd.to_xm_byte(), byte, "byte {:#04x}", byte);
            } else {
                assert_eq!(cmd, VolumeCommand::None);
            }
        }
    }

    #[test]
    fn slide_delta_prefers_up() {
        assert_eq!(slide_delta(0x40), 4);
        assert_eq!(slide_delta(0x04), -4);
        assert_eq!(slide_delta(0x24), 2);
    }
}
