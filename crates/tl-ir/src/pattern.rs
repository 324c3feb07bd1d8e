//! Pattern and cell types for tracker sequences.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::effects::VolumeCommand;

/// Byte value for "note off" in the cell wire encoding.
pub const NOTE_OFF: u8 = 254;
/// Byte value for "note cut" in the cell wire encoding.
pub const NOTE_CUT: u8 = 255;
/// Byte value for "note fade" in the cell wire encoding.
pub const NOTE_FADE: u8 = 253;
/// Highest playable note number (B-9).
pub const NOTE_MAX: u8 = 119;
/// Middle C (C-4). A sample's c4 speed is its playback rate at this note.
pub const NOTE_MIDDLE_C: u8 = 60;

/// A note value in a pattern cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on, MIDI-style numbering (1-119, where 60 = C-4)
    On(u8),
    /// Note off / key release
    Off,
    /// Note cut (volume to zero immediately)
    Cut,
    /// Note fade (start instrument fadeout without releasing envelopes)
    Fade,
}

impl Note {
    /// Create a note from octave (0-9) and semitone (0-11).
    ///
    /// Octave numbering follows the display convention where 60 = C-4.
    pub const fn from_octave_semitone(octave: u8, semitone: u8) -> Self {
        Note::On((octave + 1) * 12 + semitone)
    }

    /// Decode the wire byte (0 = none, 1-119 notes, 253 fade, 254 off, 255 cut).
    ///
    /// Out-of-range note bytes decode to `Note::None`.
    pub const fn from_byte(value: u8) -> Self {
        match value {
            0 => Note::None,
            1..=NOTE_MAX => Note::On(value),
            NOTE_FADE => Note::Fade,
            NOTE_OFF => Note::Off,
            NOTE_CUT => Note::Cut,
            _ => Note::None,
        }
    }

    /// Encode to the wire byte.
    pub const fn to_byte(self) -> u8 {
        match self {
            Note::None => 0,
            Note::On(n) => n,
            Note::Off => NOTE_OFF,
            Note::Cut => NOTE_CUT,
            Note::Fade => NOTE_FADE,
        }
    }

    /// Returns true for a playable note (not none/off/cut/fade).
    pub const fn is_musical(self) -> bool {
        matches!(self, Note::On(_))
    }

    /// Get the octave if this is a note on (60 = octave 4).
    pub const fn octave(self) -> Option<u8> {
        match self {
            Note::On(n) if n >= 12 => Some(n / 12 - 1),
            _ => None,
        }
    }

    /// Get the semitone (0-11) if this is a note on.
    pub const fn semitone(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n % 12),
            _ => None,
        }
    }

    /// Three-character display name: `C-4`, `C#4`, `===` (off), `^^^` (cut), `~~~` (fade).
    pub fn name(self) -> ArrayString<4> {
        const NAMES: [&str; 12] = [
            "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
        ];
        let mut s = ArrayString::new();
        match self {
            Note::None => s.push_str("---"),
            Note::Off => s.push_str("==="),
            Note::Cut => s.push_str("^^^"),
            Note::Fade => s.push_str("~~~"),
            Note::On(n) => {
                s.push_str(NAMES[(n % 12) as usize]);
                match self.octave() {
                    Some(oct) => s.push(char::from(b'0' + oct)),
                    None => s.push('-'),
                }
            }
        }
        s
    }
}

/// A single cell in a pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Note value
    pub note: Note,
    /// Instrument number (0 = none, 1-255 = instrument index + 1)
    pub instrument: u8,
    /// Volume column command
    pub volume: VolumeCommand,
    /// Effect command byte (0x00-0x0F ProTracker, 0x10+ extended)
    pub effect: u8,
    /// Effect parameter byte
    pub param: u8,
}

impl Cell {
    /// Create an empty cell.
    pub const fn empty() -> Self {
        Self {
            note: Note::None,
            instrument: 0,
            volume: VolumeCommand::None,
            effect: 0,
            param: 0,
        }
    }

    /// Cell with a note, instrument and volume set.
    pub const fn with_note(note: Note, instrument: u8, volume: u8) -> Self {
        Self {
            note,
            instrument,
            volume: if volume == 0 {
                VolumeCommand::None
            } else {
                VolumeCommand::Volume(if volume > 64 { 64 } else { volume })
            },
            effect: 0,
            param: 0,
        }
    }

    /// Returns true if the cell is completely empty.
    pub fn is_empty(&self) -> bool {
        self.note == Note::None
            && self.instrument == 0
            && self.volume == VolumeCommand::None
            && self.effect == 0
            && self.param == 0
    }

    pub fn has_note(&self) -> bool {
        self.note != Note::None
    }

    pub fn has_effect(&self) -> bool {
        self.effect != 0 || self.param != 0
    }
}

/// A pattern containing rows of cells across channels.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub rows: u16,
    /// Number of channels
    pub channels: u8,
    /// Pattern name (empty for formats without names)
    pub name: ArrayString<32>,
    /// Rows per beat override (None = use module default)
    pub rows_per_beat: Option<u8>,
    /// Rows per measure override (None = use module default)
    pub rows_per_measure: Option<u8>,
    /// Pattern data, stored row-major: data[row * channels + channel]
    pub data: Vec<Cell>,
}

impl Pattern {
    /// Create a new pattern with empty cells.
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            name: ArrayString::new(),
            rows_per_beat: None,
            rows_per_measure: None,
            data: alloc::vec![Cell::empty(); rows as usize * channels as usize],
        }
    }

    /// Get a reference to a cell.
    pub fn cell(&self, row: u16, channel: u8) -> &Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Get a mutable reference to a cell.
    pub fn cell_mut(&mut self, row: u16, channel: u8) -> &mut Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &mut self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Checked cell access.
    pub fn get(&self, row: u16, channel: u8) -> Option<&Cell> {
        if row < self.rows && channel < self.channels {
            Some(self.cell(row, channel))
        } else {
            None
        }
    }

    /// All cells in a row.
    pub fn row(&self, row: u16) -> &[Cell] {
        let start = row as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }

    /// Insert an empty row at `row`, shifting later rows down.
    /// The last row falls off so the row count is unchanged.
    pub fn insert_row(&mut self, row: u16) {
        if row >= self.rows {
            return;
        }
        let width = self.channels as usize;
        let start = row as usize * width;
        self.data.truncate(self.data.len() - width);
        self.data
            .splice(start..start, core::iter::repeat(Cell::empty()).take(width));
    }

    /// Delete `row`, shifting later rows up. An empty row is appended.
    pub fn delete_row(&mut self, row: u16) {
        if row >= self.rows {
            return;
        }
        let width = self.channels as usize;
        let start = row as usize * width;
        self.data.drain(start..start + width);
        self.data
            .extend(core::iter::repeat(Cell::empty()).take(width));
    }

    /// Clear every cell in a row.
    pub fn clear_row(&mut self, row: u16) {
        if row >= self.rows {
            return;
        }
        let width = self.channels as usize;
        let start = row as usize * width;
        self.data[start..start + width].fill(Cell::empty());
    }
}
