//! Pattern editing.
//!
//! Modules are shared with the render thread, so an edit never mutates in
//! place: it produces a new [`Module`] that shares sample data with the old
//! one and is swapped in while playback continues from the same cursor.

use tl_ir::{Cell, Module, Note, Pattern};

use crate::error::PlayerError;

/// A change to one pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PatternEdit {
    SetCell { channel: usize, row: usize, cell: Cell },
    SetNote { channel: usize, row: usize, note: Note },
    /// Instrument number, 0 = none
    SetInstrument { channel: usize, row: usize, instrument: u8 },
    ClearCell { channel: usize, row: usize },
    ClearRow { row: usize },
    /// Shift rows down from `row`; the last row is dropped
    InsertRow { row: usize },
    /// Remove `row`, shifting later rows up; an empty row is appended
    DeleteRow { row: usize },
}

/// Bounds-checked lookup of a pattern.
pub(crate) fn pattern(module: &Module, pattern: usize) -> Result<&Pattern, PlayerError> {
    module
        .patterns
        .get(pattern)
        .ok_or(PlayerError::out_of_range("pattern", pattern))
}

/// Bounds-checked lookup of a cell.
pub(crate) fn cell(
    module: &Module,
    pattern_index: usize,
    channel: usize,
    row: usize,
) -> Result<Cell, PlayerError> {
    let pat = pattern(module, pattern_index)?;
    let (channel, row) = check_position(pat, channel, row)?;
    Ok(*pat.cell(row, channel))
}

fn check_position(pattern: &Pattern, channel: usize, row: usize) -> Result<(u8, u16), PlayerError> {
    if channel >= pattern.channels as usize {
        return Err(PlayerError::out_of_range("channel", channel));
    }
    check_row(pattern, row).map(|row| (channel as u8, row))
}

fn check_row(pattern: &Pattern, row: usize) -> Result<u16, PlayerError> {
    if row >= pattern.rows as usize {
        return Err(PlayerError::out_of_range("row", row));
    }
    Ok(row as u16)
}

/// Apply `edit` to a copy of `module`.
pub fn apply_edit(module: &Module, pattern_index: usize, edit: PatternEdit) -> Result<Module, PlayerError> {
    let pat = pattern(module, pattern_index)?;
    let mut edited = pat.clone();
    match edit {
        PatternEdit::SetCell { channel, row, cell } => {
            let (ch, row) = check_position(pat, channel, row)?;
            *edited.cell_mut(row, ch) = cell;
        }
        PatternEdit::SetNote { channel, row, note } => {
            let (ch, row) = check_position(pat, channel, row)?;
            edited.cell_mut(row, ch).note = note;
        }
        PatternEdit::SetInstrument { channel, row, instrument } => {
            let (ch, row) = check_position(pat, channel, row)?;
            edited.cell_mut(row, ch).instrument = instrument;
        }
        PatternEdit::ClearCell { channel, row } => {
            let (ch, row) = check_position(pat, channel, row)?;
            *edited.cell_mut(row, ch) = Cell::empty();
        }
        PatternEdit::ClearRow { row } => edited.clear_row(check_row(pat, row)?),
        PatternEdit::InsertRow { row } => edited.insert_row(check_row(pat, row)?),
        PatternEdit::DeleteRow { row } => edited.delete_row(check_row(pat, row)?),
    }

    let mut module = module.clone();
    module.patterns[pattern_index] = edited;
    Ok(module)
}
