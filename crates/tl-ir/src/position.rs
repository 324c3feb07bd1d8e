//! Playback position reported to callers.

/// Snapshot of the playback cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackPosition {
    /// Elapsed song time in seconds
    pub seconds: f64,
    /// Index into the order list
    pub order: u16,
    /// Pattern being played
    pub pattern: u16,
    /// Row within the pattern
    pub row: u16,
    /// Ticks per row
    pub speed: u8,
    /// Tempo in BPM
    pub tempo: u8,
}
