//! Module (song) structure.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::instrument::Instrument;
use crate::pattern::Pattern;
use crate::sample::Sample;

/// Rows assumed for an order entry that references a missing pattern.
pub const DEFAULT_PATTERN_ROWS: u16 = 64;

/// Metadata keys understood by [`Module::metadata`].
pub const METADATA_KEYS: &[&str] = &[
    "type",
    "type_long",
    "originaltype",
    "originaltype_long",
    "container",
    "container_long",
    "tracker",
    "artist",
    "title",
    "date",
    "message",
    "message_raw",
    "warnings",
];

/// Source format of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleFormat {
    /// ProTracker family. `magic` is the signature at offset 1080
    /// (all zero for 15-sample Soundtracker files).
    Mod { magic: [u8; 4] },
    /// FastTracker 2 extended module.
    Xm { version: u16 },
}

impl ModuleFormat {
    /// Short type name, as used for file extensions.
    pub fn short_name(&self) -> &'static str {
        match self {
            ModuleFormat::Mod { .. } => "mod",
            ModuleFormat::Xm { .. } => "xm",
        }
    }

    /// Descriptive type name.
    pub fn long_name(&self) -> &'static str {
        match self {
            ModuleFormat::Mod { magic: [0, 0, 0, 0] } => "Soundtracker",
            ModuleFormat::Mod { .. } => "ProTracker",
            ModuleFormat::Xm { .. } => "FastTracker II",
        }
    }

    pub fn is_xm(&self) -> bool {
        matches!(self, ModuleFormat::Xm { .. })
    }
}

/// Pitch model used by slides and vibrato.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrequencyMode {
    /// Amiga periods (slides are non-linear in pitch)
    #[default]
    Amiga,
    /// Linear periods (64 units per semitone)
    Linear,
}

/// Per-channel initial settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Initial panning (-64 to +64, 0 = center)
    pub initial_pan: i8,
    /// Initial channel volume (0-64)
    pub initial_volume: u8,
    /// Channel is muted
    pub muted: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            initial_pan: 0,
            initial_volume: 64,
            muted: false,
        }
    }
}

/// A parsed tracker module. Immutable once handed to the engine.
#[derive(Clone, Debug)]
pub struct Module {
    pub title: String,
    pub artist: String,
    /// Song message or comment (for MOD, built from the sample names)
    pub message: String,
    /// Name of the tracker that saved the file, when known
    pub tracker: String,
    pub format: ModuleFormat,
    /// Non-fatal problems found while loading
    pub warnings: Vec<String>,
    /// Order list: pattern index per position
    pub order: Vec<u16>,
    /// Order to continue from when the song loops
    pub restart_position: u16,
    pub patterns: Vec<Pattern>,
    pub instruments: Vec<Instrument>,
    /// Shared so pattern edits never copy PCM data
    pub samples: Arc<[Sample]>,
    pub channels: Vec<ChannelSettings>,
    /// Initial speed (ticks per row, 1-31)
    pub initial_speed: u8,
    /// Initial tempo in BPM (32-255)
    pub initial_tempo: u8,
    /// Initial global volume (0-64)
    pub global_volume: u8,
    pub frequency_mode: FrequencyMode,
    /// Rows per beat (default 4)
    pub rows_per_beat: u8,
    /// Rows per measure (default 16)
    pub rows_per_measure: u8,
}

impl Module {
    /// Create an empty module with `num_channels` default channels.
    pub fn new(format: ModuleFormat, num_channels: u8) -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            message: String::new(),
            tracker: String::new(),
            format,
            warnings: Vec::new(),
            order: Vec::new(),
            restart_position: 0,
            patterns: Vec::new(),
            instruments: Vec::new(),
            samples: Arc::from(Vec::new()),
            channels: alloc::vec![ChannelSettings::default(); num_channels as usize],
            initial_speed: 6,
            initial_tempo: 125,
            global_volume: 64,
            frequency_mode: FrequencyMode::Amiga,
            rows_per_beat: 4,
            rows_per_measure: 16,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_orders(&self) -> usize {
        self.order.len()
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn num_instruments(&self) -> usize {
        self.instruments.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Pattern index at an order position.
    pub fn order_pattern(&self, order: usize) -> Option<u16> {
        self.order.get(order).copied()
    }

    /// Pattern played at an order position, if it exists.
    pub fn pattern_at(&self, order: usize) -> Option<&Pattern> {
        self.order_pattern(order)
            .and_then(|p| self.patterns.get(p as usize))
    }

    /// Number of rows played at an order position.
    pub fn rows_at(&self, order: usize) -> u16 {
        self.pattern_at(order)
            .map_or(DEFAULT_PATTERN_ROWS, |p| p.rows)
    }

    /// Metadata string for `key`. Unknown keys and missing values yield `""`.
    pub fn metadata(&self, key: &str) -> String {
        match key {
            "type" => self.format.short_name().into(),
            "type_long" => self.format.long_name().into(),
            "tracker" => self.tracker.clone(),
            "title" => self.title.clone(),
            "artist" => self.artist.clone(),
            "message" | "message_raw" => self.message.clone(),
            "warnings" => self.warnings.join("\n"),
            // Not containerised and never converted from another format.
            _ => String::new(),
        }
    }
}
