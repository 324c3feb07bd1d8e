//! Core song model for trackline.
//!
//! This crate defines the in-memory module representation. Format
//! parsers emit a [`Module`], and the playback engine consumes it.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
pub mod effects;
mod instrument;
mod module;
mod pattern;
mod position;
mod sample;

pub use analysis::{analyze, FlowCommands, ModuleFeatures};
pub use effects::{slide_delta, Effect, VolumeCommand};
pub use instrument::{Envelope, EnvelopePoint, Instrument, NOTE_MAP_SIZE};
pub use module::{
    ChannelSettings, FrequencyMode, Module, ModuleFormat, DEFAULT_PATTERN_ROWS, METADATA_KEYS,
};
pub use pattern::{Cell, Note, Pattern, NOTE_CUT, NOTE_FADE, NOTE_MAX, NOTE_MIDDLE_C, NOTE_OFF};
pub use position::PlaybackPosition;
pub use sample::{AutoVibrato, LoopType, Sample, SampleData, DEFAULT_C4_SPEED};
