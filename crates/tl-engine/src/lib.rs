//! Playback engine for the trackline module player.
//!
//! The [`Sequencer`] walks the order list tick by tick, each
//! [`ChannelState`] turns pattern cells into pitch and gain, and the
//! [`Engine`] resamples and mixes the channels into interleaved stereo
//! `f32` buffers. Seek planning lives in [`seek`] so it can run away from
//! the render thread.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod dsp;
mod error;
mod frame;
pub mod frequency;
mod interpolation;
mod mixer;
mod params;
pub mod seek;
mod sequencer;

pub use channel::ChannelState;
pub use dsp::{DspChain, DspFlags};
pub use error::{NotLoaded, RenderFault};
pub use frame::Frame;
pub use interpolation::{Interpolation, SincTable};
pub use mixer::{Engine, LoadedModule};
pub use params::{
    snap_filter_length, AtEnd, ControlError, RenderParam, RenderSettings, CONTROL_KEYS,
};
pub use seek::{SeekTarget, VoiceSync};
pub use sequencer::{find_subsongs, Sequencer, Subsong, TickEvent, MAX_CHANNELS};
