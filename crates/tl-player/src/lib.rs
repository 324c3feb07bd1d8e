//! Playback control for trackline.
//!
//! Two front ends share the same engine:
//!
//! - [`ModulePlayer`] owns an engine directly. Use it for offline rendering
//!   or when the host already calls `render` from its own thread.
//! - [`Player`] and [`RenderDriver`] split the work for real-time output.
//!   The driver lives on the audio thread; the player plans loads, seeks and
//!   edits elsewhere and hands them over through lock-free queues.

mod config;
mod edit;
mod error;
mod module_player;
mod player;
mod realtime;
mod snapshot;

pub use config::PlayerConfig;
pub use edit::{apply_edit, PatternEdit};
pub use error::{ControlError, FormatError, PlayerError, RenderFault};
pub use module_player::{ModuleInfo, ModulePlayer};
pub use player::{ModuleKey, Player, PlayerObserver};
pub use realtime::RenderDriver;

// Re-export common types so callers don't need tl-ir/tl-engine directly.
pub use tl_engine::{AtEnd, RenderParam, RenderSettings, CONTROL_KEYS};
pub use tl_ir::{Cell, Module, Note, PlaybackPosition, VolumeCommand, METADATA_KEYS};
