//! Audio output backends for trackline.
//!
//! A backend owns the device stream and calls an [`AudioCallback`] from the
//! device thread. The callback must not block or allocate.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalOutput;
pub use traits::{AudioCallback, AudioError, AudioOutput};
