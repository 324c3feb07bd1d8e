use thiserror::Error;

pub use tl_engine::{ControlError, RenderFault};
pub use tl_formats::FormatError;

/// Error type for player operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The operation needs a loaded module (or the module key is stale)
    #[error("no module loaded")]
    NotLoaded,

    /// Pattern, channel, row, order or subsong index outside the module
    #[error("{kind} index {index} out of range")]
    OutOfRange { kind: &'static str, index: usize },

    #[error(transparent)]
    Control(#[from] ControlError),

    /// The render thread has not drained its command queue
    #[error("command queue is full")]
    QueueFull,

    /// Reported from the render thread; the affected audio was silenced
    #[error(transparent)]
    Render(#[from] RenderFault),
}

impl PlayerError {
    pub(crate) fn out_of_range(kind: &'static str, index: usize) -> Self {
        PlayerError::OutOfRange { kind, index }
    }
}
