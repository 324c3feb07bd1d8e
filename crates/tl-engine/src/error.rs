use thiserror::Error;

/// Render was called with no module loaded. The output is zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no module loaded")]
pub struct NotLoaded;

/// Problems detected while rendering. Never propagated across the render
/// boundary; the driver reports them to the control side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderFault {
    /// Output values that were NaN or infinite and got replaced by silence
    #[error("{0} non-finite output values replaced with silence")]
    NonFinite(u32),
}
