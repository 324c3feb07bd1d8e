//! Format parsers for trackline.
//!
//! Parses ProTracker MOD (and its many channel-count variants) and
//! FastTracker 2 XM files into a [`tl_ir::Module`]. Parsing is pure:
//! the same bytes always yield the same module.

mod mod_format;
mod reader;
mod wav_format;
mod xm_format;

use thiserror::Error;
use tl_ir::Module;

pub use mod_format::load_mod;
pub use wav_format::{interleaved_to_wav, write_wav};
pub use xm_format::load_xm;

/// Error type for format parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Zero-length input
    #[error("input is empty")]
    Empty,

    /// No supported signature found
    #[error("unrecognized module format")]
    UnknownFormat,

    /// A read ran past the end of the buffer
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    /// An offset, length or count contradicts the rest of the file
    #[error("inconsistent module data: {0}")]
    Inconsistent(&'static str),

    /// Recognized format, unsupported revision
    #[error("unsupported format version {0:#06x}")]
    UnsupportedVersion(u16),
}

/// Parts of a module that may be skipped while loading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Leave every sample empty (headers are still read)
    pub skip_samples: bool,
    /// Leave every pattern empty, keeping its declared row count
    pub skip_patterns: bool,
}

/// Detect the format of `data` and parse it.
pub fn load_module(data: &[u8]) -> Result<Module, FormatError> {
    load_module_with(data, &LoadOptions::default())
}

/// Detect the format of `data` and parse it, honouring `options`.
pub fn load_module_with(data: &[u8], options: &LoadOptions) -> Result<Module, FormatError> {
    if data.is_empty() {
        return Err(FormatError::Empty);
    }
    let module = if xm_format::is_xm(data) {
        xm_format::parse(data, options)?
    } else if mod_format::detect(data).is_some() {
        mod_format::parse(data, options)?
    } else {
        return Err(FormatError::UnknownFormat);
    };

    log::info!(
        "loaded {} module \"{}\": {} channels, {} orders, {} patterns, {} samples",
        module.format.short_name(),
        module.title,
        module.num_channels(),
        module.num_orders(),
        module.num_patterns(),
        module.num_samples(),
    );
    for warning in &module.warnings {
        log::warn!("{}", warning);
    }
    Ok(module)
}
