//! Render parameters and string-keyed controls.
//!
//! Out-of-range numeric values are clamped into range; values that do not
//! parse and unknown keys are rejected with [`ControlError`] and leave the
//! settings untouched. Booleans read back as `"0"`/`"1"`.

use alloc::format;
use alloc::string::{String, ToString};

use thiserror::Error;

use crate::dsp::DspFlags;

/// Keys accepted by [`RenderSettings::set_control`].
pub const CONTROL_KEYS: &[&str] = &[
    "play.at_end",
    "play.repeats",
    "seek.sync_samples",
    "load.skip_samples",
    "load.skip_patterns",
    "load.skip_plugins",
    "render.stereoseparation_percent",
    "render.interpolationfilter_length",
    "render.volumeramping_strength",
    "dsp.megabass",
    "dsp.noisereduction",
    "dsp.4tap_eq",
];

/// Typed render parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderParam {
    /// Linear output gain, 0-4
    MasterGain,
    /// Stereo separation, 0-4 (1 = as authored)
    StereoSeparation,
    /// Resampler taps: 1, 2, 4 or 8
    InterpolationFilterLength,
    /// Ramp length in ms, -1 = default, 0 = off
    VolumeRampingStrength,
}

impl RenderParam {
    pub const ALL: [RenderParam; 4] = [
        RenderParam::MasterGain,
        RenderParam::StereoSeparation,
        RenderParam::InterpolationFilterLength,
        RenderParam::VolumeRampingStrength,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RenderParam::MasterGain => "master_gain",
            RenderParam::StereoSeparation => "stereo_separation",
            RenderParam::InterpolationFilterLength => "interpolation_filter_length",
            RenderParam::VolumeRampingStrength => "volume_ramping_strength",
        }
    }
}

/// What the engine does once the repeat count is exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AtEnd {
    /// Return fewer frames and stop
    #[default]
    Stop,
    /// Keep producing silent full buffers
    Continue,
    /// Let voices ring out over a short fade, then stop
    Fadeout,
}

impl AtEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtEnd::Stop => "stop",
            AtEnd::Continue => "continue",
            AtEnd::Fadeout => "fadeout",
        }
    }
}

/// Rejected control change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unknown control key '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for control '{key}'")]
    InvalidValue { key: String, value: String },
}

pub const MASTER_GAIN_RANGE: (i32, i32) = (0, 4);
pub const SEPARATION_PERCENT_RANGE: (i32, i32) = (0, 400);
pub const RAMPING_RANGE: (i32, i32) = (-1, 10);
/// Default ramp length when strength is -1.
pub const DEFAULT_RAMP_MS: i32 = 1;

/// Everything the renderer can be told from outside.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderSettings {
    pub master_gain: i32,
    pub stereo_separation_percent: i32,
    pub filter_length: i32,
    pub ramping_strength: i32,
    pub at_end: AtEnd,
    pub repeat_count: i32,
    pub sync_samples: bool,
    pub skip_samples: bool,
    pub skip_patterns: bool,
    pub skip_plugins: bool,
    pub dsp: DspFlags,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            master_gain: 1,
            stereo_separation_percent: 100,
            filter_length: 8,
            ramping_strength: -1,
            at_end: AtEnd::Stop,
            repeat_count: -1,
            sync_samples: true,
            skip_samples: false,
            skip_patterns: false,
            skip_plugins: false,
            dsp: DspFlags::default(),
        }
    }
}

/// Round down to 1, 2, 4 or 8.
pub fn snap_filter_length(taps: i32) -> i32 {
    match taps {
        i32::MIN..=1 => 1,
        2..=3 => 2,
        4..=7 => 4,
        _ => 8,
    }
}

impl RenderSettings {
    /// Bring every field into its legal range.
    pub fn sanitize(&mut self) {
        self.master_gain = self.master_gain.clamp(MASTER_GAIN_RANGE.0, MASTER_GAIN_RANGE.1);
        self.stereo_separation_percent = self
            .stereo_separation_percent
            .clamp(SEPARATION_PERCENT_RANGE.0, SEPARATION_PERCENT_RANGE.1);
        self.filter_length = snap_filter_length(self.filter_length);
        self.ramping_strength = self.ramping_strength.clamp(RAMPING_RANGE.0, RAMPING_RANGE.1);
        self.repeat_count = self.repeat_count.max(-1);
    }

    pub fn param(&self, param: RenderParam) -> i32 {
        match param {
            RenderParam::MasterGain => self.master_gain,
            RenderParam::StereoSeparation => self.stereo_separation_percent / 100,
            RenderParam::InterpolationFilterLength => self.filter_length,
            RenderParam::VolumeRampingStrength => self.ramping_strength,
        }
    }

    /// Set a parameter, clamping into range. Returns the stored value.
    pub fn set_param(&mut self, param: RenderParam, value: i32) -> i32 {
        match param {
            RenderParam::MasterGain => {
                self.master_gain = value.clamp(MASTER_GAIN_RANGE.0, MASTER_GAIN_RANGE.1);
            }
            RenderParam::StereoSeparation => {
                self.stereo_separation_percent = value.clamp(0, 4) * 100;
            }
            RenderParam::InterpolationFilterLength => {
                self.filter_length = snap_filter_length(value);
            }
            RenderParam::VolumeRampingStrength => {
                self.ramping_strength = value.clamp(RAMPING_RANGE.0, RAMPING_RANGE.1);
            }
        }
        self.param(param)
    }

    /// Current value of a control, `None` for unknown keys.
    pub fn control(&self, key: &str) -> Option<String> {
        let value = match key {
            "play.at_end" => self.at_end.as_str().to_string(),
            "play.repeats" => self.repeat_count.to_string(),
            "seek.sync_samples" => bool_str(self.sync_samples),
            "load.skip_samples" => bool_str(self.skip_samples),
            "load.skip_patterns" => bool_str(self.skip_patterns),
            "load.skip_plugins" => bool_str(self.skip_plugins),
            "render.stereoseparation_percent" => self.stereo_separation_percent.to_string(),
            "render.interpolationfilter_length" => self.filter_length.to_string(),
            "render.volumeramping_strength" => self.ramping_strength.to_string(),
            "dsp.megabass" => bool_str(self.dsp.megabass),
            "dsp.noisereduction" => bool_str(self.dsp.noise_reduction),
            "dsp.4tap_eq" => bool_str(self.dsp.eq_4tap),
            _ => return None,
        };
        Some(value)
    }

    /// Apply a control change. Nothing changes on error.
    pub fn set_control(&mut self, key: &str, value: &str) -> Result<(), ControlError> {
        let invalid = || ControlError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "play.at_end" => {
                self.at_end = match value.trim() {
                    "stop" => AtEnd::Stop,
                    "continue" => AtEnd::Continue,
                    "fadeout" => AtEnd::Fadeout,
                    _ => return Err(invalid()),
                };
            }
            "play.repeats" => {
                self.repeat_count = parse_int(value).ok_or_else(invalid)?.max(-1);
            }
            "render.stereoseparation_percent" => {
                self.stereo_separation_percent = parse_int(value)
                    .ok_or_else(invalid)?
                    .clamp(SEPARATION_PERCENT_RANGE.0, SEPARATION_PERCENT_RANGE.1);
            }
            "render.interpolationfilter_length" => {
                self.filter_length = snap_filter_length(parse_int(value).ok_or_else(invalid)?);
            }
            "render.volumeramping_strength" => {
                self.ramping_strength = parse_int(value)
                    .ok_or_else(invalid)?
                    .clamp(RAMPING_RANGE.0, RAMPING_RANGE.1);
            }
            _ => {
                let flag = match key {
                    "seek.sync_samples" => &mut self.sync_samples,
                    "load.skip_samples" => &mut self.skip_samples,
                    "load.skip_patterns" => &mut self.skip_patterns,
                    "load.skip_plugins" => &mut self.skip_plugins,
                    "dsp.megabass" => &mut self.dsp.megabass,
                    "dsp.noisereduction" => &mut self.dsp.noise_reduction,
                    "dsp.4tap_eq" => &mut self.dsp.eq_4tap,
                    _ => return Err(ControlError::UnknownKey(key.to_string())),
                };
                *flag = parse_bool(value).ok_or_else(invalid)?;
            }
        }
        Ok(())
    }

    /// Ramp length in frames at `sample_rate`.
    pub fn ramp_frames(&self, sample_rate: u32) -> u32 {
        let ms = match self.ramping_strength {
            s if s < 0 => DEFAULT_RAMP_MS,
            s => s,
        };
        (sample_rate as u64 * ms as u64 / 1000) as u32
    }
}

fn bool_str(value: bool) -> String {
    format!("{}", value as u8)
}

/// Only the spelling `control` reads back is accepted.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Integers, or finite decimals truncated toward zero.
fn parse_int(value: &str) -> Option<i32> {
    let value = value.trim();
    if let Ok(v) = value.parse::<i32>() {
        return Some(v);
    }
    let v = value.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(v.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}
