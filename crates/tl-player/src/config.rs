//! Player configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tl_engine::RenderSettings;

/// Settings fixed when a [`Player`](crate::Player) is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Frames rendered per engine call inside the audio callback
    pub block_frames: usize,
    /// Capacity of the command, return and report queues
    pub queue_capacity: usize,
    /// Minimum time between position notifications
    pub position_interval_ms: u64,
    /// Initial render parameters and controls
    pub render: RenderSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_frames: 512,
            queue_capacity: 64,
            position_interval_ms: 100,
            render: RenderSettings::default(),
        }
    }
}

impl PlayerConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_engine::AtEnd;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "sample_rate: 44100\nrender:\n  master_gain: 2\n  at_end: fadeout\n  dsp:\n    megabass: true\n";
        let config: PlayerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_frames, 512);
        assert_eq!(config.render.master_gain, 2);
        assert_eq!(config.render.at_end, AtEnd::Fadeout);
        assert!(config.render.dsp.megabass);
        assert!(!config.render.dsp.eq_4tap);
        assert_eq!(config.render.filter_length, 8);
        assert_eq!(config.position_interval(), Duration::from_millis(100));
    }
}
