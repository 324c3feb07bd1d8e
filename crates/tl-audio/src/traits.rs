//! Audio output trait and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no audio device available")]
    NoDevice,
    /// `start` was called before a callback was attached
    #[error("no stream has been built")]
    NoStream,
}

/// Fills device buffers from the audio thread.
pub trait AudioCallback: Send + 'static {
    /// Fill `out`, interleaved with `channels` samples per frame.
    fn process(&mut self, out: &mut [f32], channels: usize);
}

/// Trait for audio output backends.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Start (or resume) the device stream.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Pause the device stream.
    fn stop(&mut self) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(f32);

    impl AudioCallback for Ramp {
        fn process(&mut self, out: &mut [f32], channels: usize) {
            for frame in out.chunks_mut(channels) {
                frame.fill(self.0);
                self.0 += 1.0;
            }
        }
    }

    #[test]
    fn callback_is_object_safe() {
        let mut cb: Box<dyn AudioCallback> = Box::new(Ramp(0.0));
        let mut buf = [0.0f32; 6];
        cb.process(&mut buf, 2);
        assert_eq!(buf, [0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn errors_display() {
        assert_eq!(AudioError::NoDevice.to_string(), "no audio device available");
        assert_eq!(
            AudioError::Playback("underrun".into()).to_string(),
            "playback error: underrun"
        );
    }
}
