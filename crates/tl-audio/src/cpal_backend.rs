//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use crate::traits::{AudioCallback, AudioError, AudioOutput};

/// Output on the host's default device.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device with its default config.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        let config: StreamConfig = config.into();

        log::info!(
            "audio device: {} ({} Hz, {} ch)",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    /// Build the stream around `callback` and start it.
    pub fn start_with<C: AudioCallback>(&mut self, mut callback: C) -> Result<(), AudioError> {
        let channels = self.channels();
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback.process(data, channels);
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::NoStream)?;
        stream.play().map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = &self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
