// Audio output binding - Runs the scheduler clock (and optionally the worklet)
// inside the cpal output callback. Mixing happens elsewhere, so the stream
// itself only writes silence.

use crate::audio::timing::TransportClock;
use crate::error::{SchedulerError, SchedulerResult};
use crate::sequencer::worklet::WorkletScheduler;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

/// Default output device, opened but not yet streaming
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    sample_rate: f64,
}

impl AudioOutput {
    /// Open the default output device with its default config
    pub fn open() -> SchedulerResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SchedulerError::Audio("No audio device found".to_string()))?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| SchedulerError::Audio(format!("Config error: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0 as f64;
        log::info!(
            "Audio device: {} ({:?}, {} Hz)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_format,
            sample_rate
        );

        Ok(Self {
            device,
            config: supported_config.into(),
            sample_format,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Stream that runs the worklet once per block, then advances the clock
    pub fn run_worklet(
        &self,
        mut worklet: WorkletScheduler,
        clock: TransportClock,
    ) -> SchedulerResult<Stream> {
        self.start_stream(move |frames| {
            worklet.process_block(frames);
            clock.advance(frames);
        })
    }

    /// Stream that only drives the transport clock (lookahead model)
    pub fn run_clock(&self, clock: TransportClock) -> SchedulerResult<Stream> {
        self.start_stream(move |frames| clock.advance(frames))
    }

    fn start_stream<F>(&self, render: F) -> SchedulerResult<Stream>
    where
        F: FnMut(usize) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let stream = match self.sample_format {
            SampleFormat::F32 => build_stream::<f32, F>(&self.device, &self.config, channels, render),
            SampleFormat::I16 => build_stream::<i16, F>(&self.device, &self.config, channels, render),
            SampleFormat::U16 => build_stream::<u16, F>(&self.device, &self.config, channels, render),
            other => {
                return Err(SchedulerError::Audio(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| SchedulerError::Audio(format!("Failed to start stream: {}", e)))?;
        Ok(stream)
    }
}

fn build_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    mut render: F,
) -> SchedulerResult<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
    F: FnMut(usize) + Send + 'static,
{
    let channels = channels.max(1);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // No allocations, no I/O, no blocking locks past this point
                render(data.len() / channels);
                for sample in data.iter_mut() {
                    *sample = Sample::from_sample::<f32>(0.0);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| SchedulerError::Audio(format!("Error in stream creation: {}", e)))
}
