use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, FromSample, PlayStreamError,
    SampleFormat, SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::AudioConfig;
use crate::error::{ParleyError, Result};

use super::buffer::AudioChunk;
use super::resample::mix_to_mono;

/// Chunks queued between the device callback and the pipeline.
const CHUNK_QUEUE_DEPTH: usize = 1024;

/// A producer of microphone audio.
pub trait CaptureSource {
    /// Whether a capture device exists at all. Checked before any recording
    /// so the caller can report a precise message.
    fn is_available(&self) -> bool;

    /// Acquire the device and start streaming chunks.
    fn open(&self) -> Result<OpenCapture>;
}

/// Holds an acquired device. Dropping the guard releases the device.
pub struct DeviceGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl DeviceGuard {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// A device that is currently streaming.
pub struct OpenCapture {
    pub sample_rate: u32,
    pub receiver: Receiver<AudioChunk>,
    pub guard: DeviceGuard,
}

/// Microphone capture via cpal.
pub struct Microphone {
    device_name: Option<String>,
}

impl Microphone {
    #[must_use]
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.device.clone(),
        }
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(ref name) = self.device_name {
            host.input_devices()
                .map_err(|e| {
                    ParleyError::DeviceUnavailable(format!(
                        "failed to enumerate input devices: {e}"
                    ))
                })?
                .find(|d| device_name(d).as_deref() == Some(name.as_str()))
                .ok_or_else(|| ParleyError::DeviceUnavailable(format!("input device not found: {name}")))
        } else {
            host.default_input_device().ok_or_else(|| {
                ParleyError::DeviceUnavailable("no default input device available".to_string())
            })
        }
    }
}

impl CaptureSource for Microphone {
    fn is_available(&self) -> bool {
        self.find_device().is_ok()
    }

    fn open(&self) -> Result<OpenCapture> {
        let device = self.find_device()?;

        let supported = device.default_input_config().map_err(config_error)?;
        let sample_format = check_format(supported.sample_format())?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();

        let stream_config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded::<AudioChunk>(CHUNK_QUEUE_DEPTH);

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tx),
            _ => build_stream::<f32>(&device, &stream_config, tx),
        }?;

        stream.play().map_err(play_error)?;

        tracing::info!(
            "microphone open: {} Hz, {} channel(s), {:?}",
            sample_rate,
            channels,
            sample_format
        );

        let guard = DeviceGuard::new(move || {
            if let Err(e) = stream.pause() {
                tracing::warn!("failed to pause audio stream: {e}");
            }
            drop(stream);
            tracing::debug!("microphone released");
        });

        Ok(OpenCapture {
            sample_rate,
            receiver: rx,
            guard,
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tx: Sender<AudioChunk>,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate;

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("audio stream error: {err}");
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                // The device thread must never block on the queue.
                let chunk = AudioChunk::new(mix_to_mono(&samples, channels), sample_rate);
                if tx.try_send(chunk).is_err() {
                    tracing::warn!("capture queue full, chunk dropped");
                }
            },
            err_fn,
            None,
        )
        .map_err(build_error)
}

fn check_format(format: SampleFormat) -> Result<SampleFormat> {
    match format {
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 => Ok(format),
        other => Err(ParleyError::Audio(format!(
            "unsupported input sample format {other:?} (need f32, i16 or u16)"
        ))),
    }
}

fn config_error(e: DefaultStreamConfigError) -> ParleyError {
    match e {
        DefaultStreamConfigError::DeviceNotAvailable => {
            ParleyError::DeviceUnavailable("input device disappeared".to_string())
        }
        DefaultStreamConfigError::BackendSpecific { err } => {
            ParleyError::DeviceAcquisitionDenied(format!("failed to query input device: {err}"))
        }
        other => ParleyError::Audio(format!("no usable input config: {other}")),
    }
}

fn build_error(e: BuildStreamError) -> ParleyError {
    match e {
        BuildStreamError::DeviceNotAvailable => {
            ParleyError::DeviceUnavailable("input device disappeared".to_string())
        }
        BuildStreamError::BackendSpecific { err } => {
            ParleyError::DeviceAcquisitionDenied(format!("failed to open input stream: {err}"))
        }
        other => ParleyError::Audio(format!("failed to build input stream: {other}")),
    }
}

fn play_error(e: PlayStreamError) -> ParleyError {
    match e {
        PlayStreamError::DeviceNotAvailable => {
            ParleyError::DeviceUnavailable("input device disappeared".to_string())
        }
        other => ParleyError::DeviceAcquisitionDenied(format!("failed to start audio stream: {other}")),
    }
}

fn device_name(device: &Device) -> Option<String> {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
}

/// Names of every input device the default host reports.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| ParleyError::Audio(format!("failed to enumerate input devices: {e}")))?;
    Ok(devices.filter_map(|d| device_name(&d)).collect())
}

#[must_use]
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| device_name(&d))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn guard_releases_once_on_drop() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        {
            let _guard = DeviceGuard::new(move || c.set(c.get() + 1));
        }
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn format_problems_are_audio_errors() {
        assert!(check_format(SampleFormat::I16).is_ok());
        assert!(matches!(
            check_format(SampleFormat::F64),
            Err(ParleyError::Audio(_))
        ));
        assert!(matches!(
            build_error(BuildStreamError::StreamConfigNotSupported),
            ParleyError::Audio(_)
        ));
        assert!(matches!(
            config_error(DefaultStreamConfigError::StreamTypeNotSupported),
            ParleyError::Audio(_)
        ));
    }

    #[test]
    fn backend_refusal_is_acquisition_denied() {
        let err = cpal::BackendSpecificError {
            description: "permission denied".to_string(),
        };
        assert!(matches!(
            build_error(BuildStreamError::BackendSpecific { err }),
            ParleyError::DeviceAcquisitionDenied(_)
        ));
        assert!(matches!(
            build_error(BuildStreamError::DeviceNotAvailable),
            ParleyError::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn explicit_release_does_not_run_twice() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let guard = DeviceGuard::new(move || c.set(c.get() + 1));
        guard.release();
        assert_eq!(count.get(), 1);
    }
}
