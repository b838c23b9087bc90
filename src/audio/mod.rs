pub mod buffer;
pub mod capture;
pub mod resample;
pub mod wav;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{ParleyError, Result};

use self::buffer::{Waveform, WaveformBuffer};
use self::capture::{CaptureSource, OpenCapture};

/// Recordings shorter than this rarely contain usable speech.
pub const MIN_RECORD_SECS: u32 = 2;

/// How often queued chunks are moved into the buffer while recording.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// The record duration actually used for a requested duration.
#[must_use]
pub fn effective_record_secs(requested: u32) -> u32 {
    requested.max(MIN_RECORD_SECS)
}

/// Records one fixed-length waveform at a time from a capture source.
pub struct CapturePipeline<S> {
    source: S,
    recording: AtomicBool,
}

impl<S: CaptureSource> CapturePipeline<S> {
    pub const fn new(source: S) -> Self {
        Self {
            source,
            recording: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.source.is_available()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Record for `duration_secs` (at least [`MIN_RECORD_SECS`]) and return the
    /// waveform at the device's native rate.
    ///
    /// Returns `Ok(None)` without touching the device when another capture is
    /// already in flight. The device is released on every exit path, including
    /// when this future is dropped before the duration elapses.
    pub async fn capture(&self, duration_secs: u32) -> Result<Option<Waveform>> {
        let Some(_flag) = RecordingFlag::acquire(&self.recording) else {
            tracing::debug!("capture already in progress, ignoring request");
            return Ok(None);
        };

        if !self.source.is_available() {
            return Err(ParleyError::DeviceUnavailable(
                "no microphone found or access is not permitted".to_string(),
            ));
        }

        let secs = effective_record_secs(duration_secs);
        let open = self.source.open()?;
        tracing::info!("recording {secs}s at {} Hz", open.sample_rate);

        let waveform = record_for(open, Duration::from_secs(u64::from(secs))).await;
        tracing::info!(
            "captured {} samples ({:.1}s)",
            waveform.len(),
            waveform.duration_secs()
        );
        Ok(Some(waveform))
    }
}

async fn record_for(open: OpenCapture, duration: Duration) -> Waveform {
    let OpenCapture {
        sample_rate,
        receiver,
        guard,
    } = open;
    let mut buffer = WaveformBuffer::new(sample_rate);

    let deadline = Instant::now() + duration;
    let mut drain = tokio::time::interval(DRAIN_INTERVAL);
    drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            _ = drain.tick() => {
                for chunk in receiver.try_iter() {
                    buffer.append(chunk);
                }
            }
        }
    }

    guard.release();

    // The device may hand over one last partial chunk while shutting down.
    for chunk in receiver.try_iter() {
        buffer.append(chunk);
    }

    tracing::debug!(
        "capture finished with {} chunks, {} samples",
        buffer.chunk_count(),
        buffer.total_samples()
    );
    buffer.drain()
}

/// Set while a capture is in flight; cleared on drop.
struct RecordingFlag<'a>(&'a AtomicBool);

impl<'a> RecordingFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RecordingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crossbeam_channel::unbounded;

    use super::buffer::AudioChunk;
    use super::capture::DeviceGuard;
    use super::*;

    #[derive(Default)]
    struct FakeMic {
        unavailable: bool,
        deny: bool,
        chunks: Vec<Vec<f32>>,
        final_chunk: Option<Vec<f32>>,
        opened: Rc<Cell<usize>>,
        released: Rc<Cell<usize>>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl CaptureSource for FakeMic {
        fn is_available(&self) -> bool {
            !self.unavailable
        }

        fn open(&self) -> Result<OpenCapture> {
            if self.deny {
                return Err(ParleyError::DeviceAcquisitionDenied("denied".to_string()));
            }
            self.opened.set(self.opened.get() + 1);
            self.log.borrow_mut().push("open");

            let (tx, rx) = unbounded();
            for chunk in &self.chunks {
                tx.send(AudioChunk::new(chunk.clone(), 48000))
                    .unwrap_or_else(|e| panic!("{e}"));
            }

            let final_chunk = self.final_chunk.clone();
            let released = Rc::clone(&self.released);
            let log = Rc::clone(&self.log);
            let guard = DeviceGuard::new(move || {
                if let Some(samples) = final_chunk {
                    let _ = tx.send(AudioChunk::new(samples, 48000));
                }
                released.set(released.get() + 1);
                log.borrow_mut().push("release");
            });

            Ok(OpenCapture {
                sample_rate: 48000,
                receiver: rx,
                guard,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn capture_merges_chunks_in_order_and_releases() {
        let mic = FakeMic {
            chunks: vec![vec![0.1, 0.2], vec![0.3]],
            final_chunk: Some(vec![0.4]),
            ..FakeMic::default()
        };
        let released = Rc::clone(&mic.released);
        let pipeline = CapturePipeline::new(mic);

        let waveform = pipeline
            .capture(3)
            .await
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|| panic!("expected a waveform"));

        assert_eq!(waveform.samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(waveform.sample_rate, 48000);
        assert_eq!(released.get(), 1);
        assert!(!pipeline.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_waits_at_least_the_floor() {
        let pipeline = CapturePipeline::new(FakeMic::default());
        let start = Instant::now();
        let waveform = pipeline.capture(0).await.unwrap_or_else(|e| panic!("{e}"));
        assert!(waveform.is_some_and(|w| w.is_empty()));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn capture_waits_requested_duration() {
        let pipeline = CapturePipeline::new(FakeMic::default());
        let start = Instant::now();
        let _ = pipeline.capture(5).await.unwrap_or_else(|e| panic!("{e}"));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn second_capture_is_rejected_while_first_runs() {
        let mic = FakeMic::default();
        let opened = Rc::clone(&mic.opened);
        let pipeline = CapturePipeline::new(mic);

        let (first, second) = tokio::join!(pipeline.capture(2), pipeline.capture(2));

        assert!(first.unwrap_or_else(|e| panic!("{e}")).is_some());
        assert!(second.unwrap_or_else(|e| panic!("{e}")).is_none());
        assert_eq!(opened.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn next_capture_allowed_after_release() {
        let mic = FakeMic::default();
        let log = Rc::clone(&mic.log);
        let pipeline = CapturePipeline::new(mic);

        let _ = pipeline.capture(2).await.unwrap_or_else(|e| panic!("{e}"));
        let _ = pipeline.capture(2).await.unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(*log.borrow(), vec!["open", "release", "open", "release"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_device_fails_before_open() {
        let mic = FakeMic {
            unavailable: true,
            ..FakeMic::default()
        };
        let opened = Rc::clone(&mic.opened);
        let pipeline = CapturePipeline::new(mic);

        let result = pipeline.capture(2).await;
        assert!(matches!(result, Err(ParleyError::DeviceUnavailable(_))));
        assert_eq!(opened.get(), 0);
        assert!(!pipeline.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_device_clears_recording_flag() {
        let mic = FakeMic {
            deny: true,
            ..FakeMic::default()
        };
        let pipeline = CapturePipeline::new(mic);

        let result = pipeline.capture(2).await;
        assert!(matches!(result, Err(ParleyError::DeviceAcquisitionDenied(_))));
        assert!(!pipeline.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_capture_still_releases_device() {
        let mic = FakeMic {
            chunks: vec![vec![0.5; 16]],
            ..FakeMic::default()
        };
        let released = Rc::clone(&mic.released);
        let pipeline = CapturePipeline::new(mic);

        let outcome = tokio::time::timeout(Duration::from_secs(1), pipeline.capture(5)).await;
        assert!(outcome.is_err());
        assert_eq!(released.get(), 1);
        assert!(!pipeline.is_recording());
    }

    #[test]
    fn record_floor() {
        assert_eq!(effective_record_secs(0), 2);
        assert_eq!(effective_record_secs(1), 2);
        assert_eq!(effective_record_secs(2), 2);
        assert_eq!(effective_record_secs(7), 7);
    }
}
