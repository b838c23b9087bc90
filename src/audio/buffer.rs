/// One block of mono samples as delivered by the capture device.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioChunk {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A contiguous mono recording at a single sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Collects chunks in capture order and merges them once at the end.
///
/// Appending keeps the chunk as-is; the single contiguous allocation happens in
/// [`WaveformBuffer::drain`], sized from the running sample count.
pub struct WaveformBuffer {
    chunks: Vec<AudioChunk>,
    total_samples: usize,
    sample_rate: u32,
}

impl WaveformBuffer {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            chunks: Vec::new(),
            total_samples: 0,
            sample_rate,
        }
    }

    pub fn append(&mut self, chunk: AudioChunk) {
        if chunk.sample_rate != self.sample_rate {
            tracing::warn!(
                "chunk rate {} does not match buffer rate {}",
                chunk.sample_rate,
                self.sample_rate
            );
        }
        self.total_samples += chunk.len();
        self.chunks.push(chunk);
    }

    #[must_use]
    pub const fn total_samples(&self) -> usize {
        self.total_samples
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Merge every stored chunk into one waveform and reset the buffer.
    pub fn drain(&mut self) -> Waveform {
        let mut samples = Vec::with_capacity(self.total_samples);
        for chunk in self.chunks.drain(..) {
            samples.extend_from_slice(&chunk.samples);
        }

        tracing::debug!(
            "drained {} samples at {} Hz",
            samples.len(),
            self.sample_rate
        );

        self.total_samples = 0;
        Waveform::new(samples, self.sample_rate)
    }
}
