use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{ParleyError, Result};

use super::buffer::Waveform;

/// Size of the canonical RIFF/WAVE header written for mono 16-bit PCM.
pub const WAV_HEADER_LEN: usize = 44;

/// A complete mono 16-bit PCM WAV file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavPayload {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

impl WavPayload {
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.bytes.len().saturating_sub(WAV_HEADER_LEN) / 2
    }
}

/// Quantize a float sample to signed 16-bit.
///
/// Negative values scale by 32768 and non-negative values by 32767, so both
/// -1.0 and 1.0 land exactly on the ends of the i16 range.
#[must_use]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Serialize a waveform as mono 16-bit PCM at the waveform's own rate.
pub fn encode(waveform: &Waveform) -> Result<WavPayload> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + waveform.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParleyError::Encode(format!("failed to create WAV writer: {e}")))?;
        for &sample in &waveform.samples {
            writer
                .write_sample(quantize(sample))
                .map_err(|e| ParleyError::Encode(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ParleyError::Encode(format!("failed to finalize WAV: {e}")))?;
    }

    Ok(WavPayload {
        bytes: cursor.into_inner(),
        sample_rate: waveform.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_samples(samples: &[f32], rate: u32) -> WavPayload {
        encode(&Waveform::new(samples.to_vec(), rate)).unwrap_or_else(|e| panic!("{e}"))
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn header_matches_canonical_layout() {
        let wav = encode_samples(&[0.0, 1.0], 16000);
        let b = &wav.bytes;

        assert_eq!(b.len(), 48);
        assert_eq!(&b[0..4], b"RIFF");
        assert_eq!(u32_at(b, 4), 40);
        assert_eq!(&b[8..12], b"WAVE");
        assert_eq!(&b[12..16], b"fmt ");
        assert_eq!(u32_at(b, 16), 16);
        assert_eq!(u16_at(b, 20), 1);
        assert_eq!(u16_at(b, 22), 1);
        assert_eq!(&b[24..28], &[0x80, 0x3E, 0x00, 0x00]);
        assert_eq!(u32_at(b, 28), 32000);
        assert_eq!(u16_at(b, 32), 2);
        assert_eq!(u16_at(b, 34), 16);
        assert_eq!(&b[36..40], b"data");
        assert_eq!(&b[40..44], &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(&b[44..48], &[0x00, 0x00, 0xFF, 0x7F]);
    }

    #[test]
    fn length_is_header_plus_two_bytes_per_sample() {
        for n in [0usize, 1, 3, 1600] {
            let wav = encode_samples(&vec![0.1; n], 16000);
            assert_eq!(wav.bytes.len(), WAV_HEADER_LEN + 2 * n);
            assert_eq!(u32_at(&wav.bytes, 4) as usize, 36 + 2 * n);
            assert_eq!(u32_at(&wav.bytes, 40) as usize, 2 * n);
            assert_eq!(wav.sample_count(), n);
        }
    }

    #[test]
    fn out_of_range_samples_clamp() {
        assert_eq!(
            encode_samples(&[1.5], 16000).bytes,
            encode_samples(&[1.0], 16000).bytes
        );
        assert_eq!(
            encode_samples(&[-1.5], 16000).bytes,
            encode_samples(&[-1.0], 16000).bytes
        );
    }

    #[test]
    fn quantization_is_asymmetric() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(-1.0), i16::MIN);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16384);
    }

    #[test]
    fn rate_field_follows_waveform() {
        let wav = encode_samples(&[0.0], 8000);
        assert_eq!(u32_at(&wav.bytes, 24), 8000);
        assert_eq!(u32_at(&wav.bytes, 28), 16000);
        assert_eq!(wav.sample_rate, 8000);
    }
}
