//! Resampling and PCM16 codec utilities (§3 AudioChunk, §8 universal
//! invariants). Little-endian byte order throughout.

use serde::{Deserialize, Serialize};

/// An ordered sequence of PCM16 samples at a given rate/channel count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Duration in seconds: samples / (sample_rate * channels).
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        samples_to_bytes(&self.samples)
    }
}

/// Little-endian int16 samples -> bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Little-endian bytes -> int16 samples. Trailing odd byte is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Linear resampling between arbitrary sample rates. Empty input maps to
/// empty output; resampling to the same rate is the identity.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)] as f32;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f32;
        let interpolated = a + (b - a) * frac;
        out.push(interpolated.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
    }
    out
}

/// Duplicate each mono sample into both channels of a stereo buffer.
pub fn mono_to_stereo(mono: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(mono.len() * 2);
    for &s in mono {
        out.push(s);
        out.push(s);
    }
    out
}

/// Average each interleaved stereo pair into one mono sample, floor-rounded.
pub fn stereo_to_mono(stereo: &[i16]) -> Vec<i16> {
    stereo
        .chunks_exact(2)
        .map(|pair| {
            let sum = pair[0] as i32 + pair[1] as i32;
            (sum as f64 / 2.0).floor() as i16
        })
        .collect()
}

/// Root-mean-square level of a sample buffer, in the same units as the samples.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resample([]) = [].
    #[test]
    fn resample_empty_is_empty() {
        assert!(resample(&[], 48000, 24000).is_empty());
    }

    /// Resample(x, r, r) = x.
    #[test]
    fn resample_same_rate_is_identity() {
        let x = vec![1, 2, 3, 4];
        assert_eq!(resample(&x, 24000, 24000), x);
    }

    /// |Resample(x, 48000, 24000)| = |x|/2 within rounding.
    #[test]
    fn resample_halves_length() {
        let x: Vec<i16> = (0..1000).map(|i| (i % 100) as i16).collect();
        let out = resample(&x, 48000, 24000);
        let expected = x.len() / 2;
        assert!((out.len() as i64 - expected as i64).abs() <= 1);
    }

    /// SamplesToBytes . BytesToSamples = identity on aligned input; little-endian.
    #[test]
    fn byte_round_trip_is_identity() {
        let x: Vec<i16> = vec![-32768, -1, 0, 1, 32767];
        let bytes = samples_to_bytes(&x);
        assert_eq!(bytes_to_samples(&bytes), x);
        assert_eq!(&bytes[0..2], &[0x00, 0x80]);
    }

    /// MonoToStereo duplicates each sample into both channels.
    #[test]
    fn mono_to_stereo_duplicates_channels() {
        let mono = vec![1, 2, 3];
        let stereo = mono_to_stereo(&mono);
        assert_eq!(stereo, vec![1, 1, 2, 2, 3, 3]);
    }

    /// StereoToMono averages each interleaved pair, floor-rounded.
    #[test]
    fn stereo_to_mono_averages_pairs() {
        let stereo = vec![1, 2, -3, -4];
        assert_eq!(stereo_to_mono(&stereo), vec![1, -4]);
    }

    /// RMS of a constant-zero signal is zero; RMS of a constant nonzero signal equals its magnitude.
    #[test]
    fn rms_matches_known_signals() {
        assert_eq!(rms(&[0, 0, 0]), 0.0);
        assert!((rms(&[100, -100, 100, -100]) - 100.0).abs() < 1e-3);
    }
}
