use serde::{Deserialize, Serialize};

use crate::audio::decode::DecodedAudio;
use crate::error::{Result, SpectrogramError};

/// Floor added to magnitudes before taking a logarithm.
pub const DB_EPSILON: f32 = 1e-12;

/// Convert a linear magnitude to decibels.
#[inline]
pub fn magnitude_to_db(mag: f32) -> f32 {
    20.0 * (mag + DB_EPSILON).log10()
}

/// Mono audio, ready for analysis. Immutable once built.
#[derive(Clone, Debug)]
pub struct AudioSamples {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl AudioSamples {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SpectrogramError::InvalidParameter(
                "sample rate must be positive".into(),
            ));
        }
        let duration_secs = samples.len() as f64 / sample_rate as f64;
        Ok(Self { samples, sample_rate, duration_secs })
    }

    /// Down-mix per-channel sample arrays to mono by averaging.
    ///
    /// Channels of unequal length are truncated to the shortest one.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        match channels.len() {
            0 => Err(SpectrogramError::InvalidParameter(
                "decoded audio has no channels".into(),
            )),
            1 => Self::mono(channels.pop().unwrap_or_default(), sample_rate),
            n => {
                let len = channels.iter().map(Vec::len).min().unwrap_or(0);
                let scale = 1.0 / n as f32;
                let mut mixed = vec![0.0f32; len];
                for ch in &channels {
                    for (m, &s) in mixed.iter_mut().zip(&ch[..len]) {
                        *m += s;
                    }
                }
                for m in &mut mixed {
                    *m *= scale;
                }
                Self::mono(mixed, sample_rate)
            }
        }
    }

    pub fn from_decoded(decoded: DecodedAudio) -> Result<Self> {
        Self::from_channels(decoded.channels, decoded.sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }
}

/// Dense `num_frames × bins` grid of raw (gain-free) STFT magnitudes, row-major by frame.
#[derive(Clone, Debug)]
pub struct MagnitudeMatrix {
    data: Vec<f32>,
    pub num_frames: usize,
    pub bins: usize,
    pub fft_size: usize,
    pub hop: usize,
    pub sample_rate: u32,
}

impl MagnitudeMatrix {
    /// Allocate a zeroed matrix for the given analysis geometry.
    pub fn zeroed(num_frames: usize, fft_size: usize, hop: usize, sample_rate: u32) -> Self {
        let bins = fft_size / 2;
        Self {
            data: vec![0.0; num_frames * bins],
            num_frames,
            bins,
            fft_size,
            hop,
            sample_rate,
        }
    }

    /// Re-shape a previous matrix for new geometry, keeping its allocation.
    pub fn reuse(mut self, num_frames: usize, fft_size: usize, hop: usize, sample_rate: u32) -> Self {
        let bins = fft_size / 2;
        self.data.clear();
        self.data.resize(num_frames * bins, 0.0);
        Self { data: self.data, num_frames, bins, fft_size, hop, sample_rate }
    }

    #[inline]
    pub fn frame(&self, frame: usize) -> &[f32] {
        &self.data[frame * self.bins..(frame + 1) * self.bins]
    }

    #[inline]
    pub fn frame_mut(&mut self, frame: usize) -> &mut [f32] {
        &mut self.data[frame * self.bins..(frame + 1) * self.bins]
    }

    #[inline]
    pub fn get(&self, frame: usize, bin: usize) -> f32 {
        self.data[frame * self.bins + bin]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Width of one frequency bin in Hz.
    pub fn bin_width_hz(&self) -> f64 {
        self.nyquist() / self.bins as f64
    }

    pub fn frames_per_second(&self) -> f64 {
        self.sample_rate as f64 / self.hop as f64
    }

    /// Index of the loudest bin in a frame.
    pub fn peak_bin(&self, frame: usize) -> usize {
        self.frame(frame)
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0
    }
}

/// Decibel window used to normalize magnitudes into `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicRange {
    pub top_db: f32,
    pub bottom_db: f32,
}

impl DynamicRange {
    /// Build from the observed extremes, limiting the window to `window_db` below the top.
    pub fn from_observed(min_db: f32, max_db: f32, window_db: f32) -> Self {
        let bottom_db = min_db.max(max_db - window_db).min(max_db);
        Self { top_db: max_db, bottom_db }
    }

    pub fn denominator(&self) -> f32 {
        (self.top_db - self.bottom_db).max(f32::EPSILON)
    }

    /// Map a dB value into `[0, 1]`.
    #[inline]
    pub fn normalize(&self, db: f32) -> f32 {
        ((db - self.bottom_db) / self.denominator()).clamp(0.0, 1.0)
    }
}

/// Cosmetic rendering parameters. Changing any of them only re-rasterizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderParameters {
    pub gain: f32,
    pub colormap: String,
    pub frequency_ceiling_hz: f64,
}

impl RenderParameters {
    /// Clamp gain and ceiling into their valid domain for a recording with the given Nyquist.
    pub fn sanitized(&self, nyquist: f64) -> Self {
        let gain = if self.gain.is_finite() && self.gain > 0.0 {
            self.gain
        } else {
            log::warn!("gain {} out of range, using 1.0", self.gain);
            1.0
        };
        let frequency_ceiling_hz =
            if self.frequency_ceiling_hz.is_finite() && self.frequency_ceiling_hz > 0.0 {
                self.frequency_ceiling_hz.min(nyquist)
            } else {
                log::warn!(
                    "frequency ceiling {} out of range, using Nyquist",
                    self.frequency_ceiling_hz
                );
                nyquist
            };
        Self { gain, colormap: self.colormap.clone(), frequency_ceiling_hz }
    }
}

/// A bounded-width slice of the rendered image (RGBA, row-major).
#[derive(Clone, Debug, Default)]
pub struct Tile {
    pub start_column: usize,
    pub column_count: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub start_time_sec: f64,
    pub end_time_sec: f64,
}

impl Tile {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// RGBA of the pixel at tile-local `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.column_count + x) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let audio = AudioSamples::from_channels(
            vec![vec![1.0, 0.5, -1.0], vec![0.0, 0.5, 1.0, 9.0]],
            8000,
        )
        .unwrap();
        assert_eq!(audio.samples, vec![0.5, 0.5, 0.0]);
        assert_eq!(audio.sample_rate, 8000);
    }

    #[test]
    fn no_channels_is_rejected() {
        assert!(AudioSamples::from_channels(Vec::new(), 8000).is_err());
    }

    #[test]
    fn dynamic_range_window_is_capped() {
        let r = DynamicRange::from_observed(-240.0, -10.0, 80.0);
        assert_eq!(r.top_db, -10.0);
        assert_eq!(r.bottom_db, -90.0);
        assert!(r.bottom_db <= r.top_db);

        let narrow = DynamicRange::from_observed(-20.0, -10.0, 80.0);
        assert_eq!(narrow.bottom_db, -20.0);
        assert_eq!(narrow.normalize(-15.0), 0.5);
    }

    #[test]
    fn flat_range_has_positive_denominator() {
        let r = DynamicRange::from_observed(-30.0, -30.0, 80.0);
        assert!(r.denominator() > 0.0);
        assert_eq!(r.normalize(-30.0), 0.0);
    }

    #[test]
    fn sanitize_clamps_ceiling_and_gain() {
        let p = RenderParameters { gain: -2.0, colormap: "magma".into(), frequency_ceiling_hz: 96_000.0 };
        let s = p.sanitized(22_050.0);
        assert_eq!(s.gain, 1.0);
        assert_eq!(s.frequency_ceiling_hz, 22_050.0);
    }
}
