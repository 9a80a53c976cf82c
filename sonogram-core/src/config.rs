use serde::{Deserialize, Serialize};

/// Tunables for analysis and rasterization.
///
/// Deserializes with per-field defaults, so a partial JSON object is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Power-of-two FFT block size.
    pub fft_size: usize,
    /// Hop is `fft_size / overlap_factor`.
    pub overlap_factor: usize,
    /// Horizontal zoom: image pixels per analysis frame.
    pub pixels_per_frame: f64,
    pub image_height: usize,
    /// Widest tile the rasterizer will emit, in pixels.
    pub max_tile_width: usize,
    pub axis_gutter_px: u32,
    /// Normalization window below the loudest observed level.
    pub dynamic_range_db: f32,
    pub frames_per_yield: usize,
    pub tiles_per_yield: usize,
    pub colormap: String,
    pub gain: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            overlap_factor: 2,
            pixels_per_frame: 1.0,
            image_height: 512,
            max_tile_width: 8192,
            axis_gutter_px: 48,
            dynamic_range_db: 80.0,
            frames_per_yield: 128,
            tiles_per_yield: 2,
            colormap: "viridis".into(),
            gain: 1.0,
        }
    }
}

impl SpectrogramConfig {
    pub fn hop_size(&self) -> usize {
        if self.overlap_factor == 0 {
            0
        } else {
            self.fft_size / self.overlap_factor
        }
    }
}
