//! Pixel ↔ time and pixel ↔ frequency conversion.
//!
//! [`AxisMapping`] is the only place this arithmetic lives. The rasterizer
//! stamps tile times with it and every overlay (annotation boxes, crosshair,
//! axis labels) must go through the published instance.

use serde::{Deserialize, Serialize};

/// Nice 1-2-5 progression of tick intervals in seconds, from 0.1 ms to 10 min.
const TIME_TICK_INTERVALS: &[f64] = &[
    0.0001, 0.0002, 0.0005,
    0.001, 0.002, 0.005,
    0.01, 0.02, 0.05,
    0.1, 0.2, 0.5,
    1.0, 2.0, 5.0,
    10.0, 30.0, 60.0,
    120.0, 300.0, 600.0,
];

const FREQ_TICK_INTERVALS: &[f64] = &[
    10.0, 20.0, 50.0,
    100.0, 200.0, 500.0,
    1_000.0, 2_000.0, 5_000.0,
    10_000.0, 20_000.0, 50_000.0,
];

/// Smallest pixels-per-second used as a divisor.
const MIN_PIXELS_PER_SECOND: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub pixels_per_second: f64,
    pub image_width_px: usize,
    pub image_height_px: usize,
    /// Space reserved left of the image for frequency labels.
    pub axis_gutter_px: u32,
    /// Frequency at row 0.
    pub frequency_ceiling_hz: f64,
}

/// One labelled (or minor, unlabelled) axis tick.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisTick {
    /// Image-space position: x for time ticks, y for frequency ticks.
    pub position_px: f64,
    pub value: f64,
    pub label: Option<String>,
}

impl AxisMapping {
    /// Mapping for a generated recording: the image spans exactly `duration_secs`.
    pub fn for_recording(
        image_width_px: usize,
        image_height_px: usize,
        duration_secs: f64,
        axis_gutter_px: u32,
        frequency_ceiling_hz: f64,
    ) -> Self {
        let pixels_per_second = if duration_secs > 0.0 {
            image_width_px as f64 / duration_secs
        } else {
            0.0
        };
        Self {
            pixels_per_second,
            image_width_px,
            image_height_px,
            axis_gutter_px,
            frequency_ceiling_hz,
        }
    }

    /// Mapping before any recording is generated, from the analysis frame rate and zoom.
    pub fn provisional(
        frames_per_second: f64,
        pixels_per_frame: f64,
        image_height_px: usize,
        axis_gutter_px: u32,
        frequency_ceiling_hz: f64,
    ) -> Self {
        Self {
            pixels_per_second: frames_per_second * pixels_per_frame,
            image_width_px: 0,
            image_height_px,
            axis_gutter_px,
            frequency_ceiling_hz,
        }
    }

    pub fn with_ceiling(self, frequency_ceiling_hz: f64) -> Self {
        Self { frequency_ceiling_hz, ..self }
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.pixels_per_second
    }

    pub fn seconds_to_pixels(&self, t: f64) -> i64 {
        (t * self.pixels_per_second).round() as i64
    }

    /// Inverse of [`seconds_to_pixels`](Self::seconds_to_pixels).
    ///
    /// The divisor is only guarded against zero (`max(pps, 1e-9)`), not clamped
    /// to 1 px/s: a `max(1, pps)` clamp would break the round trip when long
    /// recordings are zoomed below one pixel per second. Overlays should call
    /// this rather than re-deriving the arithmetic.
    pub fn pixels_to_seconds(&self, px: f64) -> f64 {
        px / self.pixels_per_second.max(MIN_PIXELS_PER_SECOND)
    }

    pub fn duration_secs(&self) -> f64 {
        self.pixels_to_seconds(self.image_width_px as f64)
    }

    /// Frequency shown at image row `row` (row 0 = ceiling, last row = 0 Hz).
    pub fn row_to_hz(&self, row: f64) -> f64 {
        let last = self.image_height_px.saturating_sub(1);
        if last == 0 {
            return self.frequency_ceiling_hz;
        }
        (1.0 - row / last as f64) * self.frequency_ceiling_hz
    }

    pub fn hz_to_row(&self, hz: f64) -> f64 {
        let last = self.image_height_px.saturating_sub(1) as f64;
        if self.frequency_ceiling_hz <= 0.0 {
            return last;
        }
        (1.0 - hz / self.frequency_ceiling_hz) * last
    }

    /// Time ticks between `start_sec` and `end_sec`, labelled ticks at least
    /// `min_spacing_px` apart, with unlabelled minor ticks when they fit.
    pub fn time_ticks(&self, start_sec: f64, end_sec: f64, min_spacing_px: f64) -> Vec<AxisTick> {
        let pps = self.pixels_per_second;
        if pps <= 0.0 || end_sec <= start_sec {
            return Vec::new();
        }
        let interval = pick_interval(TIME_TICK_INTERVALS, min_spacing_px / pps);

        let mut ticks = Vec::new();
        let minor = interval / 5.0;
        let with_minor = minor * pps >= 4.0;
        let step = if with_minor { minor } else { interval };
        let mut i = (start_sec / step).ceil() as i64;
        loop {
            let t = i as f64 * step;
            if t > end_sec + step * 1e-6 {
                break;
            }
            let is_major = !with_minor || i % 5 == 0;
            ticks.push(AxisTick {
                position_px: t * pps,
                value: t,
                label: is_major.then(|| format_time_label(t, interval)),
            });
            i += 1;
        }
        ticks
    }

    /// Frequency ticks from the first interval up to the ceiling, at least
    /// `min_spacing_px` apart vertically.
    pub fn frequency_ticks(&self, min_spacing_px: f64) -> Vec<AxisTick> {
        let last = self.image_height_px.saturating_sub(1) as f64;
        if last <= 0.0 || self.frequency_ceiling_hz <= 0.0 {
            return Vec::new();
        }
        let px_per_hz = last / self.frequency_ceiling_hz;
        let interval = pick_interval(FREQ_TICK_INTERVALS, min_spacing_px / px_per_hz);

        let mut ticks = Vec::new();
        let mut hz = interval;
        while hz < self.frequency_ceiling_hz {
            ticks.push(AxisTick {
                position_px: self.hz_to_row(hz),
                value: hz,
                label: Some(format_freq_label(hz)),
            });
            hz += interval;
        }
        ticks
    }
}

fn pick_interval(table: &[f64], min_interval: f64) -> f64 {
    table
        .iter()
        .copied()
        .find(|&i| i >= min_interval)
        .unwrap_or(table[table.len() - 1])
}

/// Compact time label whose precision matches the tick interval.
fn format_time_label(seconds: f64, interval: f64) -> String {
    if interval < 0.001 {
        format!("{:.1}ms", seconds * 1000.0)
    } else if interval < 1.0 {
        if interval >= 0.01 {
            format!("{:.0}ms", seconds * 1000.0)
        } else {
            format!("{:.1}ms", seconds * 1000.0)
        }
    } else if interval < 60.0 {
        if (seconds - seconds.round()).abs() < 0.001 {
            format!("{:.0}s", seconds)
        } else {
            format!("{:.1}s", seconds)
        }
    } else {
        let mins = (seconds / 60.0).floor() as u32;
        let secs = (seconds % 60.0).round() as u32;
        if secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m{secs:02}s")
        }
    }
}

fn format_freq_label(hz: f64) -> String {
    if hz >= 1000.0 {
        let khz = hz / 1000.0;
        if (khz - khz.round()).abs() < 1e-9 {
            format!("{} kHz", khz.round() as u32)
        } else {
            format!("{khz:.1} kHz")
        }
    } else {
        format!("{} Hz", hz.round() as u32)
    }
}
