//! Magnitude matrix → RGBA tiles.
//!
//! The image is cut into tiles no wider than `max_tile_width` so the transient
//! pixel buffer stays bounded on long recordings. Two row mappings exist:
//!
//! - [`RowMapping::NearestBin`]: right after analysis, rows sample the bin grid
//!   up to Nyquist directly.
//! - [`RowMapping::Interpolated`]: re-renders under an arbitrary frequency
//!   ceiling blend the two neighbouring bins, because row boundaries no longer
//!   line up with the bin grid.
//!
//! Neither path reads audio samples or runs a transform.

use crate::canvas::axis::AxisMapping;
use crate::canvas::colors::ColorLut;
use crate::error::Result;
use crate::listener::{RenderEvent, RenderListener};
use crate::types::{magnitude_to_db, DynamicRange, MagnitudeMatrix, Tile};
use crate::yield_point::{checkpoint, RequestToken, YieldPoint};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RowMapping {
    NearestBin,
    Interpolated { ceiling_hz: f64 },
}

/// Everything one rasterization pass reads. All of it is shared, read-only.
#[derive(Clone, Copy, Debug)]
pub struct RasterInput<'a> {
    pub matrix: &'a MagnitudeMatrix,
    pub range: DynamicRange,
    pub lut: &'a ColorLut,
    pub gain: f32,
    pub pixels_per_frame: f64,
    pub mapping: &'a AxisMapping,
    pub rows: RowMapping,
}

/// Source bins and blend weight for one image row.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RowSample {
    lo: usize,
    hi: usize,
    frac: f32,
}

/// Rendered image width for a matrix at a given zoom (at least one pixel).
pub fn image_width(num_frames: usize, pixels_per_frame: f64) -> usize {
    ((num_frames as f64 * pixels_per_frame).round() as usize).max(1)
}

/// Partition `[0, width)` into `(start, count)` spans of at most `max_tile_width`.
pub fn tile_spans(width: usize, max_tile_width: usize) -> Vec<(usize, usize)> {
    let max = max_tile_width.max(1);
    (0..width)
        .step_by(max)
        .map(|start| (start, max.min(width - start)))
        .collect()
}

/// Analysis frame shown at global image column `x`.
#[inline]
pub fn column_frame(x: usize, pixels_per_frame: f64, num_frames: usize) -> usize {
    let f = (x as f64 / pixels_per_frame).floor();
    if f <= 0.0 {
        0
    } else {
        (f as usize).min(num_frames.saturating_sub(1))
    }
}

fn row_table(rows: RowMapping, height: usize, matrix: &MagnitudeMatrix) -> Vec<RowSample> {
    let bins = matrix.bins;
    let top_bin = bins.saturating_sub(1);
    match rows {
        RowMapping::NearestBin => (0..height)
            .map(|row| {
                let bin = top_bin - ((row * bins) / height).min(top_bin);
                RowSample { lo: bin, hi: bin, frac: 0.0 }
            })
            .collect(),
        RowMapping::Interpolated { ceiling_hz } => {
            let nyquist = matrix.nyquist();
            let last_row = height.saturating_sub(1).max(1) as f64;
            (0..height)
                .map(|row| {
                    let freq = (1.0 - row as f64 / last_row) * ceiling_hz;
                    let fractional = (freq / nyquist * top_bin as f64).clamp(0.0, top_bin as f64);
                    let lo = fractional.floor() as usize;
                    let hi = (lo + 1).min(top_bin);
                    RowSample { lo, hi, frac: (fractional - lo as f64) as f32 }
                })
                .collect()
        }
    }
}

fn paint_row(
    input: &RasterInput<'_>,
    sample: RowSample,
    frames: &[usize],
    out: &mut [u8],
) {
    for (px, &frame) in out.chunks_exact_mut(4).zip(frames) {
        let column = input.matrix.frame(frame);
        // A bin-less matrix paints as silence.
        let lo = column.get(sample.lo).copied().unwrap_or(0.0);
        let hi = column.get(sample.hi).copied().unwrap_or(lo);
        let mag = lo + (hi - lo) * sample.frac;
        let norm = input.range.normalize(magnitude_to_db(mag * input.gain));
        let [r, g, b] = input.lut.apply(norm);
        px[0] = r;
        px[1] = g;
        px[2] = b;
        px[3] = 255;
    }
}

/// Render one tile of `count` columns starting at global column `start` into `tile`.
///
/// The tile's pixel buffer is resized in place, so a recycled tile keeps its allocation.
pub fn rasterize_tile(input: &RasterInput<'_>, start: usize, count: usize, tile: &mut Tile) {
    let height = input.mapping.image_height_px;
    rasterize_tile_with(input, &row_table(input.rows, height, input.matrix), start, count, tile);
}

fn rasterize_tile_with(
    input: &RasterInput<'_>,
    rows: &[RowSample],
    start: usize,
    count: usize,
    tile: &mut Tile,
) {
    let height = rows.len();
    let frames: Vec<usize> = (start..start + count)
        .map(|x| column_frame(x, input.pixels_per_frame, input.matrix.num_frames))
        .collect();

    tile.start_column = start;
    tile.column_count = count;
    tile.height = height;
    tile.start_time_sec = input.mapping.pixels_to_seconds(start as f64);
    tile.end_time_sec = input.mapping.pixels_to_seconds((start + count) as f64);
    tile.pixels.resize(count * height * 4, 0);

    let stride = count * 4;
    if stride == 0 {
        return;
    }
    paint_rows(input, rows, &frames, &mut tile.pixels, stride);
}

#[cfg(feature = "parallel")]
fn paint_rows(input: &RasterInput<'_>, rows: &[RowSample], frames: &[usize], pixels: &mut [u8], stride: usize) {
    use rayon::prelude::*;
    pixels
        .par_chunks_mut(stride)
        .zip(rows.par_iter())
        .for_each(|(out, &sample)| paint_row(input, sample, frames, out));
}

#[cfg(not(feature = "parallel"))]
fn paint_rows(input: &RasterInput<'_>, rows: &[RowSample], frames: &[usize], pixels: &mut [u8], stride: usize) {
    for (out, &sample) in pixels.chunks_exact_mut(stride).zip(rows) {
        paint_row(input, sample, frames, out);
    }
}

/// Render the whole image as tiles, yielding every `tiles_per_yield` tiles.
///
/// Buffers from `recycled` are reused front to back; extras are dropped.
pub async fn rasterize<Y, L>(
    input: &RasterInput<'_>,
    max_tile_width: usize,
    tiles_per_yield: usize,
    mut recycled: Vec<Tile>,
    yielder: &mut Y,
    token: &RequestToken,
    listener: &mut L,
) -> Result<Vec<Tile>>
where
    Y: YieldPoint,
    L: RenderListener,
{
    let width = input.mapping.image_width_px;
    let height = input.mapping.image_height_px;
    let spans = tile_spans(width, max_tile_width);
    let rows = row_table(input.rows, height, input.matrix);
    let yield_every = tiles_per_yield.max(1);

    recycled.truncate(spans.len());
    recycled.reverse();
    let mut tiles = Vec::with_capacity(spans.len());
    for (i, &(start, count)) in spans.iter().enumerate() {
        let mut tile = recycled.pop().unwrap_or_default();
        rasterize_tile_with(input, &rows, start, count, &mut tile);
        tiles.push(tile);

        let done = i + 1;
        if done % yield_every == 0 && done < spans.len() {
            listener.on_event(RenderEvent::TilesRasterized { token: token.id(), done, total: spans.len() });
            checkpoint(yielder, token).await?;
        }
    }
    listener.on_event(RenderEvent::TilesRasterized {
        token: token.id(),
        done: spans.len(),
        total: spans.len(),
    });
    log::debug!("rasterized {width}x{height} into {} tiles ({:?})", tiles.len(), input.rows);
    Ok(tiles)
}

/// Double-buffered tile storage.
///
/// Passes render into recycled buffers; publishing swaps the new set in front
/// and keeps the old one for the next pass. A failed pass never touches the
/// front set.
#[derive(Debug, Default)]
pub struct TileArena {
    front: Vec<Tile>,
    spare: Vec<Tile>,
}

impl TileArena {
    pub fn front(&self) -> &[Tile] {
        &self.front
    }

    /// Buffers for the next pass (possibly empty).
    pub fn take_spare(&mut self) -> Vec<Tile> {
        std::mem::take(&mut self.spare)
    }

    pub fn publish(&mut self, tiles: Vec<Tile>) {
        self.spare = std::mem::replace(&mut self.front, tiles);
    }

    /// Return buffers from a pass whose results were discarded.
    pub fn recycle(&mut self, tiles: Vec<Tile>) {
        if self.spare.is_empty() {
            self.spare = tiles;
        }
    }

    pub fn byte_len(&self) -> usize {
        self.front.iter().chain(&self.spare).map(Tile::byte_len).sum()
    }
}
