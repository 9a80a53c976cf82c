use std::cell::RefCell;
use std::collections::HashMap;

use crate::dsp::fft::TransformKernel;
use crate::error::{Result, SpectrogramError};
use crate::listener::{RenderEvent, RenderListener};
use crate::types::{magnitude_to_db, DynamicRange, MagnitudeMatrix};
use crate::yield_point::{checkpoint, RequestToken, YieldPoint};

thread_local! {
    static HANN_CACHE: RefCell<HashMap<usize, Vec<f32>>> = RefCell::new(HashMap::new());
}

/// Symmetric Hann window, `0.5·(1 − cos(2πn/(N−1)))`.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    HANN_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(size)
            .or_insert_with(|| {
                (0..size)
                    .map(|i| {
                        0.5 * (1.0
                            - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
                    })
                    .collect()
            })
            .clone()
    })
}

/// Number of whole analysis frames that fit in `sample_count` samples.
pub fn frame_count(sample_count: usize, fft_size: usize, hop: usize) -> usize {
    if hop == 0 || sample_count < fft_size {
        0
    } else {
        (sample_count - fft_size) / hop + 1
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StftParams {
    pub fft_size: usize,
    pub hop: usize,
    pub frames_per_yield: usize,
    pub dynamic_range_db: f32,
}

impl StftParams {
    /// Validate and derive the hop from an overlap factor.
    pub fn new(fft_size: usize, overlap_factor: usize) -> Result<Self> {
        // A one-point transform has no positive-frequency bins to show.
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(SpectrogramError::InvalidSize { size: fft_size });
        }
        if overlap_factor == 0 || overlap_factor > fft_size {
            return Err(SpectrogramError::InvalidParameter(format!(
                "overlap factor {overlap_factor} must be in 1..={fft_size}"
            )));
        }
        Ok(Self {
            fft_size,
            hop: fft_size / overlap_factor,
            frames_per_yield: 128,
            dynamic_range_db: 80.0,
        })
    }
}

/// Output of one STFT pass.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub matrix: MagnitudeMatrix,
    pub range: DynamicRange,
}

/// Run the windowed STFT over `samples`.
///
/// Magnitudes are `|X[k]| / N` for the first `N/2` bins, without gain. Every
/// `frames_per_yield` frames the loop suspends at `yielder` and aborts with
/// [`SpectrogramError::Superseded`] if `token` went stale meanwhile.
pub async fn analyze<K, Y, L>(
    samples: &[f32],
    sample_rate: u32,
    params: &StftParams,
    kernel: &mut K,
    yielder: &mut Y,
    token: &RequestToken,
    listener: &mut L,
) -> Result<Analysis>
where
    K: TransformKernel,
    Y: YieldPoint,
    L: RenderListener,
{
    analyze_into(samples, sample_rate, params, None, kernel, yielder, token, listener).await
}

/// [`analyze`], writing into `spare`'s allocation when one is given.
#[allow(clippy::too_many_arguments)]
pub async fn analyze_into<K, Y, L>(
    samples: &[f32],
    sample_rate: u32,
    params: &StftParams,
    spare: Option<MagnitudeMatrix>,
    kernel: &mut K,
    yielder: &mut Y,
    token: &RequestToken,
    listener: &mut L,
) -> Result<Analysis>
where
    K: TransformKernel,
    Y: YieldPoint,
    L: RenderListener,
{
    let n = params.fft_size;
    if n < 2 || !n.is_power_of_two() {
        return Err(SpectrogramError::InvalidSize { size: n });
    }
    let num_frames = frame_count(samples.len(), n, params.hop);
    if num_frames == 0 {
        return Err(SpectrogramError::InsufficientSamples { samples: samples.len(), fft_size: n });
    }

    let window = hann_window(n);
    let bins = n / 2;
    let scale = 1.0 / n as f32;
    let yield_every = params.frames_per_yield.max(1);

    let mut matrix = match spare {
        Some(m) => m.reuse(num_frames, n, params.hop, sample_rate),
        None => MagnitudeMatrix::zeroed(num_frames, n, params.hop, sample_rate),
    };
    let mut re = vec![0.0f32; n];
    let mut im = vec![0.0f32; n];
    let mut min_db = f32::INFINITY;
    let mut max_db = f32::NEG_INFINITY;

    for frame in 0..num_frames {
        let pos = frame * params.hop;
        for (r, (&s, &w)) in re.iter_mut().zip(samples[pos..pos + n].iter().zip(&window)) {
            *r = s * w;
        }
        im.fill(0.0);
        kernel.forward(&mut re, &mut im)?;

        let out = matrix.frame_mut(frame);
        for (bin, mag) in out.iter_mut().enumerate() {
            let m = (re[bin] * re[bin] + im[bin] * im[bin]).sqrt() * scale;
            *mag = m;
            let db = magnitude_to_db(m);
            min_db = min_db.min(db);
            max_db = max_db.max(db);
        }

        let done = frame + 1;
        if done % yield_every == 0 && done < num_frames {
            listener.on_event(RenderEvent::FramesAnalyzed { token: token.id(), done, total: num_frames });
            checkpoint(yielder, token).await?;
        }
    }
    listener.on_event(RenderEvent::FramesAnalyzed {
        token: token.id(),
        done: num_frames,
        total: num_frames,
    });

    let range = DynamicRange::from_observed(min_db, max_db, params.dynamic_range_db);
    log::debug!(
        "stft: {num_frames} frames x {bins} bins, hop {}, range {:.1}..{:.1} dB",
        params.hop,
        range.bottom_db,
        range.top_db
    );
    Ok(Analysis { matrix, range })
}
