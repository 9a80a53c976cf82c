//! In-place radix-2 Cooley-Tukey FFT.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::error::{Result, SpectrogramError};

/// A forward complex DFT over split real/imaginary buffers.
///
/// Implemented by [`Radix2Fft`]; the seam exists so the orchestrator can be
/// driven with an instrumented kernel.
pub trait TransformKernel {
    fn forward(&mut self, re: &mut [f32], im: &mut [f32]) -> Result<()>;
}

/// Forward DFT of `re + i·im` in place. Both buffers must share a power-of-two length.
pub fn fft_in_place(re: &mut [f32], im: &mut [f32]) -> Result<()> {
    Radix2Fft::new().forward(re, im)
}

/// Precomputed tables for one transform size.
#[derive(Debug)]
struct FftPlan {
    size: usize,
    bit_rev: Vec<u32>,
    /// `cos(2πk/N)` and `sin(2πk/N)` for `k < N/2`.
    cos: Vec<f32>,
    sin: Vec<f32>,
}

impl FftPlan {
    fn new(size: usize) -> Self {
        let bits = size.trailing_zeros();
        let bit_rev = if bits == 0 {
            vec![0]
        } else {
            (0..size)
                .map(|i| (i.reverse_bits() >> (usize::BITS - bits)) as u32)
                .collect()
        };
        let half = size / 2;
        let (cos, sin) = (0..half)
            .map(|k| {
                let angle = 2.0 * PI * k as f64 / size as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .unzip();
        Self { size, bit_rev, cos, sin }
    }
}

/// Reusable radix-2 kernel. Keeps the tables for the most recent size, so
/// repeated frames of one STFT pay for planning once.
#[derive(Clone, Debug, Default)]
pub struct Radix2Fft {
    plan: Option<Arc<FftPlan>>,
}

impl Radix2Fft {
    pub fn new() -> Self {
        Self::default()
    }

    fn plan_for(&mut self, size: usize) -> Arc<FftPlan> {
        match &self.plan {
            Some(plan) if plan.size == size => Arc::clone(plan),
            _ => {
                let plan = Arc::new(FftPlan::new(size));
                self.plan = Some(Arc::clone(&plan));
                plan
            }
        }
    }
}

impl TransformKernel for Radix2Fft {
    fn forward(&mut self, re: &mut [f32], im: &mut [f32]) -> Result<()> {
        let n = re.len();
        if !n.is_power_of_two() || im.len() != n {
            return Err(SpectrogramError::InvalidSize { size: n });
        }
        let plan = self.plan_for(n);

        for i in 0..n {
            let j = plan.bit_rev[i] as usize;
            if j > i {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut span = 2;
        while span <= n {
            let half = span / 2;
            let stride = n / span;
            for start in (0..n).step_by(span) {
                for k in 0..half {
                    // e^{-2πik/span}
                    let wr = plan.cos[k * stride];
                    let wi = -plan.sin[k * stride];
                    let a = start + k;
                    let b = a + half;
                    let tr = re[b] * wr - im[b] * wi;
                    let ti = re[b] * wi + im[b] * wr;
                    re[b] = re[a] - tr;
                    im[b] = im[a] - ti;
                    re[a] += tr;
                    im[a] += ti;
                }
            }
            span *= 2;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realfft::RealFftPlanner;

    fn magnitudes(re: &[f32], im: &[f32]) -> Vec<f32> {
        re.iter().zip(im).map(|(r, i)| (r * r + i * i).sqrt()).collect()
    }

    /// Deterministic pseudo-random signal in [-1, 1].
    fn noise(n: usize) -> Vec<f32> {
        let mut state = 0x2545_f491u32;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        for bits in 0..=12 {
            let n = 1usize << bits;
            let mut re = vec![0.0f32; n];
            let mut im = vec![0.0f32; n];
            re[0] = 1.0;
            fft_in_place(&mut re, &mut im).unwrap();
            for m in magnitudes(&re, &im) {
                assert!((m - 1.0).abs() < 1e-5, "n={n}: magnitude {m}");
            }
        }
    }

    #[test]
    fn sinusoid_peaks_at_its_bin() {
        for bits in 2..=11 {
            let n = 1usize << bits;
            for k in [1, n / 8, n / 2 - 1] {
                let k = k.max(1);
                let mut re: Vec<f32> = (0..n)
                    .map(|i| (2.0 * PI * k as f64 * i as f64 / n as f64).cos() as f32)
                    .collect();
                let mut im = vec![0.0f32; n];
                fft_in_place(&mut re, &mut im).unwrap();
                let mags = magnitudes(&re, &im);
                let peak = mags[..n / 2]
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .unwrap()
                    .0;
                assert_eq!(peak, k, "n={n}");
                assert!((mags[k] - n as f32 / 2.0).abs() < n as f32 * 1e-4);
            }
        }
    }

    #[test]
    fn matches_realfft_reference() {
        let n = 1024;
        let signal = noise(n);

        let mut re = signal.clone();
        let mut im = vec![0.0f32; n];
        fft_in_place(&mut re, &mut im).unwrap();

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(n);
        let mut input = signal;
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut input, &mut spectrum).unwrap();

        for (k, c) in spectrum.iter().enumerate() {
            assert!((re[k] - c.re).abs() < 1e-2, "bin {k}: {} vs {}", re[k], c.re);
            assert!((im[k] - c.im).abs() < 1e-2, "bin {k}: {} vs {}", im[k], c.im);
        }
    }

    #[test]
    fn preserves_energy() {
        let n = 512;
        let mut re = noise(n);
        let mut im = vec![0.0f32; n];
        let time_energy: f32 = re.iter().map(|x| x * x).sum();
        fft_in_place(&mut re, &mut im).unwrap();
        let freq_energy: f32 =
            re.iter().zip(&im).map(|(r, i)| r * r + i * i).sum::<f32>() / n as f32;
        assert!((time_energy - freq_energy).abs() / time_energy < 1e-4);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let mut re = vec![0.0f32; 1000];
        let mut im = vec![0.0f32; 1000];
        assert!(matches!(
            fft_in_place(&mut re, &mut im),
            Err(SpectrogramError::InvalidSize { size: 1000 })
        ));
        assert!(fft_in_place(&mut [], &mut []).is_err());
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let mut re = vec![0.0f32; 8];
        let mut im = vec![0.0f32; 4];
        assert!(fft_in_place(&mut re, &mut im).is_err());
    }

    #[test]
    fn replans_when_size_changes() {
        let mut fft = Radix2Fft::new();
        for n in [16usize, 64, 16] {
            let mut re = vec![0.0f32; n];
            let mut im = vec![0.0f32; n];
            re[0] = 1.0;
            fft.forward(&mut re, &mut im).unwrap();
            assert!(re.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        }
    }
}
