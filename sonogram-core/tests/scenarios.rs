//! End-to-end scenarios: decode → analyze → rasterize → re-rasterize.

use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sonogram_core::session::{RenderPhase, RenderPlan, ViewSettings};
use sonogram_core::{
    AudioSamples, GenerateRequest, Immediate, NoopListener, Palette, Radix2Fft, RenderOrchestrator,
    RenderParameters, SpectrogramConfig, SpectrogramError, TransformKernel, WavDecoder, YieldPoint,
};

/// Radix-2 kernel that counts how often it runs.
#[derive(Clone, Default)]
struct CountingKernel {
    inner: Radix2Fft,
    calls: Arc<AtomicUsize>,
}

impl CountingKernel {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransformKernel for CountingKernel {
    fn forward(&mut self, re: &mut [f32], im: &mut [f32]) -> sonogram_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.forward(re, im)
    }
}

#[derive(Default)]
struct CountingYield(usize);

impl YieldPoint for CountingYield {
    fn yield_now(&mut self) -> impl Future<Output = ()> {
        self.0 += 1;
        std::future::ready(())
    }
}

fn sine(freq: f64, sample_rate: u32, secs: f64) -> AudioSamples {
    let len = (sample_rate as f64 * secs) as usize;
    let samples = (0..len)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32)
        .collect();
    AudioSamples::mono(samples, sample_rate).unwrap()
}

fn greyscale_config() -> SpectrogramConfig {
    SpectrogramConfig { colormap: "greyscale".into(), ..Default::default() }
}

/// Row with the brightest pixel in image column `x`.
fn brightest_row(orch: &RenderOrchestrator<impl TransformKernel + Clone>, x: usize) -> usize {
    let tile = orch
        .tiles()
        .iter()
        .find(|t| x >= t.start_column && x < t.start_column + t.column_count)
        .unwrap();
    (0..tile.height)
        .max_by_key(|&y| tile.pixel(x - tile.start_column, y)[0])
        .unwrap()
}

#[test]
fn one_second_tone_matches_expected_geometry() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig::default());
    let request = GenerateRequest::new(sine(1000.0, 44_100, 1.0), orch.config());
    let summary = pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();

    let m = &summary.matrix;
    assert_eq!(m.hop, 1024);
    assert_eq!(m.bins, 1024);
    assert_eq!(m.num_frames, 42);
    let expected_bin = (1000.0 / 44_100.0 * 2048.0f64).round() as usize;
    assert_eq!(expected_bin, 46);
    for frame in 0..m.num_frames {
        assert_eq!(m.peak_bin(frame), expected_bin, "frame {frame}");
    }
    assert_eq!(summary.default_frequency_ceiling_hz, 22_050.0);
    assert!(summary.dynamic_range.bottom_db <= summary.dynamic_range.top_db);
    assert_eq!(summary.image_width, 42);
    assert!((summary.mapping.pixels_per_second() - 42.0).abs() < 1e-9);
}

#[test]
fn window_length_boundary() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig::default());
    let exact = AudioSamples::mono(vec![0.25; 2048], 44_100).unwrap();
    let summary = pollster::block_on(orch.generate(
        GenerateRequest::new(exact, orch.config()),
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap();
    assert_eq!(summary.matrix.num_frames, 1);

    let short = AudioSamples::mono(vec![0.25; 2047], 44_100).unwrap();
    let err = pollster::block_on(orch.generate(
        GenerateRequest::new(short, orch.config()),
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap_err();
    assert!(matches!(
        err,
        SpectrogramError::InsufficientSamples { samples: 2047, fft_size: 2048 }
    ));
}

#[test]
fn rerender_is_idempotent() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig { max_tile_width: 16, ..Default::default() });
    let request = GenerateRequest::new(sine(3000.0, 22_050, 1.0), orch.config());
    pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();

    let params = RenderParameters { gain: 2.5, colormap: "inferno".into(), frequency_ceiling_hz: 6000.0 };
    let first: Vec<Vec<u8>> = pollster::block_on(orch.rerender(params.clone(), &mut Immediate, &mut NoopListener))
        .unwrap()
        .iter()
        .map(|t| t.pixels.clone())
        .collect();
    let second: Vec<Vec<u8>> = pollster::block_on(orch.rerender(params, &mut Immediate, &mut NoopListener))
        .unwrap()
        .iter()
        .map(|t| t.pixels.clone())
        .collect();
    assert!(first.len() > 1);
    assert_eq!(first, second);
}

#[test]
fn cosmetic_changes_never_retransform() {
    let kernel = CountingKernel::default();
    let mut orch = RenderOrchestrator::with_kernel(SpectrogramConfig::default(), kernel.clone());
    let request = GenerateRequest::new(sine(1000.0, 44_100, 2.0), orch.config());
    let summary = pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();
    let transforms = kernel.calls();
    assert_eq!(transforms, summary.matrix.num_frames);

    let before = orch.tiles()[0].pixels.clone();
    for (gain, colormap) in [(4.0, "viridis"), (4.0, "magma"), (0.5, "turbo")] {
        let params = RenderParameters {
            gain,
            colormap: colormap.into(),
            frequency_ceiling_hz: orch.frequency_ceiling_hz(),
        };
        pollster::block_on(orch.rerender(params, &mut Immediate, &mut NoopListener)).unwrap();
        let matrix = orch.matrix().unwrap();
        assert_eq!(matrix.num_frames, summary.matrix.num_frames);
        assert_eq!(matrix.bins, summary.matrix.bins);
        assert_eq!(orch.dynamic_range(), Some(summary.dynamic_range));
        assert!(Arc::ptr_eq(matrix, &summary.matrix));
    }
    assert_eq!(kernel.calls(), transforms);
    assert_ne!(orch.tiles()[0].pixels, before);
}

#[test]
fn lowering_the_ceiling_only_moves_rows() {
    let kernel = CountingKernel::default();
    let mut orch = RenderOrchestrator::with_kernel(greyscale_config(), kernel.clone());
    let request = GenerateRequest::new(sine(1000.0, 44_100, 1.0), orch.config());
    let summary = pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();
    let transforms = kernel.calls();

    // Nearest-bin rows: bin b sits on row (1023 - b) / 2, so the 1 kHz line is near row 488.
    let full_row = brightest_row(&orch, 20);
    assert!((486..=490).contains(&full_row), "row {full_row}");

    let params = RenderParameters { gain: 1.0, colormap: "greyscale".into(), frequency_ceiling_hz: 8000.0 };
    pollster::block_on(orch.rerender(params, &mut Immediate, &mut NoopListener)).unwrap();

    let matrix = orch.matrix().unwrap();
    assert_eq!(matrix.num_frames, summary.matrix.num_frames);
    assert_eq!(matrix.bins, summary.matrix.bins);
    assert_eq!(kernel.calls(), transforms);

    let mapping = orch.mapping().unwrap();
    assert_eq!(mapping.frequency_ceiling_hz, 8000.0);
    assert_eq!(mapping.image_width_px, summary.image_width);
    let zoomed_row = brightest_row(&orch, 20);
    let expected = mapping.hz_to_row(1000.0);
    assert!((zoomed_row as f64 - expected).abs() <= 4.0, "row {zoomed_row}, expected ~{expected}");
}

#[test]
fn time_mapping_round_trips_over_recording() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig { pixels_per_frame: 0.75, ..Default::default() });
    let request = GenerateRequest::new(sine(440.0, 48_000, 3.0), orch.config());
    pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();
    let mapping = orch.mapping().unwrap();
    let resolution = 1.0 / mapping.pixels_per_second();
    for i in 0..=300 {
        let t = 3.0 * i as f64 / 300.0;
        let back = mapping.pixels_to_seconds(mapping.seconds_to_pixels(t) as f64);
        assert!((back - t).abs() <= resolution, "t={t} back={back}");
    }
}

#[test]
fn yields_follow_frame_and_tile_cadence() {
    let config = SpectrogramConfig { max_tile_width: 50, ..Default::default() };
    let mut orch = RenderOrchestrator::new(config);
    // 10 s at 44.1 kHz: 429 frames → yields after 128, 256, 384.
    // 429 px in 50 px tiles: 9 tiles → yields after 2, 4, 6, 8.
    let request = GenerateRequest::new(sine(200.0, 44_100, 10.0), orch.config());
    let mut yielder = CountingYield::default();
    let summary = pollster::block_on(orch.generate(request, &mut yielder, &mut NoopListener)).unwrap();
    assert_eq!(summary.matrix.num_frames, 429);
    assert_eq!(orch.tiles().len(), 9);
    assert_eq!(yielder.0, 7);
}

#[test]
fn superseded_generate_stops_early() {
    let kernel = CountingKernel::default();
    let mut orch = RenderOrchestrator::with_kernel(SpectrogramConfig::default(), kernel.clone());
    let stale = orch
        .prepare_generate(GenerateRequest::new(sine(500.0, 44_100, 10.0), orch.config()))
        .unwrap();
    let fresh = orch
        .prepare_generate(GenerateRequest::new(sine(700.0, 44_100, 1.0), orch.config()))
        .unwrap();

    let res = pollster::block_on(stale.run(&mut Immediate, &mut NoopListener));
    assert!(matches!(res, Err(SpectrogramError::Superseded { .. })));
    assert_eq!(kernel.calls(), 128);
    assert_eq!(orch.phase(), RenderPhase::Transforming);

    let rendered = pollster::block_on(fresh.run(&mut Immediate, &mut NoopListener)).unwrap();
    orch.complete_generate(rendered, &mut NoopListener).unwrap();
    assert_eq!(orch.phase(), RenderPhase::Ready);
    assert_eq!(orch.matrix().unwrap().num_frames, 42);
}

#[test]
fn decodes_and_downmixes_wav() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..16_000 {
            let s = (2.0 * std::f32::consts::PI * 2000.0 * i as f32 / 16_000.0).sin();
            writer.write_sample((s * 20_000.0) as i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    let mut orch = RenderOrchestrator::new(SpectrogramConfig { fft_size: 512, ..Default::default() });
    let summary = pollster::block_on(orch.generate_from_bytes(
        &WavDecoder,
        cursor.get_ref(),
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap();
    assert_eq!(summary.default_frequency_ceiling_hz, 8000.0);
    assert_eq!(summary.matrix.peak_bin(3), 64);
    let session = orch.session().unwrap();
    assert!(session.samples.samples.iter().all(|s| s.abs() <= 0.5));
}

/// One second of a 16-bit mono tone.
fn mono_wav(sample_rate: u32, freq: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..sample_rate {
            let s = (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
            writer.write_sample((s * 16_000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[test]
fn render_choices_carry_over_to_the_next_file() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig { fft_size: 512, ..Default::default() });
    pollster::block_on(orch.generate_from_bytes(
        &WavDecoder,
        &mono_wav(16_000, 1000.0),
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap();
    let params = RenderParameters { gain: 4.0, colormap: "magma".into(), frequency_ceiling_hz: 2000.0 };
    pollster::block_on(orch.rerender(params, &mut Immediate, &mut NoopListener)).unwrap();

    pollster::block_on(orch.generate_from_bytes(
        &WavDecoder,
        &mono_wav(8000, 500.0),
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap();
    assert_eq!(orch.params().gain, 4.0);
    assert_eq!(orch.params().colormap, "magma");
    assert_eq!(orch.lut().palette(), Palette::Magma);
    // The ceiling follows the new recording.
    assert_eq!(orch.frequency_ceiling_hz(), 4000.0);
    assert_eq!(orch.mapping().unwrap().frequency_ceiling_hz, 4000.0);
}

#[test]
fn decoder_failure_propagates_and_keeps_state() {
    let mut orch = RenderOrchestrator::new(SpectrogramConfig::default());
    let err = pollster::block_on(orch.generate_from_bytes(
        &WavDecoder,
        b"RIFF but not really",
        &mut Immediate,
        &mut NoopListener,
    ))
    .unwrap_err();
    assert!(matches!(err, SpectrogramError::Decode(_)));
    assert_eq!(orch.phase(), RenderPhase::Idle);
    assert!(orch.tiles().is_empty());
}

#[test]
fn fft_size_change_plans_a_transform() {
    let kernel = CountingKernel::default();
    let mut orch = RenderOrchestrator::with_kernel(SpectrogramConfig::default(), kernel.clone());
    let request = GenerateRequest::new(sine(1000.0, 44_100, 1.0), orch.config());
    pollster::block_on(orch.generate(request, &mut Immediate, &mut NoopListener)).unwrap();
    let before = kernel.calls();

    let settings = ViewSettings {
        fft_size: 1024,
        overlap_factor: 2,
        pixels_per_frame: 1.0,
        params: orch.params().clone(),
    };
    let plan = pollster::block_on(orch.update(settings, &mut Immediate, &mut NoopListener)).unwrap();
    assert_eq!(plan, RenderPlan::Transform);
    let matrix = orch.matrix().unwrap();
    assert_eq!(matrix.bins, 512);
    assert_eq!(kernel.calls() - before, matrix.num_frames);
}
