//! Render orchestration.
//!
//! ```text
//! Idle ─► Decoding ─► Transforming ─► Rasterizing ─► Ready
//!                                          ▲           │
//!                                          └───────────┘  gain / colormap / ceiling
//! ```
//!
//! Work happens in jobs that own their inputs (`Arc` handles and recycled
//! buffers) and never borrow the orchestrator, so a host can issue a new
//! request while an older job is parked at a yield point. Each job carries a
//! [`RequestToken`]; a newer request makes it stale, the job bails out at its
//! next yield point, and `complete_*` refuses to publish stale results.
//!
//! Two token lanes exist. A generate bumps both, a rerender only the render
//! lane, so dragging a slider never cancels analysis of a new file.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::decode::AudioDecoder;
use crate::canvas::axis::AxisMapping;
use crate::canvas::colors::{build_lut, ColorLut, Palette};
use crate::canvas::tile_rasterizer::{self, image_width, RasterInput, RowMapping, TileArena};
use crate::config::SpectrogramConfig;
use crate::dsp::fft::{Radix2Fft, TransformKernel};
use crate::dsp::stft::{self, StftParams};
use crate::error::{Result, SpectrogramError};
use crate::listener::{RenderEvent, RenderListener};
use crate::types::{AudioSamples, DynamicRange, MagnitudeMatrix, RenderParameters, Tile};
use crate::yield_point::{RequestToken, TokenSource, YieldPoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPhase {
    Idle,
    Decoding,
    Transforming,
    Rasterizing,
    Ready,
}

impl RenderPhase {
    pub fn name(self) -> &'static str {
        match self {
            RenderPhase::Idle => "idle",
            RenderPhase::Decoding => "decoding",
            RenderPhase::Transforming => "transforming",
            RenderPhase::Rasterizing => "rasterizing",
            RenderPhase::Ready => "ready",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => RenderPhase::Decoding,
            2 => RenderPhase::Transforming,
            3 => RenderPhase::Rasterizing,
            4 => RenderPhase::Ready,
            _ => RenderPhase::Idle,
        }
    }
}

/// Current phase, shared between the orchestrator and its detached jobs.
#[derive(Clone, Debug, Default)]
struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn get(&self) -> RenderPhase {
        RenderPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: RenderPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Inputs of one generate request.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub samples: Arc<AudioSamples>,
    pub fft_size: usize,
    pub overlap_factor: usize,
    pub pixels_per_frame: f64,
    pub colormap: String,
    pub gain: f32,
}

impl GenerateRequest {
    pub fn new(samples: impl Into<Arc<AudioSamples>>, config: &SpectrogramConfig) -> Self {
        Self {
            samples: samples.into(),
            fft_size: config.fft_size,
            overlap_factor: config.overlap_factor,
            pixels_per_frame: config.pixels_per_frame,
            colormap: config.colormap.clone(),
            gain: config.gain,
        }
    }
}

/// What a successful generate published.
#[derive(Clone, Debug)]
pub struct GenerateSummary {
    pub token: u64,
    pub matrix: Arc<MagnitudeMatrix>,
    pub dynamic_range: DynamicRange,
    pub mapping: AxisMapping,
    pub image_width: usize,
    pub image_height: usize,
    pub default_frequency_ceiling_hz: f64,
}

/// Everything derived from one (recording, FFT size, hop, zoom) combination.
#[derive(Clone, Debug)]
pub struct SpectrogramSession {
    pub samples: Arc<AudioSamples>,
    pub matrix: Arc<MagnitudeMatrix>,
    pub range: DynamicRange,
    pub mapping: AxisMapping,
    pub pixels_per_frame: f64,
    /// Token of the generate request that produced this session.
    pub generation: u64,
}

/// Requested view state, compared against the published one by [`RenderOrchestrator::plan`].
#[derive(Clone, Debug, PartialEq)]
pub struct ViewSettings {
    pub fft_size: usize,
    pub overlap_factor: usize,
    pub pixels_per_frame: f64,
    pub params: RenderParameters,
}

/// Cheapest work that brings the published render in line with a [`ViewSettings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPlan {
    /// Nothing generated yet, or nothing changed.
    Nothing,
    /// Only cosmetic parameters changed.
    Rasterize,
    /// FFT size, hop or zoom changed.
    Transform,
}

/// Output of a [`GenerateJob`], waiting to be published.
pub struct GeneratedRender {
    token: RequestToken,
    session: SpectrogramSession,
    params: RenderParameters,
    lut: Arc<ColorLut>,
    tiles: Vec<Tile>,
}

/// Output of a [`RasterJob`], waiting to be published.
pub struct RenderedTiles {
    token: RequestToken,
    generation: u64,
    params: RenderParameters,
    mapping: AxisMapping,
    tiles: Vec<Tile>,
}

/// Detached analysis + full rasterization of one recording.
pub struct GenerateJob<K> {
    token: RequestToken,
    samples: Arc<AudioSamples>,
    stft: StftParams,
    pixels_per_frame: f64,
    params: RenderParameters,
    config: SpectrogramConfig,
    kernel: K,
    recycled: Vec<Tile>,
    spare_matrix: Option<MagnitudeMatrix>,
    phase: PhaseCell,
    fallback: RenderPhase,
}

impl<K: TransformKernel> GenerateJob<K> {
    pub fn token(&self) -> u64 {
        self.token.id()
    }

    fn enter<L: RenderListener>(&self, phase: RenderPhase, listener: &mut L) {
        if self.token.is_current() {
            self.phase.set(phase);
            listener.on_event(RenderEvent::PhaseChanged { token: self.token.id(), phase });
        }
    }

    pub async fn run<Y, L>(mut self, yielder: &mut Y, listener: &mut L) -> Result<GeneratedRender>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        let res = self.run_inner(yielder, listener).await;
        if let Err(e) = &res {
            if self.token.is_current() {
                self.phase.set(self.fallback);
            }
            log::warn!("generate #{} failed: {e}", self.token.id());
        }
        res
    }

    async fn run_inner<Y, L>(&mut self, yielder: &mut Y, listener: &mut L) -> Result<GeneratedRender>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        self.enter(RenderPhase::Transforming, listener);
        let analysis = stft::analyze_into(
            &self.samples.samples,
            self.samples.sample_rate,
            &self.stft,
            self.spare_matrix.take(),
            &mut self.kernel,
            yielder,
            &self.token,
            listener,
        )
        .await?;
        self.token.ensure_current()?;

        self.enter(RenderPhase::Rasterizing, listener);
        let nyquist = self.samples.nyquist();
        let width = image_width(analysis.matrix.num_frames, self.pixels_per_frame);
        let mapping = AxisMapping::for_recording(
            width,
            self.config.image_height.max(1),
            self.samples.duration_secs,
            self.config.axis_gutter_px,
            nyquist,
        );
        let lut = Arc::new(build_lut(&self.params.colormap));
        let input = RasterInput {
            matrix: &analysis.matrix,
            range: analysis.range,
            lut: &lut,
            gain: self.params.gain,
            pixels_per_frame: self.pixels_per_frame,
            mapping: &mapping,
            rows: RowMapping::NearestBin,
        };
        let tiles = tile_rasterizer::rasterize(
            &input,
            self.config.max_tile_width,
            self.config.tiles_per_yield,
            std::mem::take(&mut self.recycled),
            yielder,
            &self.token,
            listener,
        )
        .await?;

        Ok(GeneratedRender {
            token: self.token.clone(),
            session: SpectrogramSession {
                samples: Arc::clone(&self.samples),
                matrix: Arc::new(analysis.matrix),
                range: analysis.range,
                mapping,
                pixels_per_frame: self.pixels_per_frame,
                generation: self.token.id(),
            },
            params: RenderParameters { frequency_ceiling_hz: nyquist, ..self.params.clone() },
            lut,
            tiles,
        })
    }
}

/// Detached re-rasterization from the cached matrix.
pub struct RasterJob {
    token: RequestToken,
    generation: u64,
    matrix: Arc<MagnitudeMatrix>,
    range: DynamicRange,
    lut: Arc<ColorLut>,
    params: RenderParameters,
    pixels_per_frame: f64,
    mapping: AxisMapping,
    max_tile_width: usize,
    tiles_per_yield: usize,
    recycled: Vec<Tile>,
}

impl RasterJob {
    pub fn token(&self) -> u64 {
        self.token.id()
    }

    pub async fn run<Y, L>(self, yielder: &mut Y, listener: &mut L) -> Result<RenderedTiles>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        let input = RasterInput {
            matrix: &self.matrix,
            range: self.range,
            lut: &self.lut,
            gain: self.params.gain,
            pixels_per_frame: self.pixels_per_frame,
            mapping: &self.mapping,
            rows: RowMapping::Interpolated { ceiling_hz: self.params.frequency_ceiling_hz },
        };
        let tiles = tile_rasterizer::rasterize(
            &input,
            self.max_tile_width,
            self.tiles_per_yield,
            self.recycled,
            yielder,
            &self.token,
            listener,
        )
        .await?;
        Ok(RenderedTiles {
            token: self.token,
            generation: self.generation,
            params: self.params,
            mapping: self.mapping,
            tiles,
        })
    }
}

/// Owns the published spectrogram state and serializes requests against it.
pub struct RenderOrchestrator<K = Radix2Fft> {
    config: SpectrogramConfig,
    kernel: K,
    generate_tokens: TokenSource,
    render_tokens: TokenSource,
    phase: PhaseCell,
    session: Option<SpectrogramSession>,
    params: RenderParameters,
    lut: Arc<ColorLut>,
    tiles: TileArena,
    /// Matrix of a replaced session, reclaimed once no job or caller holds it.
    spare_matrix: Option<MagnitudeMatrix>,
}

impl RenderOrchestrator<Radix2Fft> {
    pub fn new(config: SpectrogramConfig) -> Self {
        Self::with_kernel(config, Radix2Fft::new())
    }
}

impl<K: TransformKernel + Clone> RenderOrchestrator<K> {
    pub fn with_kernel(config: SpectrogramConfig, kernel: K) -> Self {
        let params = RenderParameters {
            gain: config.gain,
            colormap: config.colormap.clone(),
            frequency_ceiling_hz: 0.0,
        };
        let lut = Arc::new(build_lut(&params.colormap));
        Self {
            config,
            kernel,
            generate_tokens: TokenSource::new(),
            render_tokens: TokenSource::new(),
            phase: PhaseCell::default(),
            session: None,
            params,
            lut,
            tiles: TileArena::default(),
            spare_matrix: None,
        }
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    /// Replace the tunables used by subsequent requests. Published state is untouched.
    pub fn set_config(&mut self, config: SpectrogramConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase.get()
    }

    pub fn session(&self) -> Option<&SpectrogramSession> {
        self.session.as_ref()
    }

    pub fn matrix(&self) -> Option<&Arc<MagnitudeMatrix>> {
        self.session.as_ref().map(|s| &s.matrix)
    }

    pub fn dynamic_range(&self) -> Option<DynamicRange> {
        self.session.as_ref().map(|s| s.range)
    }

    /// The single authoritative axis mapping, once something has been generated.
    pub fn mapping(&self) -> Option<&AxisMapping> {
        self.session.as_ref().map(|s| &s.mapping)
    }

    pub fn params(&self) -> &RenderParameters {
        &self.params
    }

    pub fn frequency_ceiling_hz(&self) -> f64 {
        self.params.frequency_ceiling_hz
    }

    pub fn lut(&self) -> &Arc<ColorLut> {
        &self.lut
    }

    /// Tiles of the last published render (empty before the first generate).
    pub fn tiles(&self) -> &[Tile] {
        self.tiles.front()
    }

    /// A generate request for a new recording.
    ///
    /// Analysis settings come from the config; gain and colormap carry over
    /// from the current render parameters, so a user's choices survive a file
    /// change. The frequency ceiling always resets to the new Nyquist.
    pub fn request_for(&self, samples: impl Into<Arc<AudioSamples>>) -> GenerateRequest {
        GenerateRequest {
            colormap: self.params.colormap.clone(),
            gain: self.params.gain,
            ..GenerateRequest::new(samples, &self.config)
        }
    }

    /// Start a generate request. Every in-flight job becomes stale.
    pub fn prepare_generate(&mut self, request: GenerateRequest) -> Result<GenerateJob<K>> {
        let mut stft = StftParams::new(request.fft_size, request.overlap_factor)?;
        stft.frames_per_yield = self.config.frames_per_yield;
        stft.dynamic_range_db = self.config.dynamic_range_db;
        if !(request.pixels_per_frame.is_finite() && request.pixels_per_frame > 0.0) {
            return Err(SpectrogramError::InvalidParameter(format!(
                "pixels per frame must be positive, got {}",
                request.pixels_per_frame
            )));
        }
        if !(request.gain.is_finite() && request.gain > 0.0) {
            return Err(SpectrogramError::InvalidParameter(format!(
                "gain must be positive, got {}",
                request.gain
            )));
        }

        let token = self.generate_tokens.issue();
        self.render_tokens.issue();
        let fallback = if self.session.is_some() { RenderPhase::Ready } else { RenderPhase::Idle };
        self.phase.set(RenderPhase::Transforming);
        log::debug!(
            "generate #{}: {} samples @ {} Hz, fft {} hop {}",
            token.id(),
            request.samples.len(),
            request.samples.sample_rate,
            stft.fft_size,
            stft.hop
        );

        Ok(GenerateJob {
            token,
            params: RenderParameters {
                gain: request.gain,
                colormap: request.colormap,
                frequency_ceiling_hz: request.samples.nyquist(),
            },
            samples: request.samples,
            stft,
            pixels_per_frame: request.pixels_per_frame,
            config: self.config.clone(),
            kernel: self.kernel.clone(),
            recycled: self.tiles.take_spare(),
            spare_matrix: self.spare_matrix.take(),
            phase: self.phase.clone(),
            fallback,
        })
    }

    /// Publish a finished generate job, unless a newer request superseded it.
    pub fn complete_generate<L: RenderListener>(
        &mut self,
        rendered: GeneratedRender,
        listener: &mut L,
    ) -> Result<GenerateSummary> {
        let id = rendered.token.id();
        if !rendered.token.is_current() {
            log::warn!("dropping stale generate #{id}");
            self.tiles.recycle(rendered.tiles);
            return Err(SpectrogramError::Superseded { token: id });
        }

        let session = rendered.session;
        let summary = GenerateSummary {
            token: id,
            matrix: Arc::clone(&session.matrix),
            dynamic_range: session.range,
            mapping: session.mapping,
            image_width: session.mapping.image_width_px,
            image_height: session.mapping.image_height_px,
            default_frequency_ceiling_hz: session.samples.nyquist(),
        };
        log::info!(
            "published #{id}: {} frames x {} bins, {}x{} px in {} tiles",
            session.matrix.num_frames,
            session.matrix.bins,
            summary.image_width,
            summary.image_height,
            rendered.tiles.len()
        );
        if let Some(old) = self.session.replace(session) {
            self.spare_matrix = Arc::try_unwrap(old.matrix).ok();
        }
        self.params = rendered.params;
        self.lut = rendered.lut;
        self.tiles.publish(rendered.tiles);
        self.phase.set(RenderPhase::Ready);
        listener.on_event(RenderEvent::PhaseChanged { token: id, phase: RenderPhase::Ready });
        listener.on_event(RenderEvent::Published { token: id });
        Ok(summary)
    }

    /// Start a re-rasterization from the cached matrix.
    ///
    /// Returns `None` before the first successful generate; the cached (empty)
    /// tiles stay served. Out-of-range gain or ceiling is clamped, never rejected.
    pub fn prepare_rerender(&mut self, params: RenderParameters) -> Option<RasterJob> {
        let Some(session) = &self.session else {
            self.params = params;
            return None;
        };
        let params = params.sanitized(session.matrix.nyquist());
        if Palette::from_name(&params.colormap) != self.lut.palette() {
            self.lut = Arc::new(build_lut(&params.colormap));
        }
        self.params = params.clone();

        let token = self.render_tokens.issue();
        if self.phase.get() == RenderPhase::Ready {
            self.phase.set(RenderPhase::Rasterizing);
        }
        log::debug!(
            "rerender #{}: gain {} colormap {} ceiling {:.0} Hz",
            token.id(),
            params.gain,
            self.lut.palette().name(),
            params.frequency_ceiling_hz
        );
        Some(RasterJob {
            token,
            generation: session.generation,
            matrix: Arc::clone(&session.matrix),
            range: session.range,
            lut: Arc::clone(&self.lut),
            mapping: session.mapping.with_ceiling(params.frequency_ceiling_hz),
            params,
            pixels_per_frame: session.pixels_per_frame,
            max_tile_width: self.config.max_tile_width,
            tiles_per_yield: self.config.tiles_per_yield,
            recycled: self.tiles.take_spare(),
        })
    }

    /// Publish a finished rerender job, unless it is stale or its session was replaced.
    pub fn complete_rerender<L: RenderListener>(
        &mut self,
        rendered: RenderedTiles,
        listener: &mut L,
    ) -> Result<&[Tile]> {
        let id = rendered.token.id();
        let same_session = self.session.as_ref().map(|s| s.generation) == Some(rendered.generation);
        let Some(session) = self.session.as_mut().filter(|_| same_session && rendered.token.is_current())
        else {
            log::warn!("dropping stale rerender #{id}");
            self.tiles.recycle(rendered.tiles);
            return Err(SpectrogramError::Superseded { token: id });
        };
        session.mapping = rendered.mapping;
        self.params = rendered.params;
        self.tiles.publish(rendered.tiles);
        if self.phase.get() == RenderPhase::Rasterizing {
            self.phase.set(RenderPhase::Ready);
            listener.on_event(RenderEvent::PhaseChanged { token: id, phase: RenderPhase::Ready });
        }
        listener.on_event(RenderEvent::Published { token: id });
        Ok(self.tiles.front())
    }

    /// Analyze and fully rasterize a recording, publishing the result.
    pub async fn generate<Y, L>(
        &mut self,
        request: GenerateRequest,
        yielder: &mut Y,
        listener: &mut L,
    ) -> Result<GenerateSummary>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        let job = self.prepare_generate(request)?;
        let rendered = job.run(yielder, listener).await?;
        self.complete_generate(rendered, listener)
    }

    /// Decode a container with `decoder`, down-mix, then [`generate`](Self::generate)
    /// with the configured analysis settings.
    pub async fn generate_from_bytes<D, Y, L>(
        &mut self,
        decoder: &D,
        bytes: &[u8],
        yielder: &mut Y,
        listener: &mut L,
    ) -> Result<GenerateSummary>
    where
        D: AudioDecoder,
        Y: YieldPoint,
        L: RenderListener,
    {
        let previous = self.phase.get();
        self.phase.set(RenderPhase::Decoding);
        let decoded = match decoder.decode(bytes) {
            Ok(d) => d,
            Err(e) => {
                self.phase.set(previous);
                return Err(e.into());
            }
        };
        let samples = match AudioSamples::from_decoded(decoded) {
            Ok(s) => s,
            Err(e) => {
                self.phase.set(previous);
                return Err(e);
            }
        };
        let request = self.request_for(samples);
        self.generate(request, yielder, listener).await
    }

    /// Re-rasterize the cached matrix with new cosmetic parameters.
    ///
    /// Before any successful generate this is a no-op returning the (empty) cached tiles.
    pub async fn rerender<Y, L>(
        &mut self,
        params: RenderParameters,
        yielder: &mut Y,
        listener: &mut L,
    ) -> Result<&[Tile]>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        let Some(job) = self.prepare_rerender(params) else {
            return Ok(self.tiles.front());
        };
        let rendered = job.run(yielder, listener).await?;
        self.complete_rerender(rendered, listener)
    }

    /// Decide what `settings` costs relative to the published render.
    pub fn plan(&self, settings: &ViewSettings) -> RenderPlan {
        let Some(session) = &self.session else {
            return RenderPlan::Nothing;
        };
        let hop = if settings.overlap_factor == 0 { 0 } else { settings.fft_size / settings.overlap_factor };
        if settings.fft_size != session.matrix.fft_size
            || hop != session.matrix.hop
            || settings.pixels_per_frame != session.pixels_per_frame
        {
            return RenderPlan::Transform;
        }
        let requested = settings.params.sanitized(session.matrix.nyquist());
        if requested != self.params {
            RenderPlan::Rasterize
        } else {
            RenderPlan::Nothing
        }
    }

    /// Bring the published render in line with `settings`, doing the least work possible.
    ///
    /// A re-transform keeps the recording. When it lands on Nyquist but the
    /// requested ceiling is lower, an interpolated pass follows.
    pub async fn update<Y, L>(
        &mut self,
        settings: ViewSettings,
        yielder: &mut Y,
        listener: &mut L,
    ) -> Result<RenderPlan>
    where
        Y: YieldPoint,
        L: RenderListener,
    {
        let plan = self.plan(&settings);
        match plan {
            RenderPlan::Nothing => {}
            RenderPlan::Rasterize => {
                self.rerender(settings.params, yielder, listener).await?;
            }
            RenderPlan::Transform => {
                let Some(samples) = self.session.as_ref().map(|s| Arc::clone(&s.samples)) else {
                    return Ok(RenderPlan::Nothing);
                };
                let request = GenerateRequest {
                    samples,
                    fft_size: settings.fft_size,
                    overlap_factor: settings.overlap_factor,
                    pixels_per_frame: settings.pixels_per_frame,
                    colormap: settings.params.colormap.clone(),
                    gain: settings.params.gain,
                };
                let summary = self.generate(request, yielder, listener).await?;
                if settings.params.frequency_ceiling_hz < summary.default_frequency_ceiling_hz {
                    self.rerender(settings.params, yielder, listener).await?;
                }
            }
        }
        Ok(plan)
    }
}
