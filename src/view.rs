use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use js_sys::{Array, Float32Array, Promise, Uint8Array};
use serde::Serialize;
use sonogram_core::session::{RenderPlan, ViewSettings};
use sonogram_core::{
    AudioDecoder, AudioSamples, GenerateRequest, GenerateSummary, RenderEvent, RenderOrchestrator,
    RenderParameters, SpectrogramError, WavDecoder,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::browser_yield::BrowserYield;
use crate::canvas::{axis_renderer, tile_painter};

/// What JavaScript receives when a generate publishes.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateInfo {
    token: u64,
    num_frames: usize,
    bins: usize,
    fft_size: usize,
    hop: usize,
    top_db: f32,
    bottom_db: f32,
    image_width: usize,
    image_height: usize,
    pixels_per_second: f64,
    default_frequency_ceiling_hz: f64,
}

impl From<&GenerateSummary> for GenerateInfo {
    fn from(s: &GenerateSummary) -> Self {
        Self {
            token: s.token,
            num_frames: s.matrix.num_frames,
            bins: s.matrix.bins,
            fft_size: s.matrix.fft_size,
            hop: s.matrix.hop,
            top_db: s.dynamic_range.top_db,
            bottom_db: s.dynamic_range.bottom_db,
            image_width: s.image_width,
            image_height: s.image_height,
            pixels_per_second: s.mapping.pixels_per_second(),
            default_frequency_ceiling_hz: s.default_frequency_ceiling_hz,
        }
    }
}

#[derive(Clone)]
struct Surface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

/// A spectrogram bound to one canvas.
///
/// Every long operation returns a `Promise`. The orchestrator is only borrowed
/// between awaits, so a slider can start a rerender while a generate is running;
/// the older pass then resolves to `null` instead of publishing.
#[wasm_bindgen]
pub struct SpectrogramView {
    orchestrator: Rc<RefCell<RenderOrchestrator>>,
    surface: Surface,
}

#[wasm_bindgen]
impl SpectrogramView {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement, config_json: &str) -> Result<SpectrogramView, JsValue> {
        let config = crate::parse_config(config_json).map_err(|e| js_error(&e))?;
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("canvas has no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        log::info!(
            "view: fft {} overlap {} zoom {} px/frame, {} px tall",
            config.fft_size,
            config.overlap_factor,
            config.pixels_per_frame,
            config.image_height
        );
        Ok(SpectrogramView {
            orchestrator: Rc::new(RefCell::new(RenderOrchestrator::new(config))),
            surface: Surface { canvas, ctx },
        })
    }

    /// Analyze decoded PCM, one `Float32Array` per channel, and paint it.
    pub fn generate(&self, channels: Array, sample_rate: u32) -> Result<Promise, JsValue> {
        let channels = channels
            .iter()
            .map(|ch| ch.dyn_into::<Float32Array>().map(|a| a.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        let samples = AudioSamples::from_channels(channels, sample_rate).map_err(|e| js_error(&e))?;
        let request = self.orchestrator.borrow().request_for(samples);
        Ok(self.spawn_generate(request, None))
    }

    /// Decode a WAV file's bytes, then behave like [`generate`](Self::generate).
    #[wasm_bindgen(js_name = generateFromBytes)]
    pub fn generate_from_bytes(&self, bytes: Uint8Array) -> Result<Promise, JsValue> {
        let decoded = WavDecoder.decode(&bytes.to_vec()).map_err(|e| js_error(&e))?;
        let samples = AudioSamples::from_decoded(decoded).map_err(|e| js_error(&e))?;
        let request = self.orchestrator.borrow().request_for(samples);
        Ok(self.spawn_generate(request, None))
    }

    /// Repaint with new cosmetic parameters, reusing the cached analysis.
    pub fn rerender(&self, frequency_ceiling_hz: f64, gain: f32, colormap: String) -> Promise {
        let params = RenderParameters { gain, colormap, frequency_ceiling_hz };
        let orchestrator = Rc::clone(&self.orchestrator);
        let surface = self.surface.clone();
        future_to_promise(async move {
            let published = run_rerender(&orchestrator, &surface, params).await?;
            Ok(JsValue::from_bool(published))
        })
    }

    /// Apply analysis and cosmetic settings together, re-transforming only when needed.
    ///
    /// Resolves to `"nothing"`, `"rasterize"` or `"transform"`.
    pub fn update(
        &self,
        fft_size: usize,
        overlap_factor: usize,
        pixels_per_frame: f64,
        frequency_ceiling_hz: f64,
        gain: f32,
        colormap: String,
    ) -> Result<Promise, JsValue> {
        let settings = ViewSettings {
            fft_size,
            overlap_factor,
            pixels_per_frame,
            params: RenderParameters { gain, colormap, frequency_ceiling_hz },
        };
        let orch = self.orchestrator.borrow();
        let plan = orch.plan(&settings);
        match plan {
            RenderPlan::Nothing => Ok(Promise::resolve(&JsValue::from_str("nothing"))),
            RenderPlan::Rasterize => {
                drop(orch);
                let orchestrator = Rc::clone(&self.orchestrator);
                let surface = self.surface.clone();
                Ok(future_to_promise(async move {
                    run_rerender(&orchestrator, &surface, settings.params).await?;
                    Ok(JsValue::from_str("rasterize"))
                }))
            }
            RenderPlan::Transform => {
                let Some(session) = orch.session() else {
                    return Ok(Promise::resolve(&JsValue::from_str("nothing")));
                };
                let request = GenerateRequest {
                    samples: Arc::clone(&session.samples),
                    fft_size,
                    overlap_factor,
                    pixels_per_frame,
                    colormap: settings.params.colormap.clone(),
                    gain,
                };
                drop(orch);
                Ok(self.spawn_generate(request, Some(settings.params)))
            }
        }
    }

    #[wasm_bindgen(js_name = secondsToPixels)]
    pub fn seconds_to_pixels(&self, t: f64) -> f64 {
        self.orchestrator
            .borrow()
            .mapping()
            .map_or(0.0, |m| m.seconds_to_pixels(t) as f64)
    }

    #[wasm_bindgen(js_name = pixelsToSeconds)]
    pub fn pixels_to_seconds(&self, px: f64) -> f64 {
        self.orchestrator.borrow().mapping().map_or(0.0, |m| m.pixels_to_seconds(px))
    }

    #[wasm_bindgen(js_name = pixelsPerSecond)]
    pub fn pixels_per_second(&self) -> f64 {
        self.orchestrator.borrow().mapping().map_or(0.0, |m| m.pixels_per_second())
    }

    /// Frequency at a canvas row, for cursor readouts.
    #[wasm_bindgen(js_name = rowToHz)]
    pub fn row_to_hz(&self, row: f64) -> f64 {
        self.orchestrator.borrow().mapping().map_or(0.0, |m| m.row_to_hz(row))
    }

    #[wasm_bindgen(js_name = imageWidth)]
    pub fn image_width(&self) -> usize {
        self.orchestrator.borrow().mapping().map_or(0, |m| m.image_width_px)
    }

    #[wasm_bindgen(js_name = imageHeight)]
    pub fn image_height(&self) -> usize {
        self.orchestrator.borrow().mapping().map_or(0, |m| m.image_height_px)
    }

    #[wasm_bindgen(js_name = axisGutter)]
    pub fn axis_gutter(&self) -> u32 {
        self.orchestrator.borrow().config().axis_gutter_px
    }

    #[wasm_bindgen(js_name = frequencyCeiling)]
    pub fn frequency_ceiling(&self) -> f64 {
        self.orchestrator.borrow().frequency_ceiling_hz()
    }

    /// `"idle"`, `"decoding"`, `"transforming"`, `"rasterizing"` or `"ready"`.
    pub fn phase(&self) -> String {
        self.orchestrator.borrow().phase().name().to_owned()
    }
}

impl SpectrogramView {
    /// Run a detached generate; `follow_up` re-applies a ceiling below Nyquist afterwards.
    fn spawn_generate(&self, request: GenerateRequest, follow_up: Option<RenderParameters>) -> Promise {
        let orchestrator = Rc::clone(&self.orchestrator);
        let surface = self.surface.clone();
        future_to_promise(async move {
            let Some(summary) = run_generate(&orchestrator, &surface, request).await? else {
                return Ok(JsValue::NULL);
            };
            if let Some(params) = follow_up {
                if params.frequency_ceiling_hz < summary.default_frequency_ceiling_hz {
                    run_rerender(&orchestrator, &surface, params).await?;
                }
            }
            let json = serde_json::to_string(&GenerateInfo::from(&summary)).map_err(|e| js_error(&e))?;
            js_sys::JSON::parse(&json)
        })
    }
}

fn log_event(event: RenderEvent) {
    log::debug!("{event}");
}

fn js_error(e: &dyn std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

/// `Ok(None)` when a newer request superseded this one.
async fn run_generate(
    orchestrator: &RefCell<RenderOrchestrator>,
    surface: &Surface,
    request: GenerateRequest,
) -> Result<Option<GenerateSummary>, JsValue> {
    let job = orchestrator.borrow_mut().prepare_generate(request).map_err(|e| js_error(&e))?;
    let mut listener = log_event;
    let rendered = match job.run(&mut BrowserYield, &mut listener).await {
        Ok(r) => r,
        Err(SpectrogramError::Superseded { token }) => {
            log::debug!("generate #{token} superseded");
            return Ok(None);
        }
        Err(e) => return Err(js_error(&e)),
    };

    let mut orch = orchestrator.borrow_mut();
    let summary = match orch.complete_generate(rendered, &mut listener) {
        Ok(s) => s,
        Err(SpectrogramError::Superseded { .. }) => return Ok(None),
        Err(e) => return Err(js_error(&e)),
    };
    tile_painter::fit_canvas(&surface.canvas, &summary.mapping);
    tile_painter::clear(&surface.ctx, &surface.canvas);
    tile_painter::paint_tiles(&surface.ctx, orch.tiles(), &summary.mapping)?;
    axis_renderer::draw_axes(&surface.ctx, &summary.mapping);
    Ok(Some(summary))
}

/// `Ok(false)` when nothing was published: no recording yet, or superseded.
async fn run_rerender(
    orchestrator: &RefCell<RenderOrchestrator>,
    surface: &Surface,
    params: RenderParameters,
) -> Result<bool, JsValue> {
    let Some(job) = orchestrator.borrow_mut().prepare_rerender(params) else {
        return Ok(false);
    };
    let mut listener = log_event;
    let rendered = match job.run(&mut BrowserYield, &mut listener).await {
        Ok(r) => r,
        Err(SpectrogramError::Superseded { .. }) => return Ok(false),
        Err(e) => return Err(js_error(&e)),
    };

    let mut orch = orchestrator.borrow_mut();
    match orch.complete_rerender(rendered, &mut listener) {
        Ok(_) => {}
        Err(SpectrogramError::Superseded { .. }) => return Ok(false),
        Err(e) => return Err(js_error(&e)),
    }
    let Some(mapping) = orch.mapping().copied() else {
        return Ok(false);
    };
    tile_painter::paint_tiles(&surface.ctx, orch.tiles(), &mapping)?;
    axis_renderer::draw_axes(&surface.ctx, &mapping);
    Ok(true)
}
