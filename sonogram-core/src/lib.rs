//! Spectrogram computation and rendering engine.
//!
//! Decoded audio goes through the STFT analyzer once per (file, FFT size, hop)
//! and the resulting magnitude matrix is cached. Cosmetic changes (gain,
//! colormap, frequency ceiling) only re-enter the tile rasterizer.
//!
//! ```text
//! samples ─► dsp::stft ─► MagnitudeMatrix ─► canvas::tile_rasterizer ─► tiles
//!                 │                               ▲         ▲
//!            dsp::fft                    canvas::colors  canvas::axis
//! ```
//!
//! [`session::RenderOrchestrator`] owns the published state and serializes
//! requests with monotonically increasing tokens.

pub mod audio;
pub mod canvas;
pub mod config;
pub mod dsp;
pub mod error;
pub mod listener;
pub mod session;
pub mod types;
pub mod yield_point;

pub use audio::decode::{AudioDecoder, DecodedAudio, WavDecoder};
pub use canvas::axis::{AxisMapping, AxisTick};
pub use canvas::colors::{build_lut, ColorLut, Palette};
pub use config::SpectrogramConfig;
pub use dsp::fft::{fft_in_place, Radix2Fft, TransformKernel};
pub use error::{DecodeError, Result, SpectrogramError};
pub use listener::{NoopListener, RenderEvent, RenderListener};
pub use session::{GenerateRequest, GenerateSummary, RenderOrchestrator, RenderPhase};
pub use types::{AudioSamples, DynamicRange, MagnitudeMatrix, RenderParameters, Tile};
pub use yield_point::{Immediate, RequestToken, YieldPoint};
