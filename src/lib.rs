//! Browser bridge for `sonogram-core`.
//!
//! Exposes [`view::SpectrogramView`] to JavaScript. The view owns the
//! orchestrator, paints published tiles onto a canvas and draws the axes.
//! Long passes yield to the event loop through [`browser_yield::BrowserYield`].

use sonogram_core::{Palette, SpectrogramConfig};
use wasm_bindgen::prelude::*;

mod browser_yield;
pub mod canvas;
pub mod view;

pub use view::SpectrogramView;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        // Logger already installed by an earlier module instance.
        return;
    }
    log::info!("sonogram {} ready", env!("CARGO_PKG_VERSION"));
}

/// Names accepted by the `colormap` argument of `rerender`.
#[wasm_bindgen(js_name = colormapNames)]
pub fn colormap_names() -> js_sys::Array {
    Palette::ALL
        .iter()
        .map(|p| JsValue::from_str(p.name()))
        .collect()
}

/// Parse a JSON config object; missing fields and an empty string take defaults.
pub fn parse_config(json: &str) -> Result<SpectrogramConfig, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(SpectrogramConfig::default());
    }
    serde_json::from_str(json)
}
