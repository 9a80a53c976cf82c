use sonogram_core::{AxisMapping, Tile};
use wasm_bindgen::{Clamped, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

use super::TIME_AXIS_HEIGHT_PX;

/// Resize the canvas to fit the image plus the axis gutter and time strip.
///
/// Setting the canvas size clears it, so this runs once per published generate.
pub fn fit_canvas(canvas: &HtmlCanvasElement, mapping: &AxisMapping) {
    let width = mapping.axis_gutter_px + mapping.image_width_px as u32;
    let height = mapping.image_height_px as u32 + TIME_AXIS_HEIGHT_PX;
    if canvas.width() != width {
        canvas.set_width(width);
    }
    if canvas.height() != height {
        canvas.set_height(height);
    }
}

/// Blit every tile at its column offset, right of the frequency gutter.
pub fn paint_tiles(
    ctx: &CanvasRenderingContext2d,
    tiles: &[Tile],
    mapping: &AxisMapping,
) -> Result<(), JsValue> {
    let gutter = mapping.axis_gutter_px as f64;
    for tile in tiles {
        if tile.column_count == 0 || tile.height == 0 {
            continue;
        }
        let image = ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(&tile.pixels[..]),
            tile.column_count as u32,
            tile.height as u32,
        )?;
        ctx.put_image_data(&image, gutter + tile.start_column as f64, 0.0)?;
    }
    log::debug!("painted {} tiles", tiles.len());
    Ok(())
}

/// Black out the image area, used when a generate fails before any tiles exist.
pub fn clear(ctx: &CanvasRenderingContext2d, canvas: &HtmlCanvasElement) {
    ctx.set_fill_style_str("#000");
    ctx.fill_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);
}
