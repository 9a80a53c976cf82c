use sonogram_core::AxisMapping;
use web_sys::CanvasRenderingContext2d;

use super::TIME_AXIS_HEIGHT_PX;

/// Keep major time labels at least this far apart.
const TIME_LABEL_SPACING_PX: f64 = 100.0;
const FREQ_LABEL_SPACING_PX: f64 = 40.0;
const MAJOR_TICK_PX: f64 = 6.0;
const MINOR_TICK_PX: f64 = 3.0;

/// Draw the frequency gutter on the left and the time strip along the bottom.
pub fn draw_axes(ctx: &CanvasRenderingContext2d, mapping: &AxisMapping) {
    let gutter = mapping.axis_gutter_px as f64;
    let image_w = mapping.image_width_px as f64;
    let image_h = mapping.image_height_px as f64;
    let strip_h = TIME_AXIS_HEIGHT_PX as f64;

    ctx.set_fill_style_str("#111");
    ctx.fill_rect(0.0, 0.0, gutter, image_h + strip_h);
    ctx.fill_rect(gutter, image_h, image_w, strip_h);

    draw_frequency_axis(ctx, mapping, gutter);
    draw_time_axis(ctx, mapping, gutter, image_h);
}

fn draw_frequency_axis(ctx: &CanvasRenderingContext2d, mapping: &AxisMapping, gutter: f64) {
    ctx.set_font("11px sans-serif");
    ctx.set_text_align("right");
    ctx.set_text_baseline("middle");
    ctx.set_line_width(1.0);
    for tick in mapping.frequency_ticks(FREQ_LABEL_SPACING_PX) {
        let y = tick.position_px.round() + 0.5;
        ctx.set_stroke_style_str("rgba(255,255,255,0.6)");
        ctx.begin_path();
        ctx.move_to(gutter - MAJOR_TICK_PX, y);
        ctx.line_to(gutter, y);
        ctx.stroke();
        if let Some(label) = &tick.label {
            ctx.set_fill_style_str("rgba(255,255,255,0.8)");
            let _ = ctx.fill_text(label, gutter - MAJOR_TICK_PX - 2.0, y);
        }
    }
}

fn draw_time_axis(ctx: &CanvasRenderingContext2d, mapping: &AxisMapping, gutter: f64, top: f64) {
    let ticks = mapping.time_ticks(0.0, mapping.duration_secs(), TIME_LABEL_SPACING_PX);
    ctx.set_font("11px sans-serif");
    ctx.set_text_align("left");
    ctx.set_text_baseline("top");
    ctx.set_line_width(1.0);
    for tick in ticks {
        let x = gutter + tick.position_px.round() + 0.5;
        match &tick.label {
            Some(label) => {
                ctx.set_stroke_style_str("rgba(255,255,255,0.6)");
                ctx.begin_path();
                ctx.move_to(x, top);
                ctx.line_to(x, top + MAJOR_TICK_PX);
                ctx.stroke();
                ctx.set_fill_style_str("rgba(255,255,255,0.8)");
                let _ = ctx.fill_text(label, x + 2.0, top + MAJOR_TICK_PX);
            }
            None => {
                ctx.set_stroke_style_str("rgba(255,255,255,0.25)");
                ctx.begin_path();
                ctx.move_to(x, top);
                ctx.line_to(x, top + MINOR_TICK_PX);
                ctx.stroke();
            }
        }
    }
}
