pub mod axis_renderer;
pub mod tile_painter;

/// Height of the time-axis strip below the image, in CSS pixels.
pub const TIME_AXIS_HEIGHT_PX: u32 = 20;
