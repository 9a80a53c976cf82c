pub mod axis;
pub mod colors;
pub mod tile_rasterizer;
