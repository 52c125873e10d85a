//! I/O for hyperspectral cubes and derived rasters

mod envi;
mod geotiff;
mod png;

pub use envi::{
    companion_data_path, parse_envi_header, read_envi, read_envi_header, write_envi,
    EnviDataType, EnviHeader, Interleave,
};
pub use geotiff::{read_geotiff, write_geotiff};
pub use png::write_png_rgb;
