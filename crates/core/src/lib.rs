//! # anomap core
//!
//! Core types, traits and I/O for the anomap hyperspectral anomaly toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced 2D grid
//! - `SpectralCube`: Immutable (rows, cols, bands) reflectance cube with
//!   wavelength metadata and a no-data sentinel
//! - `GeoTransform` / `CRS`: Georeferencing carried through to outputs
//! - Algorithm trait for a consistent API
//! - I/O for ENVI header/raw pairs, single-band GeoTIFF and PNG

pub mod crs;
pub mod cube;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use cube::{SpectralCube, DEFAULT_NODATA};
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::cube::SpectralCube;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in anomap.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
