//! # anomap colormap
//!
//! Colour mapping and raster-to-RGB rendering for anomap.
//!
//! Anomaly images use [`ColorScheme::Jet`] by default; [`ColorScheme::Hot`],
//! [`ColorScheme::Grayscale`] and [`ColorScheme::Water`] are also available.
//! The main entry point is [`raster_to_rgb`], which turns a `Raster<T>` into
//! an interleaved RGB buffer ready for PNG encoding.
//!
//! ## Usage
//!
//! ```ignore
//! use anomap_colormap::{ColorScheme, ColormapParams, raster_to_rgb};
//!
//! let params = ColormapParams::new(ColorScheme::Jet);
//! let rgb = raster_to_rgb(&stretched, &params);
//! ```

mod render;
mod scheme;

pub use render::{raster_to_rgb, ColormapParams};
pub use scheme::{evaluate, ColorScheme, ColorStop, Rgb};
