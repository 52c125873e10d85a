//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Covers the sample types an ENVI cube or GeoTIFF band may carry
/// (`u8`, `i16`, `u16`, `i32`, `f32`, `f64`).
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, saturating to `default_nodata` when out of range
    fn from_f64(value: f64) -> Self {
        NumCast::from(value).unwrap_or_else(Self::default_nodata)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.is_some_and(|nd| *self == nd)
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    // Sentinels such as -9999 survive f32 <-> f64 casts exactly,
                    // the tolerance only absorbs rounding in derived rasters.
                    Some(nd) => (self - nd).abs() <= <$t>::EPSILON * 100.0 * nd.abs().max(1.0),
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_int!(u8);
impl_raster_element_int!(i16);
impl_raster_element_int!(u16);
impl_raster_element_int!(i32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_sentinel_matches_after_cast() {
        let v = -9999.0_f32 as f64;
        assert!(v.is_nodata(Some(-9999.0)));
        assert!(!0.5_f64.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(f32::NAN.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn int_nodata_exact() {
        assert!(0_u8.is_nodata(Some(0)));
        assert!(!1_i16.is_nodata(Some(0)));
        assert!(!1_i16.is_nodata(None));
    }

    #[test]
    fn from_f64_out_of_range_is_nodata() {
        assert_eq!(u8::from_f64(300.0), u8::MIN);
        assert_eq!(i16::from_f64(-12.0), -12);
    }
}
