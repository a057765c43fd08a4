//! Cell value trait shared by categorical and measurement rasters

use num_traits::{NumCast, Zero};
use std::fmt::{Debug, Display};

/// Trait for types that can be stored in a raster cell.
///
/// Category rasters and cluster labels use integer types, measurements and
/// metric outputs use floats. Floats treat `NaN` as nodata in addition to
/// any explicit sentinel.
pub trait RasterElement:
    Copy + Clone + Debug + Display + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data sentinel for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert an f64 into this type, `None` when it does not fit
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::MIN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    nodata == Some(*self)
                }

                fn is_float() -> bool {
                    false
                }
            }
        )*
    };
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {
        $(
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
                        Some(nd) => (self - nd).abs() <= <$t>::EPSILON * 100.0 * nd.abs().max(1.0),
                        None => false,
                    }
                }

                fn is_float() -> bool {
                    true
                }
            }
        )*
    };
}

impl_raster_element_int!(i8, i16, i32, i64, u8, u16, u32);
impl_raster_element_float!(f32, f64);
