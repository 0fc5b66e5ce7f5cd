use crate::types::{FieldError, FieldResult, IndexSample, RasterBand};
use ndarray::{Array2, Zip};
use num_traits::AsPrimitive;

/// Normalized-difference index computation
pub struct IndexComputer;

impl IndexComputer {
    /// `(B - A) / (B + A)` for two comparable bands.
    ///
    /// Output pixels are `nodata` where either input is nodata or where
    /// `A + B == 0`. Values are computed in `f64` and stored as `f32`.
    pub fn normalized_difference<T>(
        band_a: &RasterBand<T>,
        band_b: &RasterBand<T>,
        nodata: IndexSample,
    ) -> FieldResult<RasterBand<IndexSample>>
    where
        T: Copy + PartialEq + Send + Sync + AsPrimitive<f64>,
    {
        if !band_a.is_comparable(band_b) {
            return Err(FieldError::IncomparableBands(format!(
                "shape {:?} with transform {:?} vs shape {:?} with transform {:?}",
                band_a.shape(),
                band_a.transform.to_array(),
                band_b.shape(),
                band_b.transform.to_array()
            )));
        }

        let nodata_a = band_a.nodata;
        let nodata_b = band_b.nodata;
        let pixel = move |&a: &T, &b: &T| -> IndexSample {
            if nodata_a == Some(a) || nodata_b == Some(b) {
                return nodata;
            }
            normalized_difference_value(a.as_(), b.as_()).unwrap_or(nodata)
        };

        let data = Self::map_pixels(&band_a.data, &band_b.data, pixel);

        log::debug!(
            "Computed normalized difference over {}x{} pixels",
            data.nrows(),
            data.ncols()
        );

        Ok(RasterBand {
            data,
            transform: band_a.transform,
            epsg: band_a.epsg.or(band_b.epsg),
            nodata: Some(nodata),
        })
    }

    #[cfg(feature = "parallel")]
    fn map_pixels<T, F>(a: &Array2<T>, b: &Array2<T>, pixel: F) -> Array2<IndexSample>
    where
        T: Copy + Send + Sync,
        F: Fn(&T, &T) -> IndexSample + Send + Sync,
    {
        Zip::from(a).and(b).par_map_collect(|a, b| pixel(a, b))
    }

    #[cfg(not(feature = "parallel"))]
    fn map_pixels<T, F>(a: &Array2<T>, b: &Array2<T>, pixel: F) -> Array2<IndexSample>
    where
        T: Copy,
        F: Fn(&T, &T) -> IndexSample,
    {
        Zip::from(a).and(b).map_collect(|a, b| pixel(a, b))
    }
}

/// `(b - a) / (b + a)`, or `None` when the denominator is zero
pub fn normalized_difference_value(a: f64, b: f64) -> Option<IndexSample> {
    let sum = b + a;
    if sum == 0.0 {
        return None;
    }
    Some(((b - a) / sum) as IndexSample)
}
