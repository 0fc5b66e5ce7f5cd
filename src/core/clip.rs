use crate::types::{
    BandSample, FieldError, FieldResult, GeoTransform, ProjectedGeometry, RasterBand, BAND_NODATA,
};
use ndarray::{s, Array2};

/// Fraction of a pixel trimmed from each side before edge tests, so that
/// pixels which only share an edge or corner with the mask are not "touched"
const EDGE_EPSILON: f64 = 1e-9;

/// Pixel window `[row_start, row_end) x [col_start, col_end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl PixelWindow {
    pub fn height(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start
    }
}

/// Crops and masks bands to a field boundary with all-touched semantics
pub struct RasterClipper;

impl RasterClipper {
    /// Crop `band` to the mask bounds and set untouched pixels to nodata.
    ///
    /// Pixels equal to the source nodata value are also set to nodata, so
    /// the output carries a single nodata value, `BAND_NODATA`.
    pub fn clip(
        band: &RasterBand<BandSample>,
        mask: &ProjectedGeometry,
    ) -> FieldResult<RasterBand<BandSample>> {
        if !band.transform.is_north_up() {
            return Err(FieldError::Processing(format!(
                "Rotated geotransforms are not supported: {:?}",
                band.transform
            )));
        }
        if mask.len() < 4 {
            return Err(FieldError::InvalidInput(format!(
                "Mask ring needs at least 4 vertices, got {}",
                mask.len()
            )));
        }

        let window = Self::window(&band.transform, band.shape(), mask)?;
        log::debug!(
            "Clip window rows {}..{}, cols {}..{} of {:?}",
            window.row_start,
            window.row_end,
            window.col_start,
            window.col_end,
            band.shape()
        );

        let cropped = band.data.slice(s![
            window.row_start..window.row_end,
            window.col_start..window.col_end
        ]);
        let (x0, y0) = band
            .transform
            .pixel_to_geo(window.col_start as f64, window.row_start as f64);
        let transform = GeoTransform {
            top_left_x: x0,
            top_left_y: y0,
            ..band.transform
        };

        let mut data = Array2::from_elem((window.height(), window.width()), BAND_NODATA);
        let mut kept = 0usize;
        for ((row, col), out) in data.indexed_iter_mut() {
            if !Self::pixel_touched(&transform, row, col, mask) {
                continue;
            }
            let value = cropped[[row, col]];
            if band.nodata == Some(value) {
                continue;
            }
            *out = value;
            kept += 1;
        }

        log::info!(
            "Clipped band to {}x{} pixels ({} inside field)",
            window.height(),
            window.width(),
            kept
        );

        Ok(RasterBand {
            data,
            transform,
            epsg: band.epsg,
            nodata: Some(BAND_NODATA),
        })
    }

    /// Pixel window covering the mask bounds, clamped to the raster
    pub fn window(
        transform: &GeoTransform,
        shape: (usize, usize),
        mask: &ProjectedGeometry,
    ) -> FieldResult<PixelWindow> {
        let (height, width) = shape;
        let (min_x, min_y, max_x, max_y) = mask.bounds();

        // pixel_height is negative for north-up rasters, so order the row bounds
        let col_a = (min_x - transform.top_left_x) / transform.pixel_width;
        let col_b = (max_x - transform.top_left_x) / transform.pixel_width;
        let row_a = (max_y - transform.top_left_y) / transform.pixel_height;
        let row_b = (min_y - transform.top_left_y) / transform.pixel_height;

        let clamp = |v: f64, upper: usize| -> usize { v.max(0.0).min(upper as f64) as usize };

        let col_start = clamp(col_a.min(col_b).floor(), width);
        let col_end = clamp(col_a.max(col_b).ceil(), width);
        let row_start = clamp(row_a.min(row_b).floor(), height);
        let row_end = clamp(row_a.max(row_b).ceil(), height);

        if col_end <= col_start || row_end <= row_start {
            return Err(FieldError::EmptyIntersection(format!(
                "mask bounds ({:.2}, {:.2}, {:.2}, {:.2}) fall outside the {}x{} raster",
                min_x, min_y, max_x, max_y, height, width
            )));
        }

        Ok(PixelWindow {
            row_start,
            row_end,
            col_start,
            col_end,
        })
    }

    /// All-touched test: the pixel centre lies inside the mask, or a mask
    /// edge crosses the pixel interior
    fn pixel_touched(transform: &GeoTransform, row: usize, col: usize, mask: &ProjectedGeometry) -> bool {
        let (cx, cy) = transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
        if mask.contains(cx, cy) {
            return true;
        }

        let (ax, ay) = transform.pixel_to_geo(col as f64 + EDGE_EPSILON, row as f64 + EDGE_EPSILON);
        let (bx, by) = transform.pixel_to_geo(
            col as f64 + 1.0 - EDGE_EPSILON,
            row as f64 + 1.0 - EDGE_EPSILON,
        );
        let rect = (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by));

        mask.vertices
            .windows(2)
            .any(|edge| segment_intersects_rect(edge[0], edge[1], rect))
    }
}

/// Liang-Barsky clip of segment `p`-`q` against `(min_x, min_y, max_x, max_y)`
fn segment_intersects_rect(p: (f64, f64), q: (f64, f64), rect: (f64, f64, f64, f64)) -> bool {
    let (min_x, min_y, max_x, max_y) = rect;
    let dx = q.0 - p.0;
    let dy = q.1 - p.1;

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let checks = [
        (-dx, p.0 - min_x),
        (dx, max_x - p.0),
        (-dy, p.1 - min_y),
        (dy, max_y - p.1),
    ];

    for (p_i, q_i) in checks {
        if p_i == 0.0 {
            if q_i < 0.0 {
                return false;
            }
            continue;
        }
        let t = q_i / p_i;
        if p_i < 0.0 {
            if t > t1 {
                return false;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return false;
            }
            t1 = t1.min(t);
        }
    }
    t0 <= t1
}
