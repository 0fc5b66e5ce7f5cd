use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Raw spectral band sample (Sentinel-2 L2A surface reflectance, scaled)
pub type BandSample = u16;

/// Index raster sample
pub type IndexSample = f32;

/// Reserved nodata value for clipped spectral bands
pub const BAND_NODATA: BandSample = u16::MAX;

/// Nodata value written into index rasters
pub const INDEX_NODATA: IndexSample = -9999.0;

/// Field boundary in geographic coordinates (longitude, latitude)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGeometry {
    vertices: Vec<(f64, f64)>,
}

impl FieldGeometry {
    /// Build a closed ring from `[lon, lat]` vertices.
    ///
    /// An open ring is closed by repeating the first vertex. The closed ring
    /// must have at least four vertices.
    pub fn new(coords: &[[f64; 2]]) -> FieldResult<Self> {
        let mut vertices: Vec<(f64, f64)> = coords.iter().map(|c| (c[0], c[1])).collect();

        for (i, &(lon, lat)) in vertices.iter().enumerate() {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(FieldError::InvalidInput(format!(
                    "Vertex {} is not finite: ({}, {})", i, lon, lat
                )));
            }
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(FieldError::InvalidInput(format!(
                    "Vertex {} is outside geographic range: ({}, {})", i, lon, lat
                )));
            }
        }

        if let (Some(&first), Some(&last)) = (vertices.first(), vertices.last()) {
            if first != last {
                vertices.push(first);
            }
        }

        if vertices.len() < 4 {
            return Err(FieldError::InvalidInput(format!(
                "Field boundary needs at least 4 vertices in a closed ring, got {}",
                vertices.len()
            )));
        }

        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Bounding box as `[min_lon, min_lat, max_lon, max_lat]`
    pub fn bbox(&self) -> [f64; 4] {
        let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for &(lon, lat) in &self.vertices {
            bbox[0] = bbox[0].min(lon);
            bbox[1] = bbox[1].min(lat);
            bbox[2] = bbox[2].max(lon);
            bbox[3] = bbox[3].max(lat);
        }
        bbox
    }
}

/// Field boundary reprojected into a scene's projected CRS
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGeometry {
    pub epsg: u32,
    pub vertices: Vec<(f64, f64)>,
}

impl ProjectedGeometry {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Bounds as `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.vertices.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }

    /// Even-odd point-in-polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Geospatial transformation parameters (GDAL affine order)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_array(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Map a (column, row) pixel coordinate to georeferenced (x, y)
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Component-wise comparison with a relative tolerance
    pub fn approx_eq(&self, other: &GeoTransform, rel_tol: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= rel_tol * a.abs().max(b.abs()).max(1.0))
    }
}

/// A single-band raster grid with its spatial metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBand<T> {
    /// Pixel grid, indexed `[row, col]`
    pub data: Array2<T>,
    pub transform: GeoTransform,
    /// EPSG code of the raster CRS, when known
    pub epsg: Option<u32>,
    pub nodata: Option<T>,
}

impl<T> RasterBand<T> {
    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Same grid shape and (approximately) the same transform
    pub fn is_comparable<U>(&self, other: &RasterBand<U>) -> bool {
        self.shape() == other.shape() && self.transform.approx_eq(&other.transform, 1e-9)
    }
}

/// The scene chosen from a catalog search
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    pub id: String,
    pub epsg: u32,
    pub utm_zone: String,
    pub acquired: DateTime<Utc>,
    /// Band name to asset href
    pub assets: BTreeMap<String, String>,
}

impl SceneDescriptor {
    /// Acquisition date formatted as `YYYY-MM-DD`
    pub fn acquisition_date(&self) -> String {
        self.acquired.format("%Y-%m-%d").to_string()
    }

    pub fn crs_identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    pub fn asset(&self, band: &str) -> FieldResult<BandAsset> {
        self.assets
            .get(band)
            .map(|href| BandAsset {
                band: band.to_string(),
                href: href.clone(),
            })
            .ok_or_else(|| {
                FieldError::Fetch(format!("Scene {} has no asset for band '{}'", self.id, band))
            })
    }
}

/// Location of one band's raster asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandAsset {
    pub band: String,
    pub href: String,
}

/// Supported normalized-difference indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndexFormula {
    /// Normalized Difference Vegetation Index: (nir - red) / (nir + red)
    Ndvi,
    /// Normalized Difference Moisture Index: (swir16 - nir08) / (swir16 + nir08)
    Ndmi,
}

impl IndexFormula {
    pub const ALL: [IndexFormula; 2] = [IndexFormula::Ndvi, IndexFormula::Ndmi];

    pub fn name(&self) -> &'static str {
        match self {
            IndexFormula::Ndvi => "NDVI",
            IndexFormula::Ndmi => "NDMI",
        }
    }

    /// Required bands `(A, B)` for `(B - A) / (B + A)`
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            IndexFormula::Ndvi => ("red", "nir"),
            IndexFormula::Ndmi => ("nir08", "swir16"),
        }
    }
}

impl std::fmt::Display for IndexFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IndexFormula {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NDVI" => Ok(IndexFormula::Ndvi),
            "NDMI" => Ok(IndexFormula::Ndmi),
            other => Err(FieldError::InvalidInput(format!("Unknown index formula: {}", other))),
        }
    }
}

impl TryFrom<String> for IndexFormula {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IndexFormula> for String {
    fn from(formula: IndexFormula) -> Self {
        formula.name().to_string()
    }
}

/// Index raster ready for storage
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    pub key: String,
    pub raster: RasterBand<IndexSample>,
}

/// Error types for field index processing
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("No scenes found: {0}")]
    NoDataFound(String),

    #[error("Coordinate system error: {0}")]
    CoordinateSystem(String),

    #[error("Band fetch failed: {0}")]
    Fetch(String),

    #[error("Field does not intersect raster: {0}")]
    EmptyIntersection(String),

    #[error("Bands are not comparable: {0}")]
    IncomparableBands(String),

    #[error("Malformed catalog response: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Catalog search failed: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl FieldError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, FieldError::NoDataFound(_))
    }
}

/// Result type for field index operations
pub type FieldResult<T> = Result<T, FieldError>;
