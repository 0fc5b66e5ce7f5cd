use crate::types::{FieldError, FieldGeometry, FieldResult, ProjectedGeometry};
use gdal::spatial_ref::{CoordTransform, SpatialRef};

/// EPSG code of the geographic CRS field boundaries are given in
pub const GEOGRAPHIC_EPSG: u32 = 4326;

/// Parse `EPSG:n`, `epsg:n` or a bare code
pub fn parse_epsg(identifier: &str) -> FieldResult<u32> {
    let trimmed = identifier.trim();
    let code = match trimmed.split_once(':') {
        Some((authority, code)) if authority.eq_ignore_ascii_case("EPSG") => code,
        Some(_) => {
            return Err(FieldError::CoordinateSystem(format!(
                "Unsupported coordinate system authority: '{}'",
                identifier
            )))
        }
        None => trimmed,
    };
    code.trim().parse::<u32>().map_err(|_| {
        FieldError::CoordinateSystem(format!("Malformed coordinate system identifier: '{}'", identifier))
    })
}

/// Spatial reference with x = longitude/easting, y = latitude/northing
fn traditional_order_srs(epsg: u32) -> FieldResult<SpatialRef> {
    let mut srs = SpatialRef::from_epsg(epsg).map_err(|e| {
        FieldError::CoordinateSystem(format!("Unknown coordinate system EPSG:{}: {}", epsg, e))
    })?;
    // GDAL 3 otherwise honours the authority axis order (lat, lon for EPSG:4326)
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

/// Reprojects field boundaries from geographic coordinates into a scene CRS
pub struct GeometryReprojector {
    target_epsg: u32,
    transform: CoordTransform,
}

impl GeometryReprojector {
    /// Resolve the target CRS from an identifier such as `EPSG:32633`
    pub fn new(target: &str) -> FieldResult<Self> {
        let target_epsg = parse_epsg(target)?;
        let source_srs = traditional_order_srs(GEOGRAPHIC_EPSG)?;
        let target_srs = traditional_order_srs(target_epsg)?;

        let transform = CoordTransform::new(&source_srs, &target_srs).map_err(|e| {
            FieldError::CoordinateSystem(format!(
                "Cannot transform EPSG:{} to EPSG:{}: {}",
                GEOGRAPHIC_EPSG, target_epsg, e
            ))
        })?;

        log::debug!("Reprojector ready: EPSG:{} -> EPSG:{}", GEOGRAPHIC_EPSG, target_epsg);
        Ok(Self {
            target_epsg,
            transform,
        })
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Transform every vertex, preserving order and count
    pub fn reproject(&self, field: &FieldGeometry) -> FieldResult<ProjectedGeometry> {
        let mut xs: Vec<f64> = field.vertices().iter().map(|&(lon, _)| lon).collect();
        let mut ys: Vec<f64> = field.vertices().iter().map(|&(_, lat)| lat).collect();
        let mut zs = vec![0.0; xs.len()];

        self.transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| {
                FieldError::CoordinateSystem(format!(
                    "Failed to transform field into EPSG:{}: {}",
                    self.target_epsg, e
                ))
            })?;

        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(FieldError::CoordinateSystem(format!(
                "Field boundary has no finite representation in EPSG:{}",
                self.target_epsg
            )));
        }

        let vertices: Vec<(f64, f64)> = xs.into_iter().zip(ys).collect();
        log::debug!(
            "Reprojected {} vertices into EPSG:{}",
            vertices.len(),
            self.target_epsg
        );

        Ok(ProjectedGeometry {
            epsg: self.target_epsg,
            vertices,
        })
    }
}
