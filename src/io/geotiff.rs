use crate::types::{FieldError, FieldResult, GeoTransform, RasterBand};
use gdal::raster::{Buffer, GdalType, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use num_traits::{AsPrimitive, NumCast};
use std::path::Path;

/// Read band 1 of a GDAL-readable raster
pub fn read_geotiff<T, P>(path: P) -> FieldResult<RasterBand<T>>
where
    T: GdalType + Copy + NumCast,
    P: AsRef<Path>,
{
    log::debug!("Opening raster: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    if dataset.raster_count() < 1 {
        return Err(FieldError::InvalidInput(format!(
            "Raster {} has no bands",
            path.as_ref().display()
        )));
    }

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value().and_then(|v| <T as NumCast>::from(v));
    let band_data = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;

    let data = Array2::from_shape_vec((height, width), band_data.data)
        .map_err(|e| FieldError::Processing(format!("Failed to reshape raster data: {}", e)))?;

    // Rasters without an authority code keep an unknown CRS
    let epsg = dataset
        .spatial_ref()
        .and_then(|srs| srs.auth_code())
        .ok()
        .and_then(|code| u32::try_from(code).ok());

    log::debug!(
        "Raster {}x{}, epsg {:?}, nodata present: {}",
        width,
        height,
        epsg,
        nodata.is_some()
    );

    Ok(RasterBand {
        data,
        transform: GeoTransform::from_array(geo_transform),
        epsg,
        nodata,
    })
}

/// Write a single-band GeoTIFF
pub fn write_geotiff<T, P>(
    band: &RasterBand<T>,
    output_path: P,
    compression: Option<&str>,
) -> FieldResult<()>
where
    T: GdalType + Copy + AsPrimitive<f64>,
    P: AsRef<Path>,
{
    log::debug!("Writing GeoTIFF: {}", output_path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = band.shape();

    let mut options = Vec::new();
    if let Some(compression_type) = compression {
        options.push(RasterCreationOption {
            key: "COMPRESS",
            value: compression_type,
        });
    }

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    dataset.set_geo_transform(&band.transform.to_array())?;

    if let Some(epsg) = band.epsg {
        dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<T> = band.data.iter().copied().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    if let Some(nodata) = band.nodata {
        rasterband.set_no_data_value(Some(nodata.as_()))?;
    }

    Ok(())
}
