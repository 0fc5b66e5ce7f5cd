use crate::io::geotiff::read_geotiff;
use crate::types::{BandAsset, BandSample, FieldError, FieldResult, RasterBand};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Retrieves one spectral band raster
pub trait BandFetcher {
    fn fetch(&self, asset: &BandAsset) -> FieldResult<RasterBand<BandSample>>;
}

/// Fetches `http(s)` assets into scratch files and opens local assets in place
pub struct AssetBandFetcher {
    client: reqwest::blocking::Client,
    scratch_dir: PathBuf,
}

impl AssetBandFetcher {
    pub fn new<P: AsRef<Path>>(
        scratch_dir: P,
        timeout: std::time::Duration,
        user_agent: &str,
    ) -> FieldResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FieldError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        })
    }

    /// Download to a uniquely named scratch file, removed when this returns
    fn fetch_remote(&self, asset: &BandAsset) -> FieldResult<RasterBand<BandSample>> {
        log::info!("Downloading band '{}' from: {}", asset.band, asset.href);

        let mut response = self
            .client
            .get(&asset.href)
            .send()
            .map_err(|e| FieldError::Fetch(format!("HTTP request failed for {}: {}", asset.href, e)))?;

        if !response.status().is_success() {
            return Err(FieldError::Fetch(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                asset.href
            )));
        }

        std::fs::create_dir_all(&self.scratch_dir)?;
        let mut scratch = tempfile::Builder::new()
            .prefix(&format!("{}_", sanitize(&asset.band)))
            .suffix(".tif")
            .tempfile_in(&self.scratch_dir)?;

        // Stream straight into the scratch file
        let written = response
            .copy_to(&mut scratch)
            .map_err(|e| FieldError::Fetch(format!("Failed to read response body: {}", e)))?;
        scratch.flush()?;
        log::debug!("Downloaded {} bytes for band '{}'", written, asset.band);

        read_geotiff(scratch.path()).map_err(|e| {
            FieldError::Fetch(format!("Asset {} is not a readable raster: {}", asset.href, e))
        })
    }

    fn fetch_local(&self, asset: &BandAsset, path: &Path) -> FieldResult<RasterBand<BandSample>> {
        log::info!("Opening band '{}' from: {}", asset.band, path.display());

        if !path.exists() {
            return Err(FieldError::Fetch(format!("Asset not found: {}", path.display())));
        }
        read_geotiff(path).map_err(|e| {
            FieldError::Fetch(format!("Asset {} is not a readable raster: {}", path.display(), e))
        })
    }
}

impl BandFetcher for AssetBandFetcher {
    fn fetch(&self, asset: &BandAsset) -> FieldResult<RasterBand<BandSample>> {
        let href = asset.href.as_str();
        if href.starts_with("http://") || href.starts_with("https://") {
            self.fetch_remote(asset)
        } else if let Some(path) = href.strip_prefix("file://") {
            self.fetch_local(asset, Path::new(path))
        } else if href.contains("://") {
            Err(FieldError::Fetch(format!("Unsupported asset scheme: {}", href)))
        } else {
            self.fetch_local(asset, Path::new(href))
        }
    }
}

/// Band names become part of scratch file names
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
