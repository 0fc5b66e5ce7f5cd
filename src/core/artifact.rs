use crate::io::geotiff::write_geotiff;
use crate::io::storage::ObjectStore;
use crate::types::{FieldResult, IndexFormula, OutputArtifact};
use std::path::{Path, PathBuf};

/// Storage key `{field}/{YYYY-MM-DD}_{INDEX}.tif`
pub fn artifact_key(field_base: &str, acquisition_date: &str, formula: IndexFormula) -> String {
    format!("{}/{}_{}.tif", field_base, acquisition_date, formula.name())
}

/// Serializes index rasters to GeoTIFF and hands them to storage
pub struct ArtifactWriter<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    scratch_dir: PathBuf,
    compression: Option<String>,
}

impl<'a, S: ObjectStore + ?Sized> ArtifactWriter<'a, S> {
    pub fn new<P: AsRef<Path>>(store: &'a S, scratch_dir: P, compression: Option<&str>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
            compression: compression
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    /// Encode to a unique scratch GeoTIFF, then store its bytes under the key
    pub fn write(&self, artifact: &OutputArtifact) -> FieldResult<()> {
        log::info!("Writing artifact: {}", artifact.key);

        std::fs::create_dir_all(&self.scratch_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("index_")
            .suffix(".tif")
            .tempfile_in(&self.scratch_dir)?;

        write_geotiff(&artifact.raster, scratch.path(), self.compression.as_deref())?;
        let bytes = std::fs::read(scratch.path())?;
        log::debug!("Encoded {} bytes for {}", bytes.len(), artifact.key);

        self.store.put(&artifact.key, &bytes)
    }
}
