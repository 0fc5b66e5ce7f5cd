//! fieldsat: per-field vegetation and moisture indices from Sentinel-2
//!
//! Each invocation searches a STAC catalog for a recent scene over a field,
//! clips the scene's bands to the field boundary, computes normalized
//! difference indices (NDVI, NDMI) and stores them as GeoTIFFs keyed by
//! field and acquisition date. When no scene is available a notification is
//! published instead.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use core::{
    build_default_pipeline, GeometryReprojector, IndexComputer, InvocationOutcome,
    PipelineOrchestrator, RasterClipper, SceneSelector,
};
pub use io::{BandFetcher, CatalogSearch, Notifier, ObjectStore};
pub use types::{
    FieldError, FieldGeometry, FieldResult, GeoTransform, IndexFormula, OutputArtifact,
    RasterBand, SceneDescriptor, BAND_NODATA, INDEX_NODATA,
};
