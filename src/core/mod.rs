//! Field index processing stages and the per-invocation orchestrator

pub mod artifact;
pub mod clip;
pub mod index;
pub mod pipeline;
pub mod reproject;
pub mod scene;

// Re-export main types
pub use artifact::{artifact_key, ArtifactWriter};
pub use clip::{PixelWindow, RasterClipper};
pub use index::{normalized_difference_value, IndexComputer};
pub use pipeline::{
    build_default_pipeline, DefaultPipeline, FieldKey, InvocationEvent, InvocationInput,
    InvocationOutcome, PipelineOrchestrator, NO_DATA_SUBJECT,
};
pub use reproject::{parse_epsg, GeometryReprojector, GEOGRAPHIC_EPSG};
pub use scene::SceneSelector;
