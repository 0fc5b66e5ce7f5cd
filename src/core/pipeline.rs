//! Per-invocation orchestration: catalog search, scene selection, and the
//! fetch/clip/index/write sequence for each configured formula.
//!
//! Failure policy is fail-fast: the first error in any formula aborts the
//! invocation. Artifacts written by earlier formulas are left in storage.
//! The only recovered condition is an empty catalog result, which publishes
//! a notification and ends the invocation successfully.

use crate::config::PipelineConfig;
use crate::core::artifact::{artifact_key, ArtifactWriter};
use crate::core::clip::RasterClipper;
use crate::core::index::IndexComputer;
use crate::core::reproject::GeometryReprojector;
use crate::core::scene::SceneSelector;
use crate::io::catalog::{build_search_request, CatalogSearch, StacCatalogClient, TimeRange};
use crate::io::fetch::{AssetBandFetcher, BandFetcher};
use crate::io::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::io::storage::{LocalObjectStore, ObjectStore};
use crate::types::{
    BandSample, FieldError, FieldGeometry, FieldResult, IndexFormula, OutputArtifact,
    ProjectedGeometry, RasterBand, SceneDescriptor, INDEX_NODATA,
};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Subject of the notification published when no scene is available
pub const NO_DATA_SUBJECT: &str = "NoData from Sentinel-2";

/// Invocation event as delivered by the trigger
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    pub input_data: InvocationInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvocationInput {
    /// STAC search filter; `datetime` is overwritten with the look-back range
    pub payload: Map<String, Value>,
    /// Field boundary as `[lon, lat]` pairs
    pub coords: Vec<[f64; 2]>,
    /// `{fieldId}_{fieldName}.<suffix>`
    pub key: String,
}

/// Field identity parsed from an invocation key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    pub field_id: String,
    pub field_name: String,
}

impl FieldKey {
    pub fn parse(key: &str) -> FieldResult<Self> {
        let pattern = Regex::new(r"^(?P<id>[^_/\\]+)_(?P<name>[^/\\]+)\.[^./\\]+$")
            .map_err(|e| FieldError::Processing(format!("Invalid key pattern: {}", e)))?;

        let caps = pattern.captures(key.trim()).ok_or_else(|| {
            FieldError::InvalidInput(format!(
                "Key '{}' is not of the form '{{fieldId}}_{{fieldName}}.<suffix>'",
                key
            ))
        })?;

        Ok(Self {
            field_id: caps["id"].to_string(),
            field_name: caps["name"].to_string(),
        })
    }

    /// `{fieldId}_{fieldName}`, used as the storage prefix
    pub fn base_name(&self) -> String {
        format!("{}_{}", self.field_id, self.field_name)
    }
}

/// What an invocation did
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Processed {
        scene_id: String,
        artifacts: Vec<String>,
    },
    NoData {
        time_range: String,
    },
}

/// Orchestrator wired with the production collaborators
pub type DefaultPipeline =
    PipelineOrchestrator<StacCatalogClient, AssetBandFetcher, LocalObjectStore, Box<dyn Notifier>>;

/// Build the production pipeline from configuration
pub fn build_default_pipeline(config: PipelineConfig) -> FieldResult<DefaultPipeline> {
    config.validate()?;
    let timeout = config.http_timeout();

    let catalog = StacCatalogClient::new(&config.catalog_url, timeout, &config.user_agent)?;
    let fetcher = AssetBandFetcher::new(&config.scratch_dir, timeout, &config.user_agent)?;
    let store = LocalObjectStore::new(&config.storage_root);
    let notifier: Box<dyn Notifier> = match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url, timeout, &config.user_agent)?),
        None => Box::new(LogNotifier),
    };

    Ok(PipelineOrchestrator::new(config, catalog, fetcher, store, notifier))
}

/// Sequences one invocation over injected collaborators
pub struct PipelineOrchestrator<C, F, S, N> {
    config: PipelineConfig,
    catalog: C,
    fetcher: F,
    store: S,
    notifier: N,
}

impl<C, F, S, N> PipelineOrchestrator<C, F, S, N>
where
    C: CatalogSearch,
    F: BandFetcher,
    S: ObjectStore,
    N: Notifier,
{
    pub fn new(config: PipelineConfig, catalog: C, fetcher: F, store: S, notifier: N) -> Self {
        Self {
            config,
            catalog,
            fetcher,
            store,
            notifier,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle an invocation dated today (UTC); returns the event unchanged
    pub fn handle(&self, event: &Value) -> FieldResult<Value> {
        self.handle_on(event, Utc::now().date_naive())
    }

    /// Handle an invocation with an explicit "today"; returns the event unchanged
    pub fn handle_on(&self, event: &Value, today: NaiveDate) -> FieldResult<Value> {
        let outcome = self.run(event, today)?;
        log::info!("Invocation finished: {:?}", outcome);
        Ok(event.clone())
    }

    /// Run the pipeline and report what it did
    pub fn run(&self, event: &Value, today: NaiveDate) -> FieldResult<InvocationOutcome> {
        let invocation: InvocationEvent = serde_json::from_value(event.clone())
            .map_err(|e| FieldError::InvalidInput(format!("Malformed invocation event: {}", e)))?;
        let input = invocation.input_data;

        let field_key = FieldKey::parse(&input.key)?;
        let field = FieldGeometry::new(&input.coords)?;
        log::info!(
            "Processing field {} ({} vertices, bbox {:?})",
            field_key.base_name(),
            field.len(),
            field.bbox()
        );

        let range = TimeRange::lookback(today, self.config.lookback_days)?;
        let request = build_search_request(&input.payload, &range);
        let response = self.catalog.search(&request)?;

        let scene = match SceneSelector::select(&response) {
            Ok(scene) => scene,
            Err(e) if e.is_no_data() => {
                self.notify_no_data(&range, &input.key);
                return Ok(InvocationOutcome::NoData {
                    time_range: range.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let reprojector = GeometryReprojector::new(&scene.crs_identifier())?;
        let mask = reprojector.reproject(&field)?;

        let writer = ArtifactWriter::new(
            &self.store,
            &self.config.scratch_dir,
            Some(self.config.compression.as_str()),
        );

        let mut artifacts = Vec::with_capacity(self.config.formulas.len());
        for &formula in &self.config.formulas {
            let artifact = self.compute_index(formula, &scene, &mask, &field_key)?;
            writer.write(&artifact)?;
            artifacts.push(artifact.key);
        }

        Ok(InvocationOutcome::Processed {
            scene_id: scene.id,
            artifacts,
        })
    }

    fn compute_index(
        &self,
        formula: IndexFormula,
        scene: &SceneDescriptor,
        mask: &ProjectedGeometry,
        field_key: &FieldKey,
    ) -> FieldResult<OutputArtifact> {
        log::info!("Computing {} for scene {}", formula, scene.id);

        let (name_a, name_b) = formula.bands();
        let band_a = self.fetch_and_clip(scene, name_a, mask)?;
        let band_b = self.fetch_and_clip(scene, name_b, mask)?;

        let mut raster = IndexComputer::normalized_difference(&band_a, &band_b, INDEX_NODATA)?;
        raster.epsg = raster.epsg.or(Some(scene.epsg));

        Ok(OutputArtifact {
            key: artifact_key(&field_key.base_name(), &scene.acquisition_date(), formula),
            raster,
        })
    }

    fn fetch_and_clip(
        &self,
        scene: &SceneDescriptor,
        band: &str,
        mask: &ProjectedGeometry,
    ) -> FieldResult<RasterBand<BandSample>> {
        let asset = scene.asset(band)?;
        let raw = self.fetcher.fetch(&asset)?;

        // Mask vertices are in the scene CRS
        match raw.epsg {
            Some(epsg) if epsg != mask.epsg => {
                return Err(FieldError::CoordinateSystem(format!(
                    "Band '{}' of scene {} is in EPSG:{} but the field was projected to EPSG:{}",
                    band, scene.id, epsg, mask.epsg
                )));
            }
            None => log::warn!("Band '{}' has no CRS; assuming EPSG:{}", band, mask.epsg),
            Some(_) => {}
        }

        RasterClipper::clip(&raw, mask)
    }

    /// Publish the no-data notification; failures are logged only
    fn notify_no_data(&self, range: &TimeRange, key: &str) {
        let message = format!(
            "No data from Sentinel-2 for time range {} for field: {}",
            range, key
        );
        log::warn!("{}", message);

        if let Err(e) = self
            .notifier
            .publish(&self.config.notification_topic, NO_DATA_SUBJECT, &message)
        {
            log::error!("Failed to publish no-data notification: {}", e);
        }
    }
}
