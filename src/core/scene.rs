use crate::io::catalog::{StacItem, StacItemCollection};
use crate::types::{FieldError, FieldResult, SceneDescriptor};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Picks the scene to process from a catalog search response
pub struct SceneSelector;

impl SceneSelector {
    /// Select the first feature of the response.
    ///
    /// An empty feature list is `NoDataFound`; a response or first feature
    /// missing required fields is `Parse`.
    pub fn select(response: &Value) -> FieldResult<SceneDescriptor> {
        let collection: StacItemCollection = serde_json::from_value(response.clone())
            .map_err(|e| FieldError::Parse(format!("Not a feature collection: {}", e)))?;

        log::info!("Catalog returned {} feature(s)", collection.features.len());

        let item = collection
            .features
            .into_iter()
            .next()
            .ok_or_else(|| FieldError::NoDataFound("catalog search returned no features".to_string()))?;

        Self::describe(item)
    }

    fn describe(item: StacItem) -> FieldResult<SceneDescriptor> {
        let epsg = item
            .epsg()
            .ok_or_else(|| FieldError::Parse(format!("Feature '{}' has no EPSG code", item.id)))?;

        let utm_zone = item
            .utm_zone()
            .ok_or_else(|| FieldError::Parse(format!("Feature '{}' has no UTM zone", item.id)))?;

        let timestamp = item
            .timestamp()
            .ok_or_else(|| FieldError::Parse(format!("Feature '{}' has no timestamp", item.id)))?;
        let acquired = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| {
                FieldError::Parse(format!("Feature '{}' timestamp '{}': {}", item.id, timestamp, e))
            })?
            .with_timezone(&Utc);

        if item.assets.is_empty() {
            return Err(FieldError::Parse(format!("Feature '{}' has no assets", item.id)));
        }
        let assets = item
            .assets
            .into_iter()
            .map(|(band, asset)| (band, asset.href))
            .collect();

        let scene = SceneDescriptor {
            id: item.id,
            epsg,
            utm_zone,
            acquired,
            assets,
        };

        log::info!(
            "Selected scene {} (EPSG:{}, zone {}, acquired {})",
            scene.id,
            scene.epsg,
            scene.utm_zone,
            scene.acquisition_date()
        );
        Ok(scene)
    }
}
