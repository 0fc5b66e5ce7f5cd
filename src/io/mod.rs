//! Collaborators at the pipeline boundary: catalog, band assets, storage,
//! notifications and GeoTIFF encoding.

pub mod catalog;
pub mod fetch;
pub mod geotiff;
pub mod notify;
pub mod storage;

pub use catalog::{CatalogSearch, StacCatalogClient, StacItem, StacItemCollection, TimeRange};
pub use fetch::{AssetBandFetcher, BandFetcher};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use storage::{LocalObjectStore, ObjectStore};
