use fieldsat::core::{InvocationOutcome, PipelineOrchestrator, NO_DATA_SUBJECT};
use fieldsat::io::fetch::AssetBandFetcher;
use fieldsat::io::geotiff::{read_geotiff, write_geotiff};
use fieldsat::io::LocalObjectStore;
use fieldsat::types::BandAsset;
use fieldsat::{
    BandFetcher, CatalogSearch, FieldError, FieldResult, GeoTransform, Notifier, PipelineConfig,
    RasterBand, INDEX_NODATA,
};
use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use ndarray::Array2;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

const FIELD_KEY: &str = "1042_north-paddock.geojson";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

/// Catalog returning a canned response and recording requests
struct FakeCatalog {
    response: Value,
    requests: Rc<RefCell<Vec<Value>>>,
}

impl CatalogSearch for FakeCatalog {
    fn search(&self, request: &Value) -> FieldResult<Value> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.response.clone())
    }
}

/// Local fetcher that records which bands were requested
struct CountingFetcher {
    inner: AssetBandFetcher,
    fetched: Rc<RefCell<Vec<String>>>,
}

impl BandFetcher for CountingFetcher {
    fn fetch(&self, asset: &BandAsset) -> FieldResult<RasterBand<u16>> {
        self.fetched.borrow_mut().push(asset.band.clone());
        self.inner.fetch(asset)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Published {
    topic: String,
    subject: String,
    message: String,
}

struct RecordingNotifier {
    published: Rc<RefCell<Vec<Published>>>,
    fail: bool,
}

impl Notifier for RecordingNotifier {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> FieldResult<()> {
        self.published.borrow_mut().push(Published {
            topic: topic.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
        });
        if self.fail {
            return Err(FieldError::Notification("topic unavailable".to_string()));
        }
        Ok(())
    }
}

/// Test harness with a scratch area, a store and recording collaborators
struct Harness {
    dir: TempDir,
    requests: Rc<RefCell<Vec<Value>>>,
    fetched: Rc<RefCell<Vec<String>>>,
    published: Rc<RefCell<Vec<Published>>>,
}

type TestPipeline =
    PipelineOrchestrator<FakeCatalog, CountingFetcher, LocalObjectStore, RecordingNotifier>;

impl Harness {
    fn new() -> Self {
        init_logging();
        Self {
            dir: tempfile::tempdir().unwrap(),
            requests: Rc::new(RefCell::new(Vec::new())),
            fetched: Rc::new(RefCell::new(Vec::new())),
            published: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn scratch_dir(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    fn storage_root(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            scratch_dir: self.scratch_dir(),
            storage_root: self.storage_root(),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(&self, response: Value, notifier_fails: bool) -> TestPipeline {
        self.pipeline_with(self.config(), response, notifier_fails)
    }

    fn pipeline_with(
        &self,
        config: PipelineConfig,
        response: Value,
        notifier_fails: bool,
    ) -> TestPipeline {
        let fetcher = AssetBandFetcher::new(
            &config.scratch_dir,
            config.http_timeout(),
            &config.user_agent,
        )
        .unwrap();

        PipelineOrchestrator::new(
            config.clone(),
            FakeCatalog {
                response,
                requests: Rc::clone(&self.requests),
            },
            CountingFetcher {
                inner: fetcher,
                fetched: Rc::clone(&self.fetched),
            },
            LocalObjectStore::new(&config.storage_root),
            RecordingNotifier {
                published: Rc::clone(&self.published),
                fail: notifier_fails,
            },
        )
    }

    /// 10x10 uint16 band of 10 m pixels at (500000, 5000000) in EPSG:32633
    fn write_band(&self, name: &str, value: u16) -> PathBuf {
        self.write_band_in(name, value, 32633)
    }

    fn write_band_in(&self, name: &str, value: u16, epsg: u32) -> PathBuf {
        let path = self.dir.path().join("assets").join(format!("{}.tif", name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let band = RasterBand {
            data: Array2::from_elem((10, 10), value),
            transform: GeoTransform::from_array([500_000.0, 10.0, 0.0, 5_000_000.0, 0.0, -10.0]),
            epsg: Some(epsg),
            nodata: Some(0),
        };
        write_geotiff(&band, &path, None).unwrap();
        path
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.storage_root().join("1042_north-paddock").join(name)
    }
}

/// Convert EPSG:32633 points to `[lon, lat]`
fn to_lonlat(points: &[(f64, f64)]) -> Vec<[f64; 2]> {
    let mut utm = SpatialRef::from_epsg(32633).unwrap();
    utm.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    let mut wgs84 = SpatialRef::from_epsg(4326).unwrap();
    wgs84.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    let transform = CoordTransform::new(&utm, &wgs84).unwrap();

    let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let mut zs = vec![0.0; points.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs).unwrap();

    xs.into_iter().zip(ys).map(|(lon, lat)| [lon, lat]).collect()
}

/// Raster footprint inset by half a metre, as a closed ring
fn square_field() -> Vec<[f64; 2]> {
    to_lonlat(&[
        (500_000.5, 4_999_900.5),
        (500_099.5, 4_999_900.5),
        (500_099.5, 4_999_999.5),
        (500_000.5, 4_999_999.5),
        (500_000.5, 4_999_900.5),
    ])
}

fn event(coords: Vec<[f64; 2]>, key: &str) -> Value {
    json!({
        "input_data": {
            "payload": {
                "collections": ["sentinel-2-l2a"],
                "limit": 1
            },
            "coords": coords,
            "key": key
        },
        "request_id": "7f1c"
    })
}

fn scene_response(assets: &[(&str, &Path)]) -> Value {
    let assets: serde_json::Map<String, Value> = assets
        .iter()
        .map(|(band, path)| (band.to_string(), json!({"href": path.to_str().unwrap()})))
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": "S2A_33TWN_20240604_0_L2A",
            "properties": {
                "proj:epsg": 32633,
                "mgrs:utm_zone": 33,
                "created": "2024-06-04T14:22:31.908Z",
                "datetime": "2024-06-04T10:06:21Z"
            },
            "assets": assets
        }]
    })
}

fn full_scene(h: &Harness) -> Value {
    let red = h.write_band("red", 100);
    let nir = h.write_band("nir", 200);
    let nir08 = h.write_band("nir08", 200);
    let swir16 = h.write_band("swir16", 100);
    scene_response(&[
        ("red", red.as_path()),
        ("nir", nir.as_path()),
        ("nir08", nir08.as_path()),
        ("swir16", swir16.as_path()),
    ])
}

#[test]
fn test_end_to_end_writes_both_indices() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);
    let input = event(square_field(), FIELD_KEY);

    let outcome = pipeline.run(&input, today()).unwrap();
    assert_eq!(
        outcome,
        InvocationOutcome::Processed {
            scene_id: "S2A_33TWN_20240604_0_L2A".to_string(),
            artifacts: vec![
                "1042_north-paddock/2024-06-04_NDVI.tif".to_string(),
                "1042_north-paddock/2024-06-04_NDMI.tif".to_string(),
            ],
        }
    );

    // Search window is the five days before "today"
    let requests = h.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["datetime"], "2024-06-05T00:00:00Z/2024-06-10T00:00:00Z");
    assert_eq!(requests[0]["collections"][0], "sentinel-2-l2a");

    assert_eq!(*h.fetched.borrow(), vec!["red", "nir", "nir08", "swir16"]);
    assert!(h.published.borrow().is_empty());

    let ndvi: RasterBand<f32> = read_geotiff(h.artifact("2024-06-04_NDVI.tif")).unwrap();
    assert_eq!(ndvi.shape(), (10, 10));
    assert_eq!(ndvi.epsg, Some(32633));
    assert_eq!(ndvi.nodata, Some(INDEX_NODATA));
    for &v in ndvi.data.iter() {
        assert_abs_diff_eq!(v, 0.333_333, epsilon = 1e-5);
    }

    let ndmi: RasterBand<f32> = read_geotiff(h.artifact("2024-06-04_NDMI.tif")).unwrap();
    for &v in ndmi.data.iter() {
        assert_abs_diff_eq!(v, -0.333_333, epsilon = 1e-5);
    }

    // Scratch files do not outlive the invocation
    let leftovers = std::fs::read_dir(h.scratch_dir()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn test_handle_returns_event_unchanged() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);
    let input = event(square_field(), FIELD_KEY);

    let output = pipeline.handle_on(&input, today()).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_pixels_outside_field_are_nodata() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);
    let triangle = to_lonlat(&[
        (500_000.5, 4_999_999.5),
        (500_099.5, 4_999_999.5),
        (500_000.5, 4_999_900.5),
        (500_000.5, 4_999_999.5),
    ]);

    pipeline.handle_on(&event(triangle, FIELD_KEY), today()).unwrap();

    let ndvi: RasterBand<f32> = read_geotiff(h.artifact("2024-06-04_NDVI.tif")).unwrap();
    assert_eq!(ndvi.shape(), (10, 10));
    assert_abs_diff_eq!(ndvi.data[[0, 0]], 0.333_333, epsilon = 1e-5);
    assert_eq!(ndvi.data[[9, 9]], INDEX_NODATA);
    assert_eq!(ndvi.data[[8, 9]], INDEX_NODATA);
}

#[test]
fn test_no_scene_publishes_notification() {
    let h = Harness::new();
    let pipeline = h.pipeline(json!({"type": "FeatureCollection", "features": []}), false);
    let input = event(square_field(), FIELD_KEY);

    let output = pipeline.handle_on(&input, today()).unwrap();
    assert_eq!(output, input);

    let published = h.published.borrow();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "fieldsat-no-data");
    assert_eq!(published[0].subject, NO_DATA_SUBJECT);
    assert!(published[0].message.contains(FIELD_KEY));
    assert!(published[0]
        .message
        .contains("2024-06-05T00:00:00Z/2024-06-10T00:00:00Z"));

    assert!(h.fetched.borrow().is_empty());
    assert!(!h.storage_root().exists());
}

#[test]
fn test_notification_failure_does_not_fail_invocation() {
    let h = Harness::new();
    let pipeline = h.pipeline(json!({"features": []}), true);

    let outcome = pipeline.run(&event(square_field(), FIELD_KEY), today()).unwrap();
    assert!(matches!(outcome, InvocationOutcome::NoData { .. }));
    assert_eq!(h.published.borrow().len(), 1);
}

#[test]
fn test_malformed_catalog_response_is_parse_error() {
    let h = Harness::new();
    let pipeline = h.pipeline(json!({"code": "InternalServerError"}), false);

    let err = pipeline
        .handle_on(&event(square_field(), FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::Parse(_)));
    assert!(h.published.borrow().is_empty());
    assert!(h.fetched.borrow().is_empty());
}

#[test]
fn test_failing_formula_keeps_earlier_artifacts() {
    let h = Harness::new();
    let red = h.write_band("red", 100);
    let nir = h.write_band("nir", 200);
    let nir08 = h.write_band("nir08", 200);
    let missing = h.dir.path().join("assets").join("swir16.tif");
    let response = scene_response(&[
        ("red", red.as_path()),
        ("nir", nir.as_path()),
        ("nir08", nir08.as_path()),
        ("swir16", missing.as_path()),
    ]);
    let pipeline = h.pipeline(response, false);

    let err = pipeline
        .handle_on(&event(square_field(), FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::Fetch(_)));

    assert!(h.artifact("2024-06-04_NDVI.tif").exists());
    assert!(!h.artifact("2024-06-04_NDMI.tif").exists());
}

#[test]
fn test_failing_first_formula_stops_invocation() {
    let h = Harness::new();
    let nir = h.write_band("nir", 200);
    let nir08 = h.write_band("nir08", 200);
    let swir16 = h.write_band("swir16", 100);
    // No red asset, so NDVI fails before any fetch
    let response = scene_response(&[
        ("nir", nir.as_path()),
        ("nir08", nir08.as_path()),
        ("swir16", swir16.as_path()),
    ]);
    let pipeline = h.pipeline(response, false);

    let err = pipeline
        .handle_on(&event(square_field(), FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::Fetch(_)));
    assert!(h.fetched.borrow().is_empty());
    assert!(!h.artifact("2024-06-04_NDMI.tif").exists());
}

#[test]
fn test_field_outside_scene_is_empty_intersection() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);
    let far_away = to_lonlat(&[
        (520_000.0, 4_980_000.0),
        (520_100.0, 4_980_000.0),
        (520_100.0, 4_980_100.0),
        (520_000.0, 4_980_100.0),
        (520_000.0, 4_980_000.0),
    ]);

    let err = pipeline
        .handle_on(&event(far_away, FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::EmptyIntersection(_)));
}

#[test]
fn test_invalid_input_rejected_before_search() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);

    let err = pipeline
        .handle_on(&event(square_field(), "no-separator.geojson"), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidInput(_)));

    let degenerate = vec![[15.0, 45.0], [15.0, 45.0]];
    let err = pipeline
        .handle_on(&event(degenerate, FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidInput(_)));

    let err = pipeline
        .handle_on(&json!({"input_data": {"coords": []}}), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidInput(_)));

    assert!(h.requests.borrow().is_empty());
}

#[test]
fn test_rerun_overwrites_with_identical_output() {
    let h = Harness::new();
    let pipeline = h.pipeline(full_scene(&h), false);
    let input = event(square_field(), FIELD_KEY);

    pipeline.handle_on(&input, today()).unwrap();
    let first: RasterBand<f32> = read_geotiff(h.artifact("2024-06-04_NDVI.tif")).unwrap();

    pipeline.handle_on(&input, today()).unwrap();
    let second: RasterBand<f32> = read_geotiff(h.artifact("2024-06-04_NDVI.tif")).unwrap();

    assert_eq!(first, second);
    let stored = std::fs::read_dir(h.storage_root().join("1042_north-paddock"))
        .unwrap()
        .count();
    assert_eq!(stored, 2);
}

#[test]
fn test_band_in_other_crs_is_rejected() {
    let h = Harness::new();
    let red = h.write_band_in("red", 100, 32632);
    let nir = h.write_band("nir", 200);
    let pipeline = h.pipeline(
        scene_response(&[("red", red.as_path()), ("nir", nir.as_path())]),
        false,
    );

    let err = pipeline
        .handle_on(&event(square_field(), FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::CoordinateSystem(_)));
    assert!(!h.artifact("2024-06-04_NDVI.tif").exists());
}

#[test]
fn test_oversized_lookback_fails_without_search() {
    let h = Harness::new();
    let config = PipelineConfig {
        lookback_days: 200_000_000,
        ..h.config()
    };
    config.validate().unwrap();
    let pipeline = h.pipeline_with(config, full_scene(&h), false);

    let err = pipeline
        .handle_on(&event(square_field(), FIELD_KEY), today())
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidInput(_)));
    assert!(h.requests.borrow().is_empty());
}
