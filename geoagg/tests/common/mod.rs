//! Grid dataset shared by the integration tests: one document every 10°
//! from -170..=170 longitude and -80..=80 latitude (595 documents).

#![allow(dead_code)]

use geoagg::collection::{CollectionReference, FieldType, StaticCatalog};
use geoagg::engine::MemoryBackend;
use geoagg::ExploreService;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const COLLECTION: &str = "geodata";
pub const INDEX: &str = "dataset";
pub const DOC_COUNT: u64 = 595;

pub const JOBS: [&str; 11] = [
    "Actor",
    "Announcers",
    "Archeologists",
    "Architect",
    "Brain Scientist",
    "Chemist",
    "Coach",
    "Coder",
    "Cost Estimator",
    "Dancer",
    "Drafter",
];

pub fn document(i: i64, j: i64) -> Value {
    let id = format!("{}-{}", i, j);
    let (lon, lat) = (i as f64, j as f64);
    json!({
        "id": id,
        "fullname": format!("My name is {}", id),
        "params": {
            "startdate": (i + 1000) * (j + 1000),
            "job": JOBS[(((i.abs() + j.abs()) / 10) % (JOBS.len() as i64 - 1)) as usize],
        },
        "geo_params": {
            "centroid": format!("{},{}", j, i),
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [lon - 1.0, lat + 1.0],
                    [lon + 1.0, lat + 1.0],
                    [lon + 1.0, lat - 1.0],
                    [lon - 1.0, lat - 1.0],
                    [lon - 1.0, lat + 1.0]
                ]]
            }
        }
    })
}

pub fn dataset() -> Vec<Value> {
    (-170..=170)
        .step_by(10)
        .flat_map(|i| (-80..=80).step_by(10).map(move |j| document(i, j)))
        .collect()
}

pub fn collection() -> CollectionReference {
    let mut c = CollectionReference::new(COLLECTION, INDEX);
    c.geometry_path = "geo_params.geometry".to_string();
    c.centroid_path = "geo_params.centroid".to_string();
    c.timestamp_path = "params.startdate".to_string();
    c.fields.insert("id".to_string(), FieldType::Keyword);
    c.fields.insert("fullname".to_string(), FieldType::Text);
    c.fields.insert("params.job".to_string(), FieldType::Keyword);
    c.fields.insert("params.startdate".to_string(), FieldType::Date);
    c.fields.insert("geo_params.centroid".to_string(), FieldType::GeoPoint);
    c.fields.insert("geo_params.geometry".to_string(), FieldType::GeoShape);
    c
}

pub fn backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.insert(INDEX, dataset());
    backend
}

pub fn service() -> Arc<ExploreService> {
    Arc::new(ExploreService::new(
        Arc::new(StaticCatalog::new(vec![collection()])),
        Arc::new(backend()),
        Duration::from_secs(10),
    ))
}
