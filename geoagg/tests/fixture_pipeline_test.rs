//! Aggregation pipelines over the grid dataset, run through the explore
//! service against the in-memory backend.

mod common;

use geoagg::aggregations::AggregationsRequest;
use geoagg::filter::Filter;
use geoagg::geo::{Geometry, Tile};
use geoagg::response::{AggregationResponse, FeatureCollection};
use geoagg::Error;
use serde_json::json;

async fn aggregate(descriptors: &[&str], filter: Filter) -> geoagg::Result<AggregationResponse> {
    let service = common::service();
    let collection = service.collection(common::COLLECTION)?;
    let request = AggregationsRequest::from_descriptors(filter, descriptors, &collection)?;
    service.aggregate(&collection, &request, None).await
}

async fn run(descriptors: &[&str]) -> AggregationResponse {
    aggregate(descriptors, Filter::default()).await.unwrap()
}

fn counts(tree: &AggregationResponse) -> Vec<u64> {
    tree.buckets().map(|b| b.count).collect()
}

fn metric(bucket: &AggregationResponse) -> f64 {
    bucket.metrics().next().and_then(|m| m.value).unwrap()
}

fn point(geometry: &Option<Geometry>) -> [f64; 2] {
    match geometry {
        Some(Geometry::Point { coordinates }) => *coordinates,
        other => panic!("expected a point, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Geohash
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_geohash_precision_three_isolates_every_document() {
    let tree = run(&["geohash:geo_params.centroid:interval-3"]).await;
    assert_eq!(tree.totalnb, Some(common::DOC_COUNT));
    assert_eq!(tree.buckets().count(), 595);
    assert!(counts(&tree).iter().all(|&c| c == 1));
}

#[tokio::test]
async fn test_geohash_precision_one() {
    let tree = run(&["geohash:geo_params.centroid:interval-1"]).await;
    let counts = counts(&tree);
    assert_eq!(counts.len(), 32);
    assert!(counts.iter().all(|c| (16..=25).contains(c)));
    assert_eq!(counts.iter().sum::<u64>(), common::DOC_COUNT);
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));

    for bucket in tree.buckets() {
        let hash = bucket.key_as_string.as_deref().unwrap();
        assert_eq!(hash.len(), 1);
        let key = bucket.key.as_ref().unwrap();
        let lon = key["lon"].as_f64().unwrap();
        let lat = key["lat"].as_f64().unwrap();
        // Cell centres of a one-character geohash.
        assert!([22.5, 67.5, 112.5, 157.5].contains(&lon.abs()));
        assert!([22.5, 67.5].contains(&lat.abs()));
    }
}

#[tokio::test]
async fn test_geohash_collect_metrics() {
    let cases = [
        ("avg", 790075.0, 1230075.0),
        ("cardinality", 16.0, 25.0),
        ("max", 817000.0, 1263600.0),
        ("min", 763600.0, 1197000.0),
        ("sum", 12641200.0, 28305000.0),
    ];
    for (fct, low, high) in cases {
        let descriptor = format!(
            "geohash:geo_params.centroid:interval-1:collect_field-params.startdate:collect_fct-{}",
            fct
        );
        let tree = run(&[&descriptor]).await;
        assert_eq!(tree.buckets().count(), 32);
        for bucket in tree.buckets() {
            let m = bucket.metrics().next().unwrap();
            assert_eq!(m.metric_type, fct);
            assert_eq!(m.field, "params.startdate");
            let value = m.value.unwrap();
            assert!(
                value >= low - 1.0 && value <= high + 1.0,
                "{} = {} outside [{}, {}]",
                fct,
                value,
                low,
                high
            );
        }
    }
}

#[tokio::test]
async fn test_geohash_geocentroid_and_geobbox() {
    let tree = run(&["geohash:geo_params.centroid:interval-1:collect_fct-geocentroid"]).await;
    for bucket in tree.buckets() {
        let [lon, lat] = point(&bucket.centroid);
        assert!((-155.0..=155.0).contains(&lon));
        assert!((-65.0..=65.0).contains(&lat));
        assert!(bucket.elements.is_empty());
    }

    let tree = run(&["geohash:geo_params.centroid:interval-1:collect_fct-geobbox"]).await;
    for bucket in tree.buckets() {
        let Some(Geometry::Polygon { coordinates }) = &bucket.bbox else {
            panic!("missing BBOX");
        };
        assert_eq!(coordinates[0].len(), 5);
        assert!(coordinates[0]
            .iter()
            .all(|[lon, lat]| lon.abs() <= 170.0 && lat.abs() <= 80.0));
    }
}

#[tokio::test]
async fn test_geohash_bucket_flags() {
    let tree = run(&["geohash:geo_params.centroid:interval-1:withGeoCentroid-true:withGeoBBOX-true"]).await;
    for bucket in tree.buckets() {
        assert!(bucket.centroid.is_some());
        assert!(bucket.bbox.is_some());
        assert!(bucket.elements.is_empty());
    }

    // The metric centroid takes precedence over the bucket one.
    let tree = run(&["geohash:geo_params.centroid:interval-1:withGeoCentroid-true:collect_fct-geocentroid"]).await;
    assert!(tree.buckets().all(|b| b.centroid.is_some()));
}

#[tokio::test]
async fn test_geohash_ordered_by_metric() {
    let tree = run(&[
        "geohash:geo_params.centroid:interval-1:collect_field-params.startdate:collect_fct-max:order-asc:on-result",
    ])
    .await;
    let values: Vec<f64> = tree.buckets().map(metric).collect();
    assert_eq!(values.len(), 32);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
}

// ---------------------------------------------------------------------------
// Date histogram, histogram, term
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_date_histogram() {
    let tree = run(&["datehistogram:interval-1day"]).await;
    assert_eq!(counts(&tree), vec![595]);

    let tree = run(&["datehistogram:interval-1minute"]).await;
    let counts = counts(&tree);
    assert_eq!(counts, vec![3, 43, 83, 104, 104, 98, 85, 54, 20, 1]);
    let keys: Vec<i64> = tree
        .buckets()
        .map(|b| b.key.as_ref().and_then(|k| k.as_i64()).unwrap())
        .collect();
    assert_eq!(keys.first(), Some(&720_000));
    assert!(keys.windows(2).all(|w| w[1] - w[0] == 60_000));
    assert_eq!(
        tree.buckets().next().unwrap().key_as_string.as_deref(),
        Some("1970-01-01-00:12:00")
    );
}

#[tokio::test]
async fn test_date_histogram_with_format_and_metric() {
    let tree = run(&[
        "datehistogram:interval-1minute:format-HH:collect_field-params.startdate:collect_fct-max",
    ])
    .await;
    let values: Vec<f64> = tree.buckets().map(metric).collect();
    assert_eq!(values.len(), 10);
    assert_eq!(values.last(), Some(&1_263_600.0));
}

#[tokio::test]
async fn test_histogram() {
    let tree = run(&["histogram:params.startdate:interval-100000"]).await;
    assert_eq!(counts(&tree), vec![14, 115, 176, 162, 107, 21]);
    assert_eq!(
        tree.buckets().next().unwrap().key.as_ref().and_then(|k| k.as_f64()),
        Some(700_000.0)
    );
}

#[tokio::test]
async fn test_term_counts_and_other_docs() {
    let tree = run(&["term:params.job"]).await;
    let keys: Vec<_> = tree
        .buckets()
        .map(|b| (b.key_as_string.clone().unwrap(), b.count))
        .collect();
    assert_eq!(keys.len(), 10);
    assert_eq!(keys[0], ("Cost Estimator".to_string(), 64));
    assert!(keys.iter().all(|(_, c)| (58..=64).contains(c)));
    assert!(!keys.iter().any(|(k, _)| k == "Drafter"));
    assert_eq!(tree.sum_other_doc_count, Some(0));

    let tree = run(&["term:params.job:size-5"]).await;
    assert_eq!(tree.buckets().count(), 5);
    assert_eq!(tree.sum_other_doc_count, Some(290));
}

#[tokio::test]
async fn test_term_order_and_include() {
    let tree = run(&["term:params.job:order-asc:on-count"]).await;
    let counts = counts(&tree);
    assert_eq!(counts.first(), Some(&58));
    assert_eq!(counts.last(), Some(&64));

    let tree = run(&["term:params.job:order-asc:on-field"]).await;
    assert_eq!(
        tree.buckets().next().unwrap().key_as_string.as_deref(),
        Some("Actor")
    );

    let tree = run(&["term:params.job:include-Co.*"]).await;
    let mut keys: Vec<_> = tree
        .buckets()
        .map(|b| b.key_as_string.clone().unwrap())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["Coach", "Coder", "Cost Estimator"]);
}

#[tokio::test]
async fn test_nested_pipeline_counts_add_up() {
    let tree = run(&[
        "term:params.job:collect_field-params.startdate:collect_fct-avg",
        "geohash:geo_params.centroid:interval-1:withGeoCentroid-true",
    ])
    .await;
    assert_eq!(tree.depth(), 2);
    for job in tree.buckets() {
        assert_eq!(job.metrics().count(), 1);
        let nested: u64 = job.buckets().map(|cell| cell.count).sum();
        assert_eq!(nested, job.count);
        assert!(job.buckets().all(|cell| cell.centroid.is_some()));
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expression_filters() {
    let filter = Filter {
        f: vec!["params.job:eq:Actor".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(59));
    assert_eq!(counts(&tree), vec![59]);

    let filter = Filter {
        f: vec!["params.job:ne:Actor,Coder".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(595 - 59 - 62));

    let filter = Filter {
        f: vec!["params.startdate:gte:1000000".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["histogram:params.startdate:interval-100000"], filter)
        .await
        .unwrap();
    assert_eq!(
        tree.buckets().next().unwrap().key.as_ref().and_then(|k| k.as_f64()),
        Some(1_000_000.0)
    );

    let filter = Filter {
        f: vec!["params.job:like:Co".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.buckets().count(), 3);
}

#[tokio::test]
async fn test_text_and_time_filters() {
    let filter = Filter {
        q: vec!["fullname:170-80".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(2));

    let filter = Filter {
        after: Some(1_200_000),
        before: Some(1_300_000),
        ..Default::default()
    };
    let tree = aggregate(&["datehistogram:interval-1day"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(21));
}

#[tokio::test]
async fn test_spatial_filters() {
    let filter = Filter {
        pwithin: vec!["5,5,180,90".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(17 * 8));

    let filter = Filter {
        notpwithin: vec!["5,5,180,90".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(595 - 17 * 8));

    let filter = Filter {
        gwithin: vec!["POLYGON((0 0,30 0,30 30,0 30,0 0))".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(4));

    let filter = Filter {
        gintersect: vec!["0,0,30,30".to_string()],
        ..Default::default()
    };
    let tree = aggregate(&["term:params.job"], filter).await.unwrap();
    assert_eq!(tree.totalnb, Some(16));
}

// ---------------------------------------------------------------------------
// Rejections happen before the engine is called
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejected_requests() {
    let cases: Vec<(&str, fn(&Error) -> bool)> = vec![
        ("geohash:geo_params.centroid:interval-1:size-3", |e| {
            matches!(e, Error::NotImplemented(_))
        }),
        ("geohash:geo_params.centroid:interval-13", |e| {
            matches!(e, Error::InvalidParameter { .. })
        }),
        ("geohash:geo_params.centroid", |e| matches!(e, Error::BadRequest(_))),
        ("term:params.nope", |e| matches!(e, Error::NotFound(_))),
        ("term:params.job:interval-2", |e| {
            matches!(e, Error::InvalidParameter { .. })
        }),
        ("datehistogram:interval-1day:size-3", |e| {
            matches!(e, Error::InvalidParameter { .. })
        }),
        ("datehistogram:interval-2month", |e| {
            matches!(e, Error::InvalidParameter { .. })
        }),
        ("histogram:params.job:interval-10", |e| {
            matches!(e, Error::InvalidParameter { .. })
        }),
        ("foobar:params.job", |e| matches!(e, Error::InvalidParameter { .. })),
    ];
    for (descriptor, expected) in cases {
        let err = aggregate(&[descriptor], Filter::default()).await.unwrap_err();
        assert!(expected(&err), "{} gave {:?}", descriptor, err);
    }
}

// ---------------------------------------------------------------------------
// Geo-aggregations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_geoaggregate_features() {
    let service = common::service();
    let collection = service.collection(common::COLLECTION).unwrap();
    let request = AggregationsRequest::from_descriptors(
        Filter::default(),
        &["geohash:geo_params.centroid:interval-1:collect_fct-geobbox"],
        &collection,
    )
    .unwrap();
    let fc = service.geoaggregate(&collection, &request, None).await.unwrap();
    assert_eq!(fc.features.len(), 32);
    assert!(fc
        .features
        .iter()
        .all(|f| matches!(f.geometry, Geometry::Polygon { .. })));
    let total: u64 = fc.features.iter().map(|f| f.properties.count).sum();
    assert_eq!(total, 595);
}

#[tokio::test]
async fn test_geohash_addressed_request() {
    let service = common::service();
    let collection = service.collection(common::COLLECTION).unwrap();

    // Cell "s" spans lon 0..45, lat 0..45: 5 x 5 grid points.
    let fc = service
        .geoaggregate_geohash(&collection, "s", &[], &Filter::default(), None)
        .await
        .unwrap();
    assert_eq!(fc.features.len(), 1);
    assert_eq!(fc.features[0].properties.count, 25);

    let descriptors = vec!["geohash:geo_params.centroid:interval-3".to_string()];
    let fc = service
        .geoaggregate_geohash(&collection, "s", &descriptors, &Filter::default(), None)
        .await
        .unwrap();
    assert_eq!(fc.features.len(), 25);

    let filter = Filter {
        pwithin: vec!["-50,-50,-10,-10".to_string()],
        ..Default::default()
    };
    let fc = service
        .geoaggregate_geohash(&collection, "s", &[], &filter, None)
        .await
        .unwrap();
    assert_eq!(fc, FeatureCollection::empty());
}

#[tokio::test]
async fn test_tile_addressed_request() {
    let service = common::service();
    let collection = service.collection(common::COLLECTION).unwrap();

    let world = service
        .geoaggregate_tile(&collection, Tile::new(0, 0, 0).unwrap(), &[], &Filter::default(), None)
        .await
        .unwrap();
    let total: u64 = world.features.iter().map(|f| f.properties.count).sum();
    assert_eq!(total, 595);

    // North-east quadrant, narrowed further by pwithin.
    let filter = Filter {
        pwithin: vec!["5,5,180,90".to_string()],
        ..Default::default()
    };
    let fc = service
        .geoaggregate_tile(&collection, Tile::new(1, 0, 1).unwrap(), &[], &filter, None)
        .await
        .unwrap();
    let total: u64 = fc.features.iter().map(|f| f.properties.count).sum();
    assert_eq!(total, 17 * 8);

    let value = serde_json::to_value(&fc).unwrap();
    assert_eq!(value["type"], json!("FeatureCollection"));
}
