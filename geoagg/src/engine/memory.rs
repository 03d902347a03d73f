//! In-memory engine: runs compiled requests over JSON documents.
//!
//! Answers in the same JSON shape as Elasticsearch so responses go through
//! the same formatter. Covers only the DSL that [`super::builder`] emits.

use super::backend::AggregationBackend;
use super::request::{
    AggKind, AggNode, Aggs, BoolQuery, BucketOrder, DateHistogram, GeoBoundingBox, GeoShape,
    QueryClause, SearchRequest,
};
use super::response::EngineResponse;
use crate::aggregations::{CalendarUnit, Order};
use crate::error::{Error, Result};
use crate::geo::{geohash, BoundingBox, GeoPoint, Geometry};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;
use std::path::Path;
use std::time::Instant;

/// Most buckets one histogram may produce, as the engine's
/// `search.max_buckets` default.
pub const MAX_BUCKETS: usize = 65_535;

#[derive(Default)]
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to `index`, creating it if needed.
    pub fn insert(&self, index: &str, docs: impl IntoIterator<Item = Value>) {
        let mut indices = self.indices.write();
        let entry = indices.entry(index.to_string()).or_default();
        entry.extend(docs);
        tracing::debug!(index, docs = entry.len(), "Memory index updated");
    }

    pub fn doc_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, Vec::len)
    }

    /// Read one JSON document per non-empty line.
    pub fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
        let text = std::fs::read_to_string(path)?;
        parse_jsonl(&text)
    }

    /// Run `request` synchronously over the documents of `index`.
    pub fn execute(&self, index: &str, request: &SearchRequest) -> Result<EngineResponse> {
        let start = Instant::now();
        let indices = self.indices.read();
        let docs = indices
            .get(index)
            .ok_or_else(|| Error::BackendUnavailable(format!("no such index [{}]", index)))?;

        let matched: Vec<&Value> = docs
            .iter()
            .filter(|doc| request.query.as_ref().map_or(true, |q| matches(doc, q)))
            .collect();
        let aggregations = run_aggs(&request.aggs, &matched)?;

        let body = json!({
            "took": start.elapsed().as_millis() as u64,
            "hits": {"total": {"value": matched.len(), "relation": "eq"}},
            "aggregations": aggregations,
        });
        Ok(serde_json::from_value(body)?)
    }
}

pub fn parse_jsonl(text: &str) -> Result<Vec<Value>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

#[async_trait]
impl AggregationBackend for MemoryBackend {
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<EngineResponse> {
        self.execute(index, request)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ----------------------------------------------------------------------------
// Field access
// ----------------------------------------------------------------------------

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |v, part| v.get(part))
}

/// Values of a possibly multi-valued field.
fn field_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    match lookup(doc, path) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v) => vec![v],
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp_millis() as f64)),
        _ => None,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numbers(doc: &Value, path: &str) -> Vec<f64> {
    field_values(doc, path).into_iter().filter_map(as_number).collect()
}

/// Add `doc` to a bucket once, however many of its values land there.
fn push_doc<'a>(bucket: &mut Vec<&'a Value>, doc: &'a Value) {
    if !bucket.last().is_some_and(|last| std::ptr::eq(*last, doc)) {
        bucket.push(doc);
    }
}

fn geo_point(doc: &Value, path: &str) -> Option<GeoPoint> {
    lookup(doc, path).and_then(GeoPoint::from_value)
}

// ----------------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------------

fn matches(doc: &Value, clause: &QueryClause) -> bool {
    match clause {
        QueryClause::Bool(b) => matches_bool(doc, b),
        QueryClause::Term(t) => {
            let expected = as_text(&t.value);
            let expected_number = as_number(&t.value);
            field_values(doc, &t.field).into_iter().any(|v| {
                as_text(v) == expected
                    || matches!((as_number(v), expected_number), (Some(a), Some(b)) if a == b)
            })
        }
        QueryClause::Range(r) => numbers(doc, &r.field).into_iter().any(|v| r.value.contains(v)),
        QueryClause::Wildcard(w) => match wildcard_regex(&w.value.value) {
            Some(re) => field_values(doc, &w.field)
                .into_iter()
                .any(|v| re.is_match(&as_text(v))),
            None => false,
        },
        QueryClause::SimpleQueryString(q) => {
            let haystack: Vec<String> = if q.fields.is_empty() {
                let mut all = Vec::new();
                collect_strings(doc, &mut all);
                all
            } else {
                q.fields
                    .iter()
                    .flat_map(|f| field_values(doc, f))
                    .map(as_text)
                    .collect()
            };
            let haystack: Vec<String> = haystack.iter().map(|s| s.to_lowercase()).collect();
            q.query
                .split_whitespace()
                .map(str::to_lowercase)
                .all(|term| haystack.iter().any(|h| h.contains(&term)))
        }
        QueryClause::GeoBoundingBox(g) => {
            geo_point(doc, &g.field).map_or(false, |p| bounding_box(&g.value).contains(&p))
        }
        QueryClause::GeoShape(g) => {
            let doc_bounds = lookup(doc, &g.field)
                .and_then(Geometry::from_value)
                .and_then(|geom| geom.bounds());
            match (doc_bounds, g.value.shape.bounds()) {
                (Some(doc), Some(shape)) => shape_relation_holds(&g.value, &doc, &shape),
                _ => false,
            }
        }
    }
}

fn matches_bool(doc: &Value, b: &BoolQuery) -> bool {
    if !b.filter.iter().all(|c| matches(doc, c)) {
        return false;
    }
    if b.must_not.iter().any(|c| matches(doc, c)) {
        return false;
    }
    if b.should.is_empty() {
        return true;
    }
    let required = b.minimum_should_match.unwrap_or(
        if b.filter.is_empty() && b.must_not.is_empty() { 1 } else { 0 },
    ) as usize;
    b.should.iter().filter(|c| matches(doc, c)).count() >= required
}

fn collect_strings(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|i| collect_strings(i, out)),
        Value::Object(map) => map.values().for_each(|i| collect_strings(i, out)),
        _ => {}
    }
}

fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

fn bounding_box(g: &GeoBoundingBox) -> BoundingBox {
    BoundingBox {
        west: g.top_left.lon,
        north: g.top_left.lat,
        east: g.bottom_right.lon,
        south: g.bottom_right.lat,
    }
}

fn shape_relation_holds(query: &GeoShape, doc: &BoundingBox, shape: &BoundingBox) -> bool {
    match query.relation.as_str() {
        "within" => shape.contains_box(doc),
        _ => {
            doc.west <= shape.east
                && doc.east >= shape.west
                && doc.south <= shape.north
                && doc.north >= shape.south
        }
    }
}

// ----------------------------------------------------------------------------
// Aggregations
// ----------------------------------------------------------------------------

fn run_aggs(aggs: &Aggs, docs: &[&Value]) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (name, node) in &aggs.0 {
        if matches!(node.kind, AggKind::BucketSort(_)) {
            continue;
        }
        out.insert(name.clone(), run_node(node, docs)?);
    }
    Ok(out)
}

fn run_node(node: &AggNode, docs: &[&Value]) -> Result<Value> {
    match &node.kind {
        AggKind::Avg(f) => {
            let values: Vec<f64> = docs.iter().flat_map(|d| numbers(d, &f.field)).collect();
            let avg = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
            Ok(json!({ "value": avg }))
        }
        AggKind::Sum(f) => {
            let sum: f64 = docs.iter().flat_map(|d| numbers(d, &f.field)).sum();
            Ok(json!({ "value": sum }))
        }
        AggKind::Max(f) => Ok(json!({
            "value": docs.iter().flat_map(|d| numbers(d, &f.field)).reduce(f64::max)
        })),
        AggKind::Min(f) => Ok(json!({
            "value": docs.iter().flat_map(|d| numbers(d, &f.field)).reduce(f64::min)
        })),
        AggKind::Cardinality(f) => {
            let distinct: HashSet<String> = docs
                .iter()
                .flat_map(|d| field_values(d, &f.field))
                .map(as_text)
                .collect();
            Ok(json!({ "value": distinct.len() }))
        }
        AggKind::GeoCentroid(f) => {
            let points: Vec<GeoPoint> = docs.iter().filter_map(|d| geo_point(d, &f.field)).collect();
            if points.is_empty() {
                return Ok(json!({ "count": 0 }));
            }
            let n = points.len() as f64;
            Ok(json!({
                "location": {
                    "lat": points.iter().map(|p| p.lat).sum::<f64>() / n,
                    "lon": points.iter().map(|p| p.lon).sum::<f64>() / n,
                },
                "count": points.len(),
            }))
        }
        AggKind::GeoBounds(f) => {
            let mut points = docs.iter().filter_map(|d| geo_point(d, &f.field));
            let Some(first) = points.next() else {
                return Ok(json!({}));
            };
            let b = points.fold(
                BoundingBox {
                    west: first.lon,
                    south: first.lat,
                    east: first.lon,
                    north: first.lat,
                },
                |b, p| BoundingBox {
                    west: b.west.min(p.lon),
                    south: b.south.min(p.lat),
                    east: b.east.max(p.lon),
                    north: b.north.max(p.lat),
                },
            );
            Ok(json!({
                "bounds": {
                    "top_left": {"lat": b.north, "lon": b.west},
                    "bottom_right": {"lat": b.south, "lon": b.east},
                }
            }))
        }
        AggKind::BucketSort(_) => Ok(json!({})),
        AggKind::GeohashGrid(g) => {
            let mut groups: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
            for &doc in docs {
                if let Some(p) = geo_point(doc, &g.field) {
                    groups
                        .entry(geohash::encode(&p, g.precision as usize))
                        .or_default()
                        .push(doc);
                }
            }
            let raw = groups
                .into_iter()
                .map(|(hash, docs)| RawBucket {
                    key: Value::String(hash),
                    key_as_string: None,
                    docs,
                })
                .collect();
            let order = BucketOrder::new(BucketOrder::COUNT, Order::Desc);
            finish_buckets(raw, &node.aggs, Some(&order), None, false)
        }
        AggKind::Histogram(h) => {
            if h.interval <= 0.0 {
                return Err(Error::BackendUnavailable("histogram interval must be positive".to_string()));
            }
            let mut groups: BTreeMap<i64, Vec<&Value>> = BTreeMap::new();
            for &doc in docs {
                for v in numbers(doc, &h.field) {
                    push_doc(groups.entry((v / h.interval).floor() as i64).or_default(), doc);
                }
            }
            let raw = fill_gaps(groups, |slot| slot + 1)?
                .into_iter()
                .map(|(slot, docs)| RawBucket {
                    key: json!(slot as f64 * h.interval),
                    key_as_string: None,
                    docs,
                })
                .collect();
            finish_buckets(raw, &node.aggs, h.order.as_ref(), None, false)
        }
        AggKind::DateHistogram(d) => run_date_histogram(d, &node.aggs, docs),
        AggKind::Terms(t) => {
            let include = match &t.include {
                Some(pattern) => Some(Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    Error::BackendUnavailable(format!("invalid include pattern: {}", e))
                })?),
                None => None,
            };
            let mut groups: BTreeMap<String, (Value, Vec<&Value>)> = BTreeMap::new();
            for &doc in docs {
                for v in field_values(doc, &t.field) {
                    let text = as_text(v);
                    if include.as_ref().map_or(true, |re| re.is_match(&text)) {
                        let (_, bucket) = groups.entry(text).or_insert_with(|| (v.clone(), Vec::new()));
                        push_doc(bucket, doc);
                    }
                }
            }
            let raw = groups
                .into_values()
                .map(|(key, docs)| RawBucket {
                    key,
                    key_as_string: None,
                    docs,
                })
                .collect();
            let default_order = BucketOrder::new(BucketOrder::COUNT, Order::Desc);
            let order = t.order.as_ref().unwrap_or(&default_order);
            finish_buckets(raw, &node.aggs, Some(order), Some(t.size.unwrap_or(10) as usize), true)
        }
    }
}

struct RawBucket<'a> {
    key: Value,
    key_as_string: Option<String>,
    docs: Vec<&'a Value>,
}

struct BuiltBucket {
    key: Value,
    key_as_string: Option<String>,
    doc_count: usize,
    sub: Map<String, Value>,
}

impl BuiltBucket {
    fn to_value(&self) -> Value {
        let mut bucket = Map::new();
        bucket.insert("key".to_string(), self.key.clone());
        if let Some(s) = &self.key_as_string {
            bucket.insert("key_as_string".to_string(), Value::String(s.clone()));
        }
        bucket.insert("doc_count".to_string(), json!(self.doc_count));
        for (name, value) in &self.sub {
            bucket.insert(name.clone(), value.clone());
        }
        Value::Object(bucket)
    }
}

/// Insert empty buckets between the first and last slot, as histograms do.
/// Fails once the histogram would hold more than [`MAX_BUCKETS`] buckets.
fn fill_gaps<'a>(
    mut groups: BTreeMap<i64, Vec<&'a Value>>,
    next: impl Fn(i64) -> i64,
) -> Result<BTreeMap<i64, Vec<&'a Value>>> {
    let too_many = || {
        Error::BackendUnavailable(format!(
            "histogram would produce more than {} buckets, use a wider interval",
            MAX_BUCKETS
        ))
    };
    if groups.len() > MAX_BUCKETS {
        return Err(too_many());
    }
    if let (Some(&first), Some(&last)) = (groups.keys().next(), groups.keys().next_back()) {
        let mut slot = next(first);
        while slot < last {
            groups.entry(slot).or_default();
            if groups.len() > MAX_BUCKETS {
                return Err(too_many());
            }
            slot = next(slot);
        }
    }
    Ok(groups)
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => as_text(a).cmp(&as_text(b)),
    }
}

fn sort_buckets(buckets: &mut [BuiltBucket], order: &BucketOrder) {
    let directed = |o: Ordering| match order.order {
        Order::Asc => o,
        Order::Desc => o.reverse(),
    };
    buckets.sort_by(|a, b| compare_keys(&a.key, &b.key));
    match order.key.as_str() {
        BucketOrder::KEY => buckets.sort_by(|a, b| directed(compare_keys(&a.key, &b.key))),
        BucketOrder::COUNT => buckets.sort_by(|a, b| directed(a.doc_count.cmp(&b.doc_count))),
        metric => {
            let value = |bucket: &BuiltBucket| {
                bucket
                    .sub
                    .get(metric)
                    .and_then(|m| m.get("value"))
                    .and_then(Value::as_f64)
            };
            buckets.sort_by(|a, b| match (value(a), value(b)) {
                (Some(x), Some(y)) => directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
    }
}

fn finish_buckets(
    raw: Vec<RawBucket<'_>>,
    sub_aggs: &Aggs,
    order: Option<&BucketOrder>,
    size: Option<usize>,
    report_other: bool,
) -> Result<Value> {
    let mut buckets = raw
        .into_iter()
        .map(|b| {
            Ok(BuiltBucket {
                sub: run_aggs(sub_aggs, &b.docs)?,
                doc_count: b.docs.len(),
                key: b.key,
                key_as_string: b.key_as_string,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(order) = order {
        sort_buckets(&mut buckets, order);
    }
    for (_, node) in &sub_aggs.0 {
        if let AggKind::BucketSort(sort) = &node.kind {
            for order in sort.sort.iter().rev() {
                sort_buckets(&mut buckets, order);
            }
        }
    }

    let mut other = 0;
    if let Some(size) = size {
        if buckets.len() > size {
            other = buckets[size..].iter().map(|b| b.doc_count).sum();
            buckets.truncate(size);
        }
    }

    let mut out = Map::new();
    if report_other {
        out.insert("sum_other_doc_count".to_string(), json!(other));
    }
    out.insert(
        "buckets".to_string(),
        Value::Array(buckets.iter().map(BuiltBucket::to_value).collect()),
    );
    Ok(Value::Object(out))
}

// ----------------------------------------------------------------------------
// Date histograms
// ----------------------------------------------------------------------------

/// Parse `1d`, `15m`, `2M` into a count and unit.
fn parse_engine_interval(text: &str) -> Option<(i64, CalendarUnit)> {
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (value, suffix) = text.split_at(split);
    let unit = match suffix {
        "s" => CalendarUnit::Second,
        "m" => CalendarUnit::Minute,
        "h" => CalendarUnit::Hour,
        "d" => CalendarUnit::Day,
        "w" => CalendarUnit::Week,
        "M" => CalendarUnit::Month,
        "q" => CalendarUnit::Quarter,
        "y" => CalendarUnit::Year,
        _ => return None,
    };
    Some((value.parse().ok().filter(|v| *v > 0)?, unit))
}

fn months_per(unit: CalendarUnit) -> Option<i64> {
    match unit {
        CalendarUnit::Month => Some(1),
        CalendarUnit::Quarter => Some(3),
        CalendarUnit::Year => Some(12),
        _ => None,
    }
}

/// Start of the bucket holding `millis`, in epoch millis.
fn bucket_start(millis: i64, value: i64, unit: CalendarUnit) -> Option<i64> {
    if let Some(months) = months_per(unit) {
        let date = Utc.timestamp_millis_opt(millis).single()?;
        let index = i64::from(date.year()) * 12 + i64::from(date.month0());
        let step = months * value;
        let start = index.div_euclid(step) * step;
        return month_index_to_millis(start);
    }
    let width = unit.fixed_millis()? * value;
    // epoch was a Thursday; weeks start on Monday
    let offset = if unit == CalendarUnit::Week { 4 * 86_400_000 } else { 0 };
    Some((millis - offset).div_euclid(width) * width + offset)
}

fn month_index_to_millis(index: i64) -> Option<i64> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    Some(date.and_utc().timestamp_millis())
}

fn next_bucket(start: i64, value: i64, unit: CalendarUnit) -> Option<i64> {
    if let Some(months) = months_per(unit) {
        let date = Utc.timestamp_millis_opt(start).single()?;
        let index = i64::from(date.year()) * 12 + i64::from(date.month0());
        return month_index_to_millis(index + months * value);
    }
    Some(start + unit.fixed_millis()? * value)
}

fn run_date_histogram(d: &DateHistogram, sub_aggs: &Aggs, docs: &[&Value]) -> Result<Value> {
    let interval = d
        .calendar_interval
        .as_deref()
        .or(d.fixed_interval.as_deref())
        .ok_or_else(|| Error::BackendUnavailable("date_histogram needs an interval".to_string()))?;
    let (value, unit) = parse_engine_interval(interval).ok_or_else(|| {
        Error::BackendUnavailable(format!("unsupported date_histogram interval '{}'", interval))
    })?;
    let pattern = joda_to_strftime(&d.format);

    let mut groups: BTreeMap<i64, Vec<&Value>> = BTreeMap::new();
    for &doc in docs {
        for v in numbers(doc, &d.field) {
            if let Some(start) = bucket_start(v as i64, value, unit) {
                push_doc(groups.entry(start).or_default(), doc);
            }
        }
    }
    let groups = fill_gaps(groups, |slot| next_bucket(slot, value, unit).unwrap_or(i64::MAX))?;

    let raw = groups
        .into_iter()
        .map(|(start, docs)| RawBucket {
            key: json!(start),
            key_as_string: format_millis(start, &pattern),
            docs,
        })
        .collect();
    finish_buckets(raw, sub_aggs, d.order.as_ref(), None, false)
}

fn format_millis(millis: i64, pattern: &str) -> Option<String> {
    let time = Utc.timestamp_millis_opt(millis).single()?;
    let mut out = String::new();
    write!(out, "{}", time.format(pattern)).ok()?;
    Some(out)
}

/// Translate a Joda-style date pattern (`yyyy-MM-dd HH:mm:ss`) to strftime.
pub fn joda_to_strftime(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let directive = match (c, run) {
            ('y', 2) => Some("%y"),
            ('y', _) | ('Y', _) | ('u', _) => Some("%Y"),
            ('M', 1) => Some("%-m"),
            ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1) => Some("%-d"),
            ('d', _) => Some("%d"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('m', 1) => Some("%-M"),
            ('m', _) => Some("%M"),
            ('s', 1) => Some("%-S"),
            ('s', _) => Some("%S"),
            ('S', _) => Some("%3f"),
            ('E', 1..=3) => Some("%a"),
            ('E', _) => Some("%A"),
            ('Z', _) => Some("%z"),
            _ => None,
        };
        match directive {
            Some(directive) => out.push_str(directive),
            None => (0..run).for_each(|_| push_literal(&mut out, c)),
        }
        i += run;
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
