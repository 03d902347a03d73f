//! Colon-delimited aggregation descriptors.
//!
//! ```text
//! geohash:geo_params.centroid:interval-3:collect_fct-geobbox
//! datehistogram:interval-1day:format-yyyy-MM-dd
//! term:params.job:size-5:include-A.*
//! ```
//!
//! Tokens after the type are collected into a key/value map in one pass and
//! the node is built from the map. Per-type rules run afterwards.

use super::interval::Interval;
use super::model::{Aggregation, AggregationType};
use super::rules::{self, Param};
use crate::collection::CollectionReference;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

const SEPARATOR: char = ':';

/// Parameter prefixes that take a value after `-`.
const VALUE_PARAMS: [(&str, Param); 8] = [
    ("interval", Param::Interval),
    ("format", Param::Format),
    ("collect_field", Param::CollectField),
    ("collect_fct", Param::CollectFct),
    ("order", Param::Order),
    ("on", Param::On),
    ("size", Param::Size),
    ("include", Param::Include),
];

/// Boolean flags, accepted bare or with a `-true`/`-false` value.
const FLAG_PARAMS: [(&str, Param); 2] = [
    ("withGeoCentroid", Param::WithGeoCentroid),
    ("withGeoBBOX", Param::WithGeoBbox),
];

/// Tokens of one descriptor before any value is interpreted.
#[derive(Debug, Default, PartialEq)]
pub struct DescriptorTokens<'a> {
    pub agg_type: &'a str,
    pub field: Option<&'a str>,
    pub params: BTreeMap<Param, &'a str>,
}

/// Recognise a `key-value` token or a bare flag.
fn param_token(token: &str) -> Option<(Param, &str)> {
    for (key, param) in FLAG_PARAMS {
        if token == key {
            return Some((param, "true"));
        }
        if let Some(value) = token.strip_prefix(key).and_then(|r| r.strip_prefix('-')) {
            return Some((param, value));
        }
    }
    VALUE_PARAMS.iter().find_map(|(key, param)| {
        token
            .strip_prefix(key)
            .and_then(|r| r.strip_prefix('-'))
            .map(|value| (*param, value))
    })
}

/// Split a descriptor into its type, optional field and parameter map.
pub fn tokenize(descriptor: &str) -> Result<DescriptorTokens<'_>> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(Error::BadRequest("aggregation descriptor is empty".to_string()));
    }

    let mut tokens = descriptor.split(SEPARATOR);
    let mut parsed = DescriptorTokens {
        agg_type: tokens.next().unwrap_or_default(),
        ..Default::default()
    };

    for (position, token) in tokens.enumerate() {
        let param = param_token(token);
        if position == 0 && param.is_none() {
            parsed.field = Some(token).filter(|t| !t.is_empty());
            continue;
        }
        match param {
            Some((param, value)) => {
                if parsed.params.insert(param, value).is_some() {
                    return Err(Error::invalid(
                        param.name(),
                        "specified more than once",
                    ));
                }
            }
            None => {
                tracing::debug!(token, "Ignoring unrecognised descriptor token");
            }
        }
    }
    Ok(parsed)
}

/// Parse a descriptor into a node, applying only rules that do not need a
/// collection.
pub fn parse_descriptor(descriptor: &str) -> Result<Aggregation> {
    let tokens = tokenize(descriptor)?;
    let agg_type: AggregationType = tokens.agg_type.parse()?;

    rules::rules_for(agg_type).check_presence(|p| match p {
        Param::Field => tokens.field.is_some(),
        other => tokens.params.contains_key(&other),
    })?;

    let mut agg = Aggregation::new(agg_type);
    agg.field = tokens.field.map(str::to_string);

    for (param, value) in &tokens.params {
        apply_param(&mut agg, *param, value)?;
    }
    Ok(agg)
}

/// Parse and fully validate a descriptor against `collection`.
pub fn parse_aggregation(descriptor: &str, collection: &CollectionReference) -> Result<Aggregation> {
    let agg = parse_descriptor(descriptor)?;
    rules::validate(&agg, collection)?;
    Ok(agg)
}

fn apply_param(agg: &mut Aggregation, param: Param, value: &str) -> Result<()> {
    match param {
        Param::Field => agg.field = Some(value.to_string()),
        Param::Interval => {
            agg.interval = Some(match agg.agg_type {
                AggregationType::Datehistogram => Interval::parse_calendar(value)?,
                _ => Interval::parse_numeric(value)?,
            })
        }
        Param::Format => agg.format = Some(non_empty(param, value)?.to_string()),
        Param::CollectField => agg.collect_field = Some(non_empty(param, value)?.to_string()),
        Param::CollectFct => agg.collect_fct = Some(value.parse()?),
        Param::Order => agg.order = Some(value.parse()?),
        Param::On => agg.on = Some(value.parse()?),
        Param::Size => agg.size = Some(parse_size(value)?),
        Param::Include => agg.include = Some(non_empty(param, value)?.to_string()),
        Param::WithGeoCentroid => agg.with_geo_centroid = parse_flag(param, value)?,
        Param::WithGeoBbox => agg.with_geo_bbox = parse_flag(param, value)?,
    }
    Ok(())
}

fn non_empty(param: Param, value: &str) -> Result<&str> {
    if value.is_empty() {
        return Err(Error::invalid(param.name(), "value is empty"));
    }
    Ok(value)
}

fn parse_size(value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(Error::invalid(
            "size",
            format!("'{}' is not a positive integer", value),
        )),
    }
}

fn parse_flag(param: Param, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::invalid(
            param.name(),
            format!("'{}' is not true or false", value),
        )),
    }
}
