//! Per-type validation contract for aggregation nodes.
//!
//! Each aggregation type declares which parameters it requires, which it
//! rejects, which are recognised but not implemented, and a hook for the
//! checks that depend on parameter values or on the collection.

use super::model::{Aggregation, AggregationType, MetricFunction, OrderOn};
use crate::collection::{CollectionReference, FieldType};
use crate::error::{Error, Result};
use crate::geo::geohash::MAX_PRECISION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    Field,
    Interval,
    Format,
    CollectField,
    CollectFct,
    Order,
    On,
    Size,
    Include,
    WithGeoCentroid,
    WithGeoBbox,
}

impl Param {
    pub fn name(&self) -> &'static str {
        match self {
            Param::Field => "field",
            Param::Interval => "interval",
            Param::Format => "format",
            Param::CollectField => "collect_field",
            Param::CollectFct => "collect_fct",
            Param::Order => "order",
            Param::On => "on",
            Param::Size => "size",
            Param::Include => "include",
            Param::WithGeoCentroid => "withGeoCentroid",
            Param::WithGeoBbox => "withGeoBBOX",
        }
    }

    pub fn is_set(&self, agg: &Aggregation) -> bool {
        match self {
            Param::Field => agg.field.is_some(),
            Param::Interval => agg.interval.is_some(),
            Param::Format => agg.format.is_some(),
            Param::CollectField => agg.collect_field.is_some(),
            Param::CollectFct => agg.collect_fct.is_some(),
            Param::Order => agg.order.is_some(),
            Param::On => agg.on.is_some(),
            Param::Size => agg.size.is_some(),
            Param::Include => agg.include.is_some(),
            Param::WithGeoCentroid => agg.with_geo_centroid,
            Param::WithGeoBbox => agg.with_geo_bbox,
        }
    }
}

type Hook = fn(&Aggregation, &CollectionReference) -> Result<()>;

pub struct TypeRules {
    pub agg_type: AggregationType,
    pub required: &'static [Param],
    pub forbidden: &'static [Param],
    pub not_implemented: &'static [Param],
    pub check: Hook,
}

impl TypeRules {
    /// Checks that only need to know which parameters are present.
    ///
    /// Unimplemented parameters are reported before anything else so that they
    /// are never confused with invalid input.
    pub fn check_presence(&self, present: impl Fn(Param) -> bool) -> Result<()> {
        if let Some(p) = self.not_implemented.iter().find(|p| present(**p)) {
            return Err(Error::NotImplemented(format!(
                "'{}' is not implemented for {} aggregations",
                p.name(),
                self.agg_type
            )));
        }
        if let Some(p) = self.forbidden.iter().find(|p| present(**p)) {
            return Err(Error::invalid(
                p.name(),
                format!("not supported for {} aggregations", self.agg_type),
            ));
        }
        if let Some(p) = self.required.iter().find(|p| !present(**p)) {
            return Err(Error::BadRequest(format!(
                "'{}' must be specified for {} aggregations",
                p.name(),
                self.agg_type
            )));
        }
        Ok(())
    }
}

pub static RULES: [TypeRules; 4] = [
    TypeRules {
        agg_type: AggregationType::Geohash,
        required: &[Param::Field, Param::Interval],
        forbidden: &[Param::Format, Param::Include],
        not_implemented: &[Param::Size],
        check: check_geohash,
    },
    TypeRules {
        agg_type: AggregationType::Datehistogram,
        required: &[Param::Interval],
        forbidden: &[Param::Include, Param::Size],
        not_implemented: &[],
        check: check_datehistogram,
    },
    TypeRules {
        agg_type: AggregationType::Histogram,
        required: &[Param::Field, Param::Interval],
        forbidden: &[Param::Format, Param::Include, Param::Size],
        not_implemented: &[],
        check: check_histogram,
    },
    TypeRules {
        agg_type: AggregationType::Term,
        required: &[Param::Field],
        forbidden: &[Param::Interval, Param::Format, Param::WithGeoCentroid, Param::WithGeoBbox],
        not_implemented: &[],
        check: check_term,
    },
];

pub fn rules_for(agg_type: AggregationType) -> &'static TypeRules {
    RULES
        .iter()
        .find(|r| r.agg_type == agg_type)
        .unwrap_or(&RULES[0])
}

/// Validate a node against its type's contract and the collection it targets.
pub fn validate(agg: &Aggregation, collection: &CollectionReference) -> Result<()> {
    let rules = rules_for(agg.agg_type);
    rules.check_presence(|p| p.is_set(agg))?;
    check_ordering(agg)?;
    check_collect(agg, collection)?;
    if let Some(size) = agg.size {
        if size == 0 {
            return Err(Error::invalid("size", "must be a positive integer"));
        }
    }
    if let Some(include) = &agg.include {
        regex::Regex::new(include)
            .map_err(|e| Error::invalid("include", format!("not a valid regex: {}", e)))?;
    }
    if let Some(interval) = &agg.interval {
        interval.ensure_positive()?;
    }
    (rules.check)(agg, collection)
}

fn check_ordering(agg: &Aggregation) -> Result<()> {
    match (agg.order, agg.on) {
        (Some(_), None) => Err(Error::invalid("on", "'order' requires 'on' to be set")),
        (None, Some(_)) => Err(Error::invalid("order", "'on' requires 'order' to be set")),
        (Some(_), Some(OrderOn::Result)) => match agg.collect_fct {
            Some(fct) if !fct.is_geo() => Ok(()),
            Some(fct) => Err(Error::invalid(
                "on",
                format!("buckets cannot be ordered on a {} result", fct.as_str()),
            )),
            None => Err(Error::invalid(
                "on",
                "ordering on result requires collect_field and collect_fct",
            )),
        },
        _ => Ok(()),
    }
}

fn check_collect(agg: &Aggregation, collection: &CollectionReference) -> Result<()> {
    match (&agg.collect_field, agg.collect_fct) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(Error::invalid(
            "collect_fct",
            "collect_field requires collect_fct",
        )),
        (None, Some(fct)) if fct.is_geo() => Ok(()),
        (None, Some(fct)) => Err(Error::invalid(
            "collect_field",
            format!("collect_fct {} requires collect_field", fct.as_str()),
        )),
        (Some(field), Some(fct)) => {
            let field_type = collection.require_field(field)?;
            match (fct, field_type) {
                (_, None) => Ok(()),
                (f, Some(FieldType::GeoPoint)) if f.is_geo() => Ok(()),
                (f, Some(_)) if f.is_geo() => Err(Error::invalid(
                    "collect_field",
                    format!("{} requires a geo point field, '{}' is not one", f.as_str(), field),
                )),
                (MetricFunction::Cardinality, Some(_)) => Ok(()),
                (_, Some(t)) if t.is_numeric() || t == FieldType::Date => Ok(()),
                (f, Some(_)) => Err(Error::invalid(
                    "collect_field",
                    format!("{} requires a numeric or date field, '{}' is not one", f.as_str(), field),
                )),
            }
        }
    }
}

fn check_geohash(agg: &Aggregation, collection: &CollectionReference) -> Result<()> {
    if let Some(interval) = &agg.interval {
        if interval.unit.is_some() {
            return Err(Error::invalid("interval", "geohash precision takes no unit"));
        }
        if interval.value < 1 || interval.value as usize > MAX_PRECISION {
            return Err(Error::invalid(
                "interval",
                format!(
                    "invalid geohash aggregation precision of {}, must be between 1 and {}",
                    interval.value, MAX_PRECISION
                ),
            ));
        }
    }
    if let Some(field) = &agg.field {
        if let Some(t) = collection.require_field(field)? {
            if t != FieldType::GeoPoint {
                return Err(Error::invalid(
                    "field",
                    format!("'{}' is not a geo point field", field),
                ));
            }
        }
    }
    if matches!(agg.on, Some(OrderOn::Count) | Some(OrderOn::Field)) {
        return Err(Error::invalid(
            "on",
            "geohash buckets can only be ordered on result",
        ));
    }
    Ok(())
}

fn check_datehistogram(agg: &Aggregation, _collection: &CollectionReference) -> Result<()> {
    match &agg.interval {
        Some(interval) if interval.unit.is_none() => Err(Error::invalid(
            "interval",
            "date histogram interval needs a calendar unit such as 1day",
        )),
        Some(interval) if interval.value > 1 && interval.fixed_millis().is_none() => {
            Err(Error::invalid(
                "interval",
                format!(
                    "'{}' is not supported: month, quarter and year intervals must be 1",
                    interval
                ),
            ))
        }
        _ => Ok(()),
    }
}

fn check_histogram(agg: &Aggregation, collection: &CollectionReference) -> Result<()> {
    if let Some(interval) = &agg.interval {
        if interval.unit.is_some() {
            return Err(Error::invalid("interval", "histogram interval takes no unit"));
        }
    }
    if let Some(field) = &agg.field {
        if let Some(t) = collection.require_field(field)? {
            if !(t.is_numeric() || t == FieldType::Date) {
                return Err(Error::invalid(
                    "field",
                    format!("'{}' is not a numeric or date field", field),
                ));
            }
        }
    }
    Ok(())
}

fn check_term(agg: &Aggregation, collection: &CollectionReference) -> Result<()> {
    if let Some(field) = &agg.field {
        collection.require_field(field)?;
    }
    Ok(())
}
