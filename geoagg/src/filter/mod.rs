//! Request filters.
//!
//! A [`Filter`] is the raw, serializable form received from query parameters,
//! a request body or the `Partition-Filter` header. [`Filter::parse`] checks
//! it and produces a [`ParsedFilter`] the request builder can compile.

pub mod expression;
pub mod spatial;

pub use expression::{ExprValue, Expression, Operator};

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, Geometry};
use serde::{Deserialize, Deserializer, Serialize};

/// Header carrying a JSON filter that is always AND-ed with the user filter.
pub const PARTITION_FILTER_HEADER: &str = "Partition-Filter";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub f: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub q: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub pwithin: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub gwithin: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub gintersect: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub notpwithin: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub notgwithin: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub notgintersect: Vec<String>,
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

/// Free-text predicate, optionally restricted to one field.
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    pub field: Option<String>,
    pub text: String,
}

impl TextQuery {
    fn parse(value: &str) -> Result<Self> {
        let (field, text) = match value.split_once(':') {
            Some((field, text)) if !field.is_empty() => (Some(field.to_string()), text),
            _ => (None, value),
        };
        if text.trim().is_empty() {
            return Err(Error::invalid("q", "query text is empty"));
        }
        Ok(Self {
            field,
            text: text.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRelation {
    Within,
    Intersects,
}

impl ShapeRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeRelation::Within => "within",
            ShapeRelation::Intersects => "intersects",
        }
    }
}

/// One `gwithin`/`gintersect` entry: OR-ed geometries with a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFilter {
    pub relation: ShapeRelation,
    pub shapes: Vec<Geometry>,
}

/// A checked filter. Every `Vec` of entries is AND-ed, the items inside an
/// entry are OR-ed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilter {
    pub expressions: Vec<Vec<Expression>>,
    pub queries: Vec<TextQuery>,
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub pwithin: Vec<Vec<BoundingBox>>,
    pub notpwithin: Vec<Vec<BoundingBox>>,
    pub shapes: Vec<ShapeFilter>,
    pub not_shapes: Vec<ShapeFilter>,
}

impl ParsedFilter {
    pub fn is_empty(&self) -> bool {
        self == &ParsedFilter::default()
    }
}

impl Filter {
    /// Collect filter parameters out of raw query pairs. Unknown keys are
    /// left to the caller.
    pub fn from_query_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut filter = Filter::default();
        for (key, value) in pairs {
            match key {
                "f" => filter.f.push(value.to_string()),
                "q" => filter.q.push(value.to_string()),
                "before" => filter.before = Some(parse_millis("before", value)?),
                "after" => filter.after = Some(parse_millis("after", value)?),
                "pwithin" => filter.pwithin.push(value.to_string()),
                "gwithin" => filter.gwithin.push(value.to_string()),
                "gintersect" => filter.gintersect.push(value.to_string()),
                "notpwithin" => filter.notpwithin.push(value.to_string()),
                "notgwithin" => filter.notgwithin.push(value.to_string()),
                "notgintersect" => filter.notgintersect.push(value.to_string()),
                _ => {}
            }
        }
        Ok(filter)
    }

    /// Decode the JSON carried by the partition filter header.
    pub fn from_header(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| {
            Error::invalid(PARTITION_FILTER_HEADER, format!("not a valid filter: {}", e))
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    /// Check every entry and turn it into its typed form.
    pub fn parse(&self) -> Result<ParsedFilter> {
        if let (Some(after), Some(before)) = (self.after, self.before) {
            if after >= before {
                return Err(Error::invalid(
                    "after",
                    format!("after {} must be lower than before {}", after, before),
                ));
            }
        }

        let shapes = shape_filters("gwithin", &self.gwithin, ShapeRelation::Within)
            .chain(shape_filters("gintersect", &self.gintersect, ShapeRelation::Intersects))
            .collect::<Result<Vec<_>>>()?;
        let not_shapes = shape_filters("notgwithin", &self.notgwithin, ShapeRelation::Within)
            .chain(shape_filters("notgintersect", &self.notgintersect, ShapeRelation::Intersects))
            .collect::<Result<Vec<_>>>()?;

        Ok(ParsedFilter {
            expressions: self
                .f
                .iter()
                .map(|e| expression::parse_entry(e))
                .collect::<Result<_>>()?,
            queries: self.q.iter().map(|q| TextQuery::parse(q)).collect::<Result<_>>()?,
            before: self.before,
            after: self.after,
            pwithin: self
                .pwithin
                .iter()
                .map(|p| spatial::parse_boxes("pwithin", p))
                .collect::<Result<_>>()?,
            notpwithin: self
                .notpwithin
                .iter()
                .map(|p| spatial::parse_boxes("notpwithin", p))
                .collect::<Result<_>>()?,
            shapes,
            not_shapes,
        })
    }
}

fn shape_filters<'a>(
    param: &'a str,
    entries: &'a [String],
    relation: ShapeRelation,
) -> impl Iterator<Item = Result<ShapeFilter>> + 'a {
    entries.iter().map(move |entry| {
        Ok(ShapeFilter {
            relation,
            shapes: spatial::parse_shapes(param, entry)?,
        })
    })
}

fn parse_millis(param: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::invalid(param, format!("'{}' is not an epoch in milliseconds", value)))
}
