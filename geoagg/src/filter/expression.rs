//! `f` filter expressions: `field:op:value`.
//!
//! One `f` entry may hold several expressions separated by `;` and several
//! values separated by `,`. All of them are OR-ed together.

use crate::error::{Error, Result};
use nom::{
    character::complete::{char, multispace0},
    combinator::all_consuming,
    number::complete::double,
    sequence::{delimited, separated_pair},
    IResult,
};
use std::fmt;
use std::str::FromStr;

const EXPRESSION_SEPARATOR: char = ';';
const VALUE_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Like,
    Gte,
    Gt,
    Lte,
    Lt,
    Range,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Like => "like",
            Operator::Gte => "gte",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Lt => "lt",
            Operator::Range => "range",
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(self, Operator::Gte | Operator::Gt | Operator::Lte | Operator::Lt)
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "like" => Ok(Operator::Like),
            "gte" => Ok(Operator::Gte),
            "gt" => Ok(Operator::Gt),
            "lte" => Ok(Operator::Lte),
            "lt" => Ok(Operator::Lt),
            "range" => Ok(Operator::Range),
            other => Err(Error::invalid(
                "f",
                format!("operator '{}' is not one of eq, ne, like, gte, gt, lte, lt, range", other),
            )),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Text(String),
    Number(f64),
    Range { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub field: String,
    pub op: Operator,
    pub values: Vec<ExprValue>,
}

fn range(input: &str) -> IResult<&str, (f64, f64)> {
    all_consuming(delimited(
        char('['),
        separated_pair(
            delimited(multispace0, double, multispace0),
            char('<'),
            delimited(multispace0, double, multispace0),
        ),
        char(']'),
    ))(input)
}

fn parse_range(value: &str) -> Result<ExprValue> {
    let (_, (min, max)) = range(value).map_err(|_| {
        Error::invalid("f", format!("'{}' is not a range such as [0<10]", value))
    })?;
    if min > max {
        return Err(Error::invalid(
            "f",
            format!("range lower bound {} is greater than upper bound {}", min, max),
        ));
    }
    Ok(ExprValue::Range { min, max })
}

fn parse_number(value: &str) -> Result<ExprValue> {
    value
        .trim()
        .parse::<f64>()
        .map(ExprValue::Number)
        .map_err(|_| Error::invalid("f", format!("'{}' is not a number", value)))
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let (field, op, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(op), Some(value)) if !field.is_empty() => (field, op, value),
            _ => {
                return Err(Error::invalid(
                    "f",
                    format!("'{}' does not match field:operator:value", s),
                ))
            }
        };
        let op: Operator = op.parse()?;
        if value.is_empty() {
            return Err(Error::invalid("f", format!("'{}' has no value", s)));
        }

        let values = if op.is_comparison() {
            vec![parse_number(value)?]
        } else {
            value
                .split(VALUE_SEPARATOR)
                .map(|v| match op {
                    Operator::Range => parse_range(v),
                    _ => Ok(ExprValue::Text(v.to_string())),
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Expression {
            field: field.to_string(),
            op,
            values,
        })
    }
}

/// Parse one `f` entry into its OR-ed expressions.
pub fn parse_entry(entry: &str) -> Result<Vec<Expression>> {
    entry
        .split(EXPRESSION_SEPARATOR)
        .filter(|e| !e.trim().is_empty())
        .map(str::parse)
        .collect()
}
