use crate::error::{Error, Result};
use nom::{
    character::complete::{alpha1, digit1},
    combinator::{all_consuming, map_res},
    sequence::pair,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar units accepted by date histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl CalendarUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarUnit::Second => "second",
            CalendarUnit::Minute => "minute",
            CalendarUnit::Hour => "hour",
            CalendarUnit::Day => "day",
            CalendarUnit::Week => "week",
            CalendarUnit::Month => "month",
            CalendarUnit::Quarter => "quarter",
            CalendarUnit::Year => "year",
        }
    }

    /// Fixed length in milliseconds, `None` for units whose length varies.
    pub fn fixed_millis(&self) -> Option<i64> {
        match self {
            CalendarUnit::Second => Some(1_000),
            CalendarUnit::Minute => Some(60_000),
            CalendarUnit::Hour => Some(3_600_000),
            CalendarUnit::Day => Some(86_400_000),
            CalendarUnit::Week => Some(604_800_000),
            CalendarUnit::Month | CalendarUnit::Quarter | CalendarUnit::Year => None,
        }
    }

    /// Single-letter engine suffix (`1m`, `3h`, ...).
    pub fn engine_suffix(&self) -> &'static str {
        match self {
            CalendarUnit::Second => "s",
            CalendarUnit::Minute => "m",
            CalendarUnit::Hour => "h",
            CalendarUnit::Day => "d",
            CalendarUnit::Week => "w",
            CalendarUnit::Month => "M",
            CalendarUnit::Quarter => "q",
            CalendarUnit::Year => "y",
        }
    }
}

impl FromStr for CalendarUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "second" => Ok(CalendarUnit::Second),
            "minute" => Ok(CalendarUnit::Minute),
            "hour" => Ok(CalendarUnit::Hour),
            "day" => Ok(CalendarUnit::Day),
            "week" => Ok(CalendarUnit::Week),
            "month" => Ok(CalendarUnit::Month),
            "quarter" => Ok(CalendarUnit::Quarter),
            "year" => Ok(CalendarUnit::Year),
            other => Err(Error::invalid(
                "interval",
                format!("'{}' is not a calendar unit", other),
            )),
        }
    }
}

/// Bucket width of a histogram-like aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<CalendarUnit>,
}

impl Interval {
    pub fn numeric(value: u32) -> Self {
        Self { value, unit: None }
    }

    pub fn calendar(value: u32, unit: CalendarUnit) -> Self {
        Self {
            value,
            unit: Some(unit),
        }
    }

    /// Parse a bare positive integer (`"3"`).
    pub fn parse_numeric(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::BadRequest("interval value is empty".to_string()));
        }
        let value = s.parse::<u32>().map_err(|_| {
            Error::invalid("interval", format!("'{}' is not a positive integer", s))
        })?;
        let interval = Self::numeric(value);
        interval.ensure_positive()?;
        Ok(interval)
    }

    /// Parse a calendar interval (`"1minute"`, `"2day"`).
    pub fn parse_calendar(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::BadRequest("interval value is empty".to_string()));
        }
        let (_, (value, unit)) = calendar_interval(s).map_err(|_| {
            Error::invalid(
                "interval",
                format!("'{}' is not a calendar interval such as 1day", s),
            )
        })?;
        let interval = Self::calendar(value, unit.parse()?);
        interval.ensure_positive()?;
        Ok(interval)
    }

    pub fn ensure_positive(&self) -> Result<()> {
        if self.value == 0 {
            return Err(Error::invalid("interval", "must be a positive integer"));
        }
        Ok(())
    }

    /// Bucket width in milliseconds for fixed-length calendar intervals.
    pub fn fixed_millis(&self) -> Option<i64> {
        self.unit
            .and_then(|u| u.fixed_millis())
            .map(|ms| ms * i64::from(self.value))
    }
}

fn calendar_interval(input: &str) -> IResult<&str, (u32, &str)> {
    all_consuming(pair(map_res(digit1, str::parse::<u32>), alpha1))(input)
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{}{}", self.value, unit.as_str()),
            None => write!(f, "{}", self.value),
        }
    }
}
