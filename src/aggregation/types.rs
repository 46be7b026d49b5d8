use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use super::error::AggregationError;
use super::options;

/// Tag set attached to a series. Ordered so the serialized form is canonical.
pub type Tags = BTreeMap<String, String>;

/// Rejects tag keys that cannot be addressed as a JSON path member in the
/// store's tag filters.
pub fn validate_tags(tags: &Tags) -> Result<(), AggregationError> {
    match tags
        .keys()
        .find(|key| key.is_empty() || key.contains(['"', '\\']))
    {
        Some(key) => Err(AggregationError::InvalidTagKey(key.clone())),
        None => Ok(()),
    }
}

/// Untyped option map carried by aggregator and window specs.
pub type Options = Map<String, JsonValue>;

/// One sample, or one synthetic placeholder, in a point stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Point {
    pub value: f64,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Bucket start assigned by the windower; 0 when unset.
    #[serde(default)]
    pub window: i64,
    /// Set on points that do not correspond to a stored sample.
    #[serde(default)]
    pub filled: bool,
}

impl Point {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            value,
            timestamp,
            window: 0,
            filled: false,
        }
    }

    /// Output point of an aggregator: one value stamped with its bucket.
    pub(crate) fn bucket(window: i64, value: f64) -> Self {
        Self {
            value,
            timestamp: window,
            window,
            filled: false,
        }
    }

    pub(crate) fn placeholder(window: i64, value: f64) -> Self {
        Self {
            value,
            timestamp: window,
            window,
            filled: true,
        }
    }
}

/// One link in an aggregator chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AggregatorSpec {
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: Options,
}

impl AggregatorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    /// Bucket width in nanoseconds.
    pub every: Option<i64>,
    pub fill_gaps: bool,
    pub fill_value: Option<f64>,
    pub fill_use_previous: bool,
}

impl WindowSpec {
    pub fn every(nanos: i64) -> Self {
        Self {
            every: Some(nanos),
            fill_gaps: false,
            fill_value: None,
            fill_use_previous: false,
        }
    }

    pub fn with_fill(mut self, fill_value: f64, use_previous: bool) -> Self {
        self.fill_gaps = true;
        self.fill_value = Some(fill_value);
        self.fill_use_previous = use_previous;
        self
    }

    /// Reads `every`, `fillGaps`, `fillValue` and `fillUsePrevious`.
    /// Unrecognized keys are ignored.
    pub fn from_options(options: &Options) -> Result<Self, AggregationError> {
        Ok(Self {
            every: options::get_duration_nanos(options, "every")?,
            fill_gaps: options::get_bool(options, "window", "fillGaps")?.unwrap_or(false),
            fill_value: options::get_f64(options, "window", "fillValue")?,
            fill_use_previous: options::get_bool(options, "window", "fillUsePrevious")?
                .unwrap_or(false),
        })
    }

    pub fn interval(&self) -> Result<i64, AggregationError> {
        match self.every {
            None => Err(AggregationError::MissingInterval),
            Some(every) if every <= 0 => Err(AggregationError::InvalidInterval(format!(
                "interval must be positive, got {every}ns"
            ))),
            Some(every) => Ok(every),
        }
    }

    pub fn validate(&self) -> Result<(), AggregationError> {
        self.interval()?;
        if self.fill_gaps && self.fill_value.is_none() {
            return Err(AggregationError::MissingFillValue);
        }
        Ok(())
    }
}
