/// Validation failures raised while windowing or aggregating a point stream.
///
/// Every variant is a deterministic function of the query input, so callers
/// can surface them as client errors without retrying.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("window interval (`every`) is required")]
    MissingInterval,
    #[error("invalid window interval: {0}")]
    InvalidInterval(String),
    #[error("`fillValue` is required when `fillGaps` is enabled")]
    MissingFillValue,
    #[error("{aggregator} aggregator requires a window to be applied first")]
    WindowRequired { aggregator: &'static str },
    #[error("{owner} option `{option}` must be {expected}, got {found}")]
    TypeMismatch {
        owner: &'static str,
        option: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{owner} option `{option}` is required")]
    MissingOption {
        owner: &'static str,
        option: &'static str,
    },
    #[error("{owner} option `{option}` has unsupported value {value:?}")]
    InvalidOption {
        owner: &'static str,
        option: &'static str,
        value: String,
    },
    #[error("unknown aggregator {0:?}")]
    UnknownAggregator(String),
    #[error("gap filling would produce {buckets} buckets, more than the limit of {max}")]
    TooManyBuckets { buckets: u64, max: u64 },
    #[error("invalid tag key {0:?}")]
    InvalidTagKey(String),
}
