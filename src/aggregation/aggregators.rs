use std::collections::HashMap;

use super::bucket::bucketize;
use super::error::AggregationError;
use super::options;
use super::types::{AggregatorSpec, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviationMode {
    Population,
    #[default]
    Sample,
}

impl DeviationMode {
    fn parse(value: &str) -> Result<Self, AggregationError> {
        match value {
            "population" => Ok(Self::Population),
            "sample" => Ok(Self::Sample),
            other => Err(AggregationError::InvalidOption {
                owner: "stddev",
                option: "mode",
                value: other.to_string(),
            }),
        }
    }
}

/// A compiled aggregator with its options already validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregator {
    Mean,
    Sum,
    Min,
    Max,
    First,
    Last,
    Count { count_filled_points: bool },
    Median,
    Mode,
    StdDev { mode: DeviationMode },
    Fill { use_previous: bool, fill_value: f64 },
}

impl Aggregator {
    pub fn from_spec(spec: &AggregatorSpec) -> Result<Self, AggregationError> {
        let opts = &spec.options;
        let aggregator = match spec.name.to_ascii_lowercase().as_str() {
            "mean" => Self::Mean,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "first" => Self::First,
            "last" => Self::Last,
            "count" => Self::Count {
                count_filled_points: options::get_bool(opts, "count", "countFilledPoints")?
                    .unwrap_or(false),
            },
            "median" => Self::Median,
            "mode" => Self::Mode,
            "stddev" => Self::StdDev {
                mode: options::get_str(opts, "stddev", "mode")?
                    .map(DeviationMode::parse)
                    .transpose()?
                    .unwrap_or_default(),
            },
            "fill" => Self::Fill {
                use_previous: options::get_bool(opts, "fill", "usePrevious")?.unwrap_or(false),
                fill_value: options::get_f64(opts, "fill", "fillValue")?.ok_or(
                    AggregationError::MissingOption {
                        owner: "fill",
                        option: "fillValue",
                    },
                )?,
            },
            _ => return Err(AggregationError::UnknownAggregator(spec.name.clone())),
        };
        Ok(aggregator)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::Count { .. } => "count",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::StdDev { .. } => "stddev",
            Self::Fill { .. } => "fill",
        }
    }

    /// Everything except `fill` collapses buckets and needs window tags.
    pub fn requires_window(&self) -> bool {
        !matches!(self, Self::Fill { .. })
    }

    /// Applies the aggregator to a window-tagged, time-sorted stream.
    pub fn apply(&self, points: Vec<Point>) -> Vec<Point> {
        match *self {
            Self::Mean => reduce_streaming(&points, |acc| acc.sum / acc.count as f64),
            Self::Sum => reduce_streaming(&points, |acc| acc.sum),
            Self::Min => reduce_streaming(&points, |acc| acc.min),
            Self::Max => reduce_streaming(&points, |acc| acc.max),
            Self::First => reduce_streaming(&points, |acc| acc.first),
            Self::Last => reduce_streaming(&points, |acc| acc.last),
            Self::Count {
                count_filled_points,
            } => count(&points, count_filled_points),
            Self::Median => reduce_buckets(&points, median),
            Self::Mode => reduce_buckets(&points, mode),
            Self::StdDev { mode } => reduce_buckets(&points, |bucket| std_dev(bucket, mode)),
            Self::Fill {
                use_previous,
                fill_value,
            } => fill(points, use_previous, fill_value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    first: f64,
    last: f64,
}

impl Accumulator {
    fn seed(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            first: value,
            last: value,
        }
    }

    fn fold(mut self, value: f64) -> Self {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last = value;
        self
    }
}

/// Running state for the bucket currently being folded.
#[derive(Debug, Clone, Copy)]
struct BucketState {
    key: i64,
    acc: Accumulator,
    last: Point,
}

impl BucketState {
    fn open(point: Point) -> Self {
        Self {
            key: point.window,
            acc: Accumulator::seed(point.value),
            last: point,
        }
    }

    fn fold(self, point: Point) -> Self {
        Self {
            key: self.key,
            acc: self.acc.fold(point.value),
            last: point,
        }
    }
}

fn fold_buckets<F>(points: &[Point], mut finish: F) -> Vec<Point>
where
    F: FnMut(&BucketState) -> Point,
{
    let (mut output, state) = points.iter().fold(
        (Vec::new(), None::<BucketState>),
        |(mut output, state), point| {
            let next = match state {
                Some(state) if state.key == point.window => state.fold(*point),
                Some(state) => {
                    output.push(finish(&state));
                    BucketState::open(*point)
                }
                None => BucketState::open(*point),
            };
            (output, Some(next))
        },
    );
    if let Some(state) = state {
        output.push(finish(&state));
    }
    output
}

fn reduce_streaming<F>(points: &[Point], compute: F) -> Vec<Point>
where
    F: Fn(&Accumulator) -> f64,
{
    fold_buckets(points, |state| {
        if state.last.filled {
            state.last
        } else {
            Point::bucket(state.key, compute(&state.acc))
        }
    })
}

fn count(points: &[Point], count_filled_points: bool) -> Vec<Point> {
    fold_buckets(points, |state| match (state.last.filled, count_filled_points) {
        (true, false) => state.last,
        (true, true) => Point::bucket(state.key, 1.0),
        (false, _) => Point::bucket(state.key, state.acc.count as f64),
    })
}

fn reduce_buckets<F>(points: &[Point], compute: F) -> Vec<Point>
where
    F: Fn(&[Point]) -> Point,
{
    bucketize(points)
        .into_iter()
        .map(|bucket| {
            if bucket[0].filled {
                bucket[0]
            } else {
                compute(bucket)
            }
        })
        .collect()
}

fn median(bucket: &[Point]) -> Point {
    let mut values: Vec<f64> = bucket.iter().map(|p| p.value).collect();
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    let value = if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    };
    Point::bucket(bucket[0].window, value)
}

fn mode(bucket: &[Point]) -> Point {
    let window = bucket[0].window;
    let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
    for point in bucket {
        // -0.0 and 0.0 count as the same value.
        let value = if point.value == 0.0 { 0.0 } else { point.value };
        counts.entry(value.to_bits()).or_insert((value, 0)).1 += 1;
    }

    let best = counts.values().map(|(_, n)| *n).max().unwrap_or(0);
    let mut winners = counts.values().filter(|(_, n)| *n == best);
    match (winners.next(), winners.next()) {
        (Some((value, n)), None) if *n > 1 => Point::bucket(window, *value),
        _ => Point::placeholder(window, 0.0),
    }
}

fn std_dev(bucket: &[Point], mode: DeviationMode) -> Point {
    let window = bucket[0].window;
    let n = bucket.len();
    let divisor = match mode {
        DeviationMode::Population => n as f64,
        DeviationMode::Sample if n < 2 => return Point::placeholder(window, 0.0),
        DeviationMode::Sample => (n - 1) as f64,
    };
    let mean = bucket.iter().map(|p| p.value).sum::<f64>() / n as f64;
    let squares: f64 = bucket.iter().map(|p| (p.value - mean).powi(2)).sum();
    Point::bucket(window, (squares / divisor).sqrt())
}

fn fill(mut points: Vec<Point>, use_previous: bool, fill_value: f64) -> Vec<Point> {
    let mut previous: Option<f64> = None;
    for point in points.iter_mut() {
        if point.filled {
            point.value = match previous {
                Some(value) if use_previous => value,
                _ => fill_value,
            };
            point.filled = false;
        }
        previous = Some(point.value);
    }
    points
}
