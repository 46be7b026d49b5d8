use super::error::AggregationError;
use super::types::{Point, WindowSpec};

/// Upper bound on the buckets a gap-filled window may span.
pub const MAX_WINDOW_BUCKETS: u64 = 1_000_000;

/// Start of the bucket containing `timestamp`.
///
/// Floors toward negative infinity, so `-1` lands in the bucket starting at
/// `-every` rather than in the bucket starting at `0`.
pub fn bucket_start(timestamp: i64, every: i64) -> i64 {
    timestamp - timestamp.rem_euclid(every)
}

/// Buckets from `bucket_start(start)` through `bucket_start(end)` inclusive.
/// Zero when `end` falls in an earlier bucket than `start`.
pub fn bucket_count(start: i64, end: i64, every: i64) -> u64 {
    let first = i128::from(bucket_start(start, every));
    let last = i128::from(bucket_start(end, every));
    if last < first {
        return 0;
    }
    u64::try_from((last - first) / i128::from(every) + 1).unwrap_or(u64::MAX)
}

/// Fails with `TooManyBuckets` when gap filling `[start, end]` would exceed
/// [`MAX_WINDOW_BUCKETS`]. Windows without gap filling never synthesize
/// points and always pass.
pub fn check_bucket_limit(start: i64, end: i64, spec: &WindowSpec) -> Result<(), AggregationError> {
    if !spec.fill_gaps {
        return Ok(());
    }
    let buckets = bucket_count(start, end, spec.interval()?);
    if buckets > MAX_WINDOW_BUCKETS {
        return Err(AggregationError::TooManyBuckets {
            buckets,
            max: MAX_WINDOW_BUCKETS,
        });
    }
    Ok(())
}

/// Tags every point with its bucket start.
///
/// Without gap filling the input is mutated in place and its length is
/// unchanged. With gap filling the buckets from `bucket_start(start)` through
/// `bucket_start(end)` are walked in order; each empty bucket receives one
/// `filled` placeholder and points outside the walked range are dropped.
/// Gap filling over more than [`MAX_WINDOW_BUCKETS`] buckets is rejected
/// before anything is allocated.
pub fn window(
    start: i64,
    end: i64,
    spec: &WindowSpec,
    mut points: Vec<Point>,
) -> Result<Vec<Point>, AggregationError> {
    let every = spec.interval()?;

    if !spec.fill_gaps {
        for point in points.iter_mut() {
            point.window = bucket_start(point.timestamp, every);
        }
        return Ok(points);
    }

    let fill_value = spec.fill_value.ok_or(AggregationError::MissingFillValue)?;
    check_bucket_limit(start, end, spec)?;
    let first = bucket_start(start, every);
    let last = bucket_start(end, every);

    let mut output: Vec<Point> = Vec::with_capacity(points.len());
    let mut input = points.into_iter().peekable();
    let mut bucket = first;
    while bucket <= last {
        let bucket_end = bucket.saturating_add(every);
        while input.next_if(|point| point.timestamp < bucket).is_some() {}

        let before = output.len();
        while let Some(mut point) = input.next_if(|point| point.timestamp < bucket_end) {
            point.window = bucket;
            output.push(point);
        }

        if output.len() == before {
            let value = match output.last() {
                Some(previous) if spec.fill_use_previous => previous.value,
                _ => fill_value,
            };
            output.push(Point::placeholder(bucket, value));
        }

        match bucket.checked_add(every) {
            Some(next) => bucket = next,
            None => break,
        }
    }

    Ok(output)
}
