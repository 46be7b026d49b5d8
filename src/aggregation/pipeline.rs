use super::aggregators::Aggregator;
use super::error::AggregationError;
use super::types::{AggregatorSpec, Options, Point, WindowSpec};
use super::window::{check_bucket_limit, window};

/// Applies one chain entry. `window_applied` is the flag returned by the
/// previous call (or whether a windower ran, for the first entry).
pub fn apply_aggregator(
    spec: &AggregatorSpec,
    window_applied: bool,
    points: Vec<Point>,
) -> Result<(Vec<Point>, bool), AggregationError> {
    let aggregator = Aggregator::from_spec(spec)?;
    apply_step(&aggregator, window_applied, points)
}

fn apply_step(
    aggregator: &Aggregator,
    window_applied: bool,
    points: Vec<Point>,
) -> Result<(Vec<Point>, bool), AggregationError> {
    if aggregator.requires_window() && !window_applied {
        return Err(AggregationError::WindowRequired {
            aggregator: aggregator.name(),
        });
    }
    Ok((aggregator.apply(points), window_applied))
}

/// A validated window + aggregator chain, ready to run over raw points.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    window: Option<WindowSpec>,
    chain: Vec<Aggregator>,
}

impl Pipeline {
    /// Parses and statically checks the chain, so a bad query fails before
    /// any store work is done.
    pub fn compile(
        window: Option<&Options>,
        aggregators: &[AggregatorSpec],
    ) -> Result<Self, AggregationError> {
        let window = window.map(WindowSpec::from_options).transpose()?;
        if let Some(spec) = &window {
            spec.validate()?;
        }

        let chain = aggregators
            .iter()
            .map(Aggregator::from_spec)
            .collect::<Result<Vec<_>, _>>()?;

        if window.is_none() {
            if let Some(aggregator) = chain.iter().find(|a| a.requires_window()) {
                return Err(AggregationError::WindowRequired {
                    aggregator: aggregator.name(),
                });
            }
        }

        Ok(Self { window, chain })
    }

    pub fn is_windowed(&self) -> bool {
        self.window.is_some()
    }

    /// Rejects a `[start, end]` range whose gap-filled output would be too
    /// large, without touching any points.
    pub fn check_range(&self, start: i64, end: i64) -> Result<(), AggregationError> {
        match &self.window {
            Some(spec) => check_bucket_limit(start, end, spec),
            None => Ok(()),
        }
    }

    pub fn run(&self, start: i64, end: i64, points: Vec<Point>) -> Result<Vec<Point>, AggregationError> {
        let (mut points, mut window_applied) = match &self.window {
            Some(spec) => (window(start, end, spec, points)?, true),
            None => (points, false),
        };

        let mut collapsed = false;
        for aggregator in &self.chain {
            (points, window_applied) = apply_step(aggregator, window_applied, points)?;
            collapsed |= aggregator.requires_window();
        }

        if collapsed {
            for point in points.iter_mut() {
                point.window = 0;
            }
        }
        Ok(points)
    }
}
