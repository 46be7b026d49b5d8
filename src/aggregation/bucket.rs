use super::types::Point;

/// Splits a window-tagged, sorted stream into maximal runs of equal `window`.
pub fn bucketize(points: &[Point]) -> Vec<&[Point]> {
    points.chunk_by(|a, b| a.window == b.window).collect()
}
