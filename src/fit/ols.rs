//! Closed-form simple linear regression.

/// A fitted line `y = coef · x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub coef: f64,
    pub intercept: f64,
}

impl Line {
    /// Line through two points, `None` when they share an x.
    pub fn through(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<Line> {
        let dx = x1 - x0;
        if dx == 0.0 {
            return None;
        }
        let coef = (y1 - y0) / dx;
        Some(Line { coef, intercept: y0 - coef * x0 })
    }

    #[inline]
    pub fn predict(&self, x: f64) -> f64 {
        self.coef * x + self.intercept
    }
}

/// Ordinary least squares over all `(x[i], y[i])`.
///
/// Returns `None` with fewer than two points or when every x is equal.
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<Line> {
    least_squares_subset(x, y, 0..x.len())
}

/// Least squares over the points selected by `idx`.
pub fn least_squares_subset<I>(x: &[f64], y: &[f64], idx: I) -> Option<Line>
where
    I: IntoIterator<Item = usize> + Clone,
{
    let mut n = 0usize;
    let (mut sx, mut sy) = (0.0, 0.0);
    for i in idx.clone() {
        sx += x[i];
        sy += y[i];
        n += 1;
    }
    if n < 2 {
        return None;
    }
    let (mx, my) = (sx / n as f64, sy / n as f64);
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for i in idx {
        let dx = x[i] - mx;
        sxx += dx * dx;
        sxy += dx * (y[i] - my);
    }
    if sxx <= f64::EPSILON * n as f64 * mx.abs().max(1.0) {
        return None;
    }
    let coef = sxy / sxx;
    Some(Line { coef, intercept: my - coef * mx })
}
