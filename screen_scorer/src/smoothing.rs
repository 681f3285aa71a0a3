//! Position trend of synonymous fold changes, fitted with robust LOWESS.

use log::debug;
use lowess::prelude::Lowess as LowessBuilder;

use crate::errors::{ScreenError, ScreenResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lowess {
    pub frac: f64,
    pub iterations: usize,
}

impl Default for Lowess {
    fn default() -> Self {
        Lowess {
            frac: 0.15,
            iterations: 3,
        }
    }
}

/// Smoothed curve evaluated at the sorted, de-duplicated training positions.
#[derive(Debug, Clone, PartialEq)]
pub struct LowessFit {
    xs: Vec<f64>,
    fitted: Vec<f64>,
}

impl Lowess {
    pub fn new(frac: f64, iterations: usize) -> ScreenResult<Self> {
        if !(frac > 0.0 && frac <= 1.0) {
            return Err(ScreenError::InvalidParameter(format!(
                "LOWESS fraction must be in (0, 1], got {}",
                frac
            )));
        }
        Ok(Lowess { frac, iterations })
    }

    pub fn fit(&self, x: &[f64], y: &[f64]) -> ScreenResult<LowessFit> {
        // every point is fitted directly, without delta interpolation or edge padding
        let model = LowessBuilder::<f64>::new()
            .fraction(self.frac)
            .iterations(self.iterations)
            .delta(0.0)
            .boundary_policy("noboundary")
            .return_sorted()
            .build()?;
        let result = model.fit(x, y)?;
        debug!(
            "LOWESS over {} points, frac {}, {} robustness passes",
            result.x.len(),
            self.frac,
            self.iterations
        );

        let mut xs: Vec<f64> = Vec::with_capacity(result.x.len());
        let mut fitted: Vec<f64> = Vec::with_capacity(result.y.len());
        for (&xi, &fi) in result.x.iter().zip(&result.y) {
            if xs.last() != Some(&xi) {
                xs.push(xi);
                fitted.push(fi);
            }
        }
        Ok(LowessFit { xs, fitted })
    }
}

impl LowessFit {
    /// Fitted value at `x`: linear interpolation between training positions,
    /// clamped to the end values outside the training range.
    pub fn predict(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.fitted[0];
        }
        if x >= self.xs[n - 1] {
            return self.fitted[n - 1];
        }
        let upper = self.xs.partition_point(|&v| v < x);
        let (x0, x1) = (self.xs[upper - 1], self.xs[upper]);
        let (f0, f1) = (self.fitted[upper - 1], self.fitted[upper]);
        if x1 == x0 {
            return f1;
        }
        f0 + (f1 - f0) * (x - x0) / (x1 - x0)
    }

    pub fn positions(&self) -> &[f64] {
        &self.xs
    }
}
