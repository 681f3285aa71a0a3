//! Fisher's exact test on 2x2 count tables.

use log::trace;
use statrs::distribution::{Discrete, Hypergeometric};

use crate::errors::{ScreenError, ScreenResult};

/// Tables whose probability is within this relative distance of the observed
/// one count as "at least as extreme".
const RELATIVE_TOLERANCE: f64 = 1e-7;

/// Two-sided p-value for the table `[[a, b], [c, d]]`.
///
/// Conditioning on the margins, the top-left cell follows a hypergeometric
/// distribution; the p-value sums the probabilities of every table that is
/// no more likely than the observed one.
pub fn fisher_exact_two_sided(a: u64, b: u64, c: u64, d: u64) -> ScreenResult<f64> {
    let n = a + b + c + d;
    let row1 = a + b;
    let col1 = a + c;

    // a single admissible table
    if n == 0 || row1 == 0 || col1 == 0 || row1 == n || col1 == n {
        return Ok(1.0);
    }

    let dist = Hypergeometric::new(n, col1, row1).map_err(|e| {
        ScreenError::InvalidParameter(format!(
            "cannot build hypergeometric for [[{}, {}], [{}, {}]]: {}",
            a, b, c, d, e
        ))
    })?;

    let lo = (row1 + col1).saturating_sub(n);
    let hi = row1.min(col1);
    let cutoff = dist.ln_pmf(a) + RELATIVE_TOLERANCE.ln_1p();

    let p: f64 = (lo..=hi)
        .map(|x| dist.ln_pmf(x))
        .filter(|&lp| lp <= cutoff)
        .map(f64::exp)
        .sum();

    trace!("fisher [[{}, {}], [{}, {}]] -> {}", a, b, c, d, p);
    Ok(p.min(1.0))
}
