use std::fmt;
use std::fmt::{Display, Formatter};

use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::calibration::polynomial::{Calibration, ChannelMap};
use crate::error::CalibrationError;

const SVD_EPS: f64 = 1e-12;

/// One channel/energy pair of a calibration fit with its fitted energy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalPoint {
    pub channel: f64,
    pub energy: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// Outcome of fitting a calibration polynomial to channel/energy pairs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub calibration: Calibration,
    /// Points sorted by channel.
    pub points: Vec<CalPoint>,
    pub residual_mean: f64,
    /// Root mean square of the residuals.
    pub residual_rms: f64,
}

/// Fits a calibration polynomial of `degree` to `(channel, energy)` pairs.
///
/// # Description
///
/// Least squares through an SVD of the Vandermonde matrix. `degree == 0`
/// fixes the linear term at 1 and fits only the offset.
///
/// # Example
///
/// ```rust
/// # use speccore::calibration::fitting::fit_calibration;
/// # use speccore::calibration::polynomial::ChannelMap;
/// let fit = fit_calibration(&[(100.0, 50.0), (300.0, 150.0)], 1).unwrap();
/// assert!((fit.calibration.ch_to_e(200.0) - 100.0).abs() < 1e-9);
/// ```
pub fn fit_calibration(
    pairs: &[(f64, f64)],
    degree: usize,
) -> Result<CalibrationFit, CalibrationError> {
    let needed = degree + 1;
    if pairs.len() < needed {
        return Err(CalibrationError::TooFewPairs { degree, needed, got: pairs.len() });
    }

    let calibration = if degree == 0 {
        let offset = pairs.iter().map(|(ch, e)| e - ch).mean();
        Calibration::new(vec![offset, 1.0])
    } else {
        let n_coeff = degree + 1;
        let design = DMatrix::from_fn(pairs.len(), n_coeff, |i, j| pairs[i].0.powi(j as i32));
        let energies = DVector::from_iterator(pairs.len(), pairs.iter().map(|(_, e)| *e));

        let svd = design.svd(true, true);
        if svd.rank(SVD_EPS) < n_coeff {
            return Err(CalibrationError::FitFailed {
                detail: format!("channels do not determine a polynomial of degree {}", degree),
            });
        }
        let solution = svd
            .solve(&energies, SVD_EPS)
            .map_err(|e| CalibrationError::FitFailed { detail: e.to_string() })?;
        Calibration::new(solution.iter().copied().collect())
    };

    let mut points: Vec<CalPoint> = pairs
        .iter()
        .map(|&(channel, energy)| {
            let fitted = calibration.ch_to_e(channel);
            CalPoint { channel, energy, fitted, residual: energy - fitted }
        })
        .collect();
    points.sort_by_key(|p| OrderedFloat(p.channel));

    let residual_mean = points.iter().map(|p| p.residual).mean();
    let residual_rms = points.iter().map(|p| p.residual).quadratic_mean();
    debug!(degree, pairs = pairs.len(), residual_rms, "fitted calibration");

    Ok(CalibrationFit { calibration, points, residual_mean, residual_rms })
}

impl Display for CalibrationFit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Calibration: {}", self.calibration)?;
        writeln!(f, "{:>12} {:>12} {:>12} {:>10}", "Channel", "E(given)", "E(fit)", "Residual")?;
        for p in &self.points {
            writeln!(
                f,
                "{:>12.3} {:>12.3} {:>12.3} {:>10.4}",
                p.channel, p.energy, p.fitted, p.residual
            )?;
        }
        write!(f, "Residual mean: {:.4}, rms: {:.4}", self.residual_mean, self.residual_rms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_fit_exact() {
        let pairs = [(10.0, 25.0), (20.0, 45.0), (40.0, 85.0)];
        let fit = fit_calibration(&pairs, 1).unwrap();
        let c = fit.calibration.coefficients();
        assert!((c[0] - 5.0).abs() < 1e-9);
        assert!((c[1] - 2.0).abs() < 1e-9);
        assert!(fit.residual_rms < 1e-9);
    }

    #[test]
    fn test_quadratic_fit() {
        let truth = Calibration::new(vec![1.0, 0.5, 1e-4]);
        let pairs: Vec<(f64, f64)> = [50.0, 400.0, 900.0, 1500.0, 3000.0]
            .iter()
            .map(|&ch| (ch, truth.ch_to_e(ch)))
            .collect();
        let fit = fit_calibration(&pairs, 2).unwrap();
        assert!((fit.calibration.ch_to_e(2000.0) - truth.ch_to_e(2000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_degree_zero_fixes_slope() {
        let fit = fit_calibration(&[(100.0, 110.0), (200.0, 214.0)], 0).unwrap();
        assert_eq!(fit.calibration.coefficients(), &[12.0, 1.0]);
        assert!((fit.residual_mean).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_pairs() {
        assert!(matches!(
            fit_calibration(&[(1.0, 2.0)], 1),
            Err(CalibrationError::TooFewPairs { needed: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_degenerate_channels() {
        let res = fit_calibration(&[(5.0, 1.0), (5.0, 2.0), (5.0, 3.0)], 1);
        assert!(matches!(res, Err(CalibrationError::FitFailed { .. })));
    }

    #[test]
    fn test_points_sorted_by_channel() {
        let fit = fit_calibration(&[(30.0, 3.0), (10.0, 1.0), (20.0, 2.0)], 1).unwrap();
        let channels: Vec<f64> = fit.points.iter().map(|p| p.channel).collect();
        assert_eq!(channels, vec![10.0, 20.0, 30.0]);
    }
}
