use std::fmt::Write as _;
use std::str::FromStr;

use itertools::Itertools;
use tracing::{debug, info};

use crate::calibration::polynomial::CalibrationHandle;
use crate::config::CutConfig;
use crate::cut::region::RegionMarker;
use crate::data::histogram::Hist1D;
use crate::data::matrix::{BinRange, MatrixAxis, MatrixSource};
use crate::error::CutError;

/// Axis argument of a cut. `Default` leaves the choice to the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisSelector {
    X,
    Y,
    Default,
}

impl AxisSelector {
    pub fn resolve<S: MatrixSource + ?Sized>(self, source: &S) -> MatrixAxis {
        match self {
            AxisSelector::X => MatrixAxis::X,
            AxisSelector::Y => MatrixAxis::Y,
            AxisSelector::Default => source.default_cut_axis(),
        }
    }
}

impl FromStr for AxisSelector {
    type Err = CutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(AxisSelector::X),
            "y" => Ok(AxisSelector::Y),
            "0" => Ok(AxisSelector::Default),
            _ => Err(CutError::BadAxis(s.to_string())),
        }
    }
}

/// Background subtracted projection of a matrix, with the gates it was made from.
///
/// Bin errors are not propagated; `hist` carries contents only.
#[derive(Clone, Debug)]
pub struct CutHistogram {
    pub hist: Hist1D,
    /// Axis the gates were set on. The histogram runs along the other one.
    pub axis: MatrixAxis,
    pub gates: Vec<RegionMarker>,
    pub backgrounds: Vec<RegionMarker>,
    /// Calibration of the projection axis of the source.
    pub calibration: Option<CalibrationHandle>,
    pub fg_bins: i64,
    pub bg_bins: i64,
    /// `-fg_bins / bg_bins`, absent when there was no background.
    pub bg_factor: Option<f64>,
}

impl CutHistogram {
    pub fn info(&self) -> String {
        let mut s = format!("cut on {} axis gate: ", self.axis);
        s.push_str(
            &self
                .gates
                .iter()
                .map(|g| format!("{:.0} - {:.0}", g.p1.pos_cal(), g.p2.pos_cal()))
                .join(" and "),
        );
        if let Some(factor) = self.bg_factor {
            let _ = write!(
                s,
                "\nbackground: {} (factor {:.4})",
                self.backgrounds
                    .iter()
                    .map(|g| format!("{:.0} - {:.0}", g.p1.pos_cal(), g.p2.pos_cal()))
                    .join(" and "),
                factor
            );
        }
        s
    }
}

/// Computes gated projections of [`MatrixSource`]s.
#[derive(Clone, Debug, Default)]
pub struct CutEngine {
    config: CutConfig,
}

impl CutEngine {
    pub fn new(config: CutConfig) -> Self {
        CutEngine { config }
    }

    pub fn config(&self) -> &CutConfig {
        &self.config
    }

    /// Projects `source` onto the axis orthogonal to `axis`, summing over the
    /// bins of every foreground gate and subtracting the background gates
    /// scaled by `-fg_bins / bg_bins`.
    ///
    /// A gate reaching past the axis counts one underflow or overflow bin
    /// for that side, which holds no contents.
    ///
    /// # Arguments
    ///
    /// * `regions` - foreground gates, at least one.
    /// * `backgrounds` - background gates, may be empty.
    /// * `axis` - axis the gates are set on.
    ///
    /// Gates whose positions map to no channel fail with
    /// [`CutError::NonFiniteMarker`] before anything is projected.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use speccore::config::CutConfig;
    /// # use speccore::cut::engine::{AxisSelector, CutEngine};
    /// # use speccore::cut::region::RegionMarker;
    /// # use speccore::data::histogram::BinAxis;
    /// # use speccore::data::matrix::DenseMatrix;
    /// let (x, y) = (BinAxis::channels(2), BinAxis::channels(2));
    /// let m = DenseMatrix::new("m", x, y, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// let gate = RegionMarker::from_uncal(1.0, 1.0, None);
    /// let engine = CutEngine::new(CutConfig::default());
    /// let cut = engine.execute(&m, &[gate], &[], AxisSelector::X).unwrap();
    /// assert_eq!(cut.hist.counts, vec![3.0, 4.0]);
    /// ```
    pub fn execute<S: MatrixSource + ?Sized>(
        &self,
        source: &S,
        regions: &[RegionMarker],
        backgrounds: &[RegionMarker],
        axis: AxisSelector,
    ) -> Result<CutHistogram, CutError> {
        if regions.is_empty() {
            return Err(CutError::NoRegions);
        }
        let cut_axis = axis.resolve(source);
        let mode = self.config.reconciliation;

        let fg_ranges = regions
            .iter()
            .map(|r| r.bin_range(source, cut_axis, mode))
            .collect::<Result<Vec<_>, _>>()?;
        let bg_ranges = backgrounds
            .iter()
            .map(|r| r.bin_range(source, cut_axis, mode))
            .collect::<Result<Vec<_>, _>>()?;
        let fg_bins: i64 = fg_ranges.iter().map(BinRange::nbins).sum();
        let bg_bins: i64 = bg_ranges.iter().map(BinRange::nbins).sum();

        let mut hist = Hist1D::zeros(
            format!("{}{}", source.name(), self.config.name_suffix),
            *source.axis(cut_axis.orthogonal()),
        );
        for range in &fg_ranges {
            debug!(axis = %cut_axis, first = range.first, last = range.last, "projecting gate");
            add_projection(&mut hist, source, cut_axis, *range, 1.0)?;
        }

        let bg_factor = if bg_bins > 0 {
            let factor = -(fg_bins as f64) / (bg_bins as f64);
            for range in &bg_ranges {
                debug!(
                    axis = %cut_axis,
                    first = range.first,
                    last = range.last,
                    factor,
                    "subtracting background"
                );
                add_projection(&mut hist, source, cut_axis, *range, factor)?;
            }
            Some(factor)
        } else {
            None
        };

        info!(
            source = source.name(),
            axis = %cut_axis,
            gates = regions.len(),
            fg_bins,
            bg_bins,
            "executed cut"
        );

        Ok(CutHistogram {
            hist,
            axis: cut_axis,
            gates: regions.to_vec(),
            backgrounds: backgrounds.to_vec(),
            calibration: source.calibration(cut_axis.orthogonal()),
            fg_bins,
            bg_bins,
            bg_factor,
        })
    }
}

fn add_projection<S: MatrixSource + ?Sized>(
    hist: &mut Hist1D,
    source: &S,
    axis: MatrixAxis,
    range: BinRange,
    factor: f64,
) -> Result<(), CutError> {
    let projection = source.project_orthogonal(axis, range);
    hist.add_scaled(&projection, factor)?;
    Ok(())
}

/// Executes a cut with the default configuration, the axis given as
/// `"x"`, `"y"` or `"0"`.
pub fn execute_cut<S: MatrixSource + ?Sized>(
    source: &S,
    regions: &[RegionMarker],
    backgrounds: &[RegionMarker],
    axis: &str,
) -> Result<CutHistogram, CutError> {
    if regions.is_empty() {
        return Err(CutError::NoRegions);
    }
    let axis = axis.parse::<AxisSelector>()?;
    CutEngine::default().execute(source, regions, backgrounds, axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::polynomial::Calibration;
    use crate::cut::region::MarkerReconciliation;
    use crate::data::histogram::BinAxis;
    use crate::data::matrix::{DenseMatrix, SparseMatrix};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, nx: usize, ny: usize) -> DenseMatrix {
        let counts = (0..nx * ny).map(|_| rng.gen_range(0.0..100.0_f64).round()).collect();
        DenseMatrix::new("mat", BinAxis::channels(nx), BinAxis::channels(ny), counts).unwrap()
    }

    #[test]
    fn test_no_background_is_plain_sum() {
        let mut rng = StdRng::seed_from_u64(1);
        let m = random_matrix(&mut rng, 40, 30);
        let gates = vec![
            RegionMarker::from_uncal(3.0, 7.0, None),
            RegionMarker::from_uncal(20.0, 22.0, None),
        ];
        let cut = execute_cut(&m, &gates, &[], "x").unwrap();

        let mut expected = m.project_orthogonal(MatrixAxis::X, BinRange::new(3, 7)).counts;
        let second = m.project_orthogonal(MatrixAxis::X, BinRange::new(20, 22)).counts;
        for (e, p) in expected.iter_mut().zip(second) {
            *e += p;
        }
        assert_eq!(cut.hist.counts, expected);
        assert_eq!(cut.fg_bins, 8);
        assert_eq!(cut.bg_bins, 0);
        assert!(cut.bg_factor.is_none());
        assert_eq!(cut.hist.name, "mat_cut");
    }

    #[test]
    fn test_uniform_background_scaled_by_bin_ratio() {
        let v = 3.0;
        let (nx, ny) = (30, 6);
        let mut m = DenseMatrix::zeros("mat", BinAxis::channels(nx), BinAxis::channels(ny));
        for ix in 0..nx {
            for iy in 0..ny {
                m.set_bin(ix, iy, if ix < 10 { 1.0 + iy as f64 } else { v }).unwrap();
            }
        }
        let gate = RegionMarker::from_uncal(0.0, 9.0, None);
        let bg = RegionMarker::from_uncal(20.0, 24.0, None);

        let plain = execute_cut(&m, &[gate.clone()], &[], "x").unwrap();
        let cut = execute_cut(&m, &[gate], &[bg], "x").unwrap();

        assert_eq!(cut.fg_bins, 10);
        assert_eq!(cut.bg_bins, 5);
        assert_eq!(cut.bg_factor, Some(-2.0));
        for (with_bg, without) in cut.hist.counts.iter().zip(plain.hist.counts.iter()) {
            // bg projection per bin is 5 * v, scaled by -2
            assert!((without - with_bg - 2.0 * 5.0 * v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_large_background_may_go_negative() {
        let counts = vec![1.0, 5.0, 5.0, 5.0];
        let m = DenseMatrix::new("m", BinAxis::channels(4), BinAxis::channels(1), counts).unwrap();
        let gate = RegionMarker::from_uncal(0.0, 0.0, None);
        let bg = RegionMarker::from_uncal(1.0, 3.0, None);
        let cut = execute_cut(&m, &[gate], &[bg], "x").unwrap();
        assert!((cut.hist.counts[0] - (1.0 - 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_no_regions() {
        let m = DenseMatrix::zeros("m", BinAxis::channels(4), BinAxis::channels(4));
        assert_eq!(execute_cut(&m, &[], &[], "x").unwrap_err(), CutError::NoRegions);
        let engine = CutEngine::default();
        assert_eq!(engine.execute(&m, &[], &[], AxisSelector::Y).unwrap_err(), CutError::NoRegions);
    }

    #[test]
    fn test_bad_axis() {
        let m = DenseMatrix::zeros("m", BinAxis::channels(4), BinAxis::channels(4));
        let gate = RegionMarker::from_uncal(0.0, 1.0, None);
        let err = execute_cut(&m, &[gate], &[], "z").unwrap_err();
        assert_eq!(err, CutError::BadAxis("z".to_string()));
        assert_eq!("Y".parse::<AxisSelector>(), Ok(AxisSelector::Y));
        assert_eq!("0".parse::<AxisSelector>(), Ok(AxisSelector::Default));
    }

    #[test]
    fn test_reversed_markers_give_same_cut() {
        let mut rng = StdRng::seed_from_u64(42);
        let m = random_matrix(&mut rng, 50, 50);
        for _ in 0..20 {
            let (a, b) = (rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0));
            let (c, d) = (rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0));
            let axis = if rng.gen_bool(0.5) { "x" } else { "y" };
            let forward = execute_cut(
                &m,
                &[RegionMarker::from_uncal(a, b, None)],
                &[RegionMarker::from_uncal(c, d, None)],
                axis,
            )
            .unwrap();
            let reversed = execute_cut(
                &m,
                &[RegionMarker::from_uncal(b, a, None)],
                &[RegionMarker::from_uncal(d, c, None)],
                axis,
            )
            .unwrap();
            assert_eq!(forward.hist.counts, reversed.hist.counts);
        }
    }

    #[test]
    fn test_default_axis_is_x() {
        let mut rng = StdRng::seed_from_u64(3);
        let m = random_matrix(&mut rng, 10, 12);
        let gate = [RegionMarker::from_uncal(2.0, 4.0, None)];
        let default = execute_cut(&m, &gate, &[], "0").unwrap();
        let x = execute_cut(&m, &gate, &[], "x").unwrap();
        assert_eq!(default.axis, MatrixAxis::X);
        assert_eq!(default.hist.counts, x.hist.counts);
        assert_eq!(default.hist.nbins(), 12);
    }

    #[test]
    fn test_calibration_from_projection_axis() {
        let cal_x = CalibrationHandle::new(Calibration::new(vec![0.0, 1.0]));
        let cal_y = CalibrationHandle::new(Calibration::new(vec![1.0, 0.5]));
        let m = DenseMatrix::zeros("m", BinAxis::channels(4), BinAxis::channels(4))
            .with_calibrations(Some(cal_x.clone()), Some(cal_y.clone()));
        let gate = [RegionMarker::from_uncal(0.0, 1.0, None)];
        let on_x = execute_cut(&m, &gate, &[], "x").unwrap();
        assert!(on_x.calibration.as_ref().is_some_and(|c| c.ptr_eq(&cal_y)));
        let on_y = execute_cut(&m, &gate, &[], "y").unwrap();
        assert!(on_y.calibration.as_ref().is_some_and(|c| c.ptr_eq(&cal_x)));
    }

    #[test]
    fn test_source_calibration_reconciliation() {
        let source_cal = CalibrationHandle::new(Calibration::new(vec![0.0, 2.0]));
        let mut m = SparseMatrix::new("s", BinAxis::channels(20), BinAxis::channels(2))
            .with_calibrations(Some(source_cal), None);
        m.set_bin(5, 0, 7.0).unwrap();
        m.set_bin(10, 1, 9.0).unwrap();
        // gate at 10 keV: channel 10 as pinned, channel 5 for the matrix
        let gate = [RegionMarker::from_cal(10.0, 10.0, None)];

        let as_pinned = CutEngine::default().execute(&m, &gate, &[], AxisSelector::X).unwrap();
        assert_eq!(as_pinned.hist.counts, vec![0.0, 9.0]);

        let engine = CutEngine::new(CutConfig {
            reconciliation: MarkerReconciliation::SourceCalibration,
            ..CutConfig::default()
        });
        let reconciled = engine.execute(&m, &gate, &[], AxisSelector::X).unwrap();
        assert_eq!(reconciled.hist.counts, vec![7.0, 0.0]);
    }

    #[test]
    fn test_gate_beyond_axis_counts_sentinels() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = random_matrix(&mut rng, 10, 10);
        let gate = [RegionMarker::from_uncal(-1e300, 1e300, None)];
        let cut = execute_cut(&m, &gate, &[], "x").unwrap();
        assert_eq!(cut.fg_bins, 12);
        assert_eq!(cut.hist.counts, m.y_projection().counts);
    }

    #[test]
    fn test_background_past_edge_keeps_bin_ratio() {
        let m = DenseMatrix::new("m", BinAxis::channels(30), BinAxis::channels(1), vec![3.0; 30])
            .unwrap();
        let gate = [RegionMarker::from_uncal(0.0, 9.0, None)];

        let inside = execute_cut(&m, &gate, &[RegionMarker::from_uncal(20.0, 29.0, None)], "x")
            .unwrap();
        assert_eq!(inside.bg_bins, 10);
        assert!(inside.hist.counts[0].abs() < 1e-12);

        // same real bins plus the overflow bin
        let past = execute_cut(&m, &gate, &[RegionMarker::from_uncal(20.0, 1000.0, None)], "x")
            .unwrap();
        assert_eq!(past.bg_bins, 11);
        assert_eq!(past.bg_factor, Some(-10.0 / 11.0));
        assert!((past.hist.counts[0] - 30.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_marker_without_channel_is_rejected() {
        let m = DenseMatrix::zeros("m", BinAxis::channels(10), BinAxis::channels(10));
        let constant = CalibrationHandle::new(Calibration::new(vec![5.0]));
        let gate = [RegionMarker::from_uncal(1.0, 2.0, None)];
        let bg = [RegionMarker::from_cal(3.0, 4.0, Some(&constant))];

        let err = execute_cut(&m, &gate, &bg, "y").unwrap_err();
        assert!(matches!(err, CutError::NonFiniteMarker { axis: MatrixAxis::Y, .. }));

        let nan_gate = [RegionMarker::from_uncal(f64::NAN, 2.0, None)];
        let err = CutEngine::default().execute(&m, &nan_gate, &[], AxisSelector::X).unwrap_err();
        assert!(matches!(err, CutError::NonFiniteMarker { .. }));
    }

    #[test]
    fn test_info() {
        let m = DenseMatrix::zeros("m", BinAxis::channels(10), BinAxis::channels(10));
        let cut = execute_cut(
            &m,
            &[RegionMarker::from_uncal(1.0, 2.0, None), RegionMarker::from_uncal(5.0, 6.0, None)],
            &[RegionMarker::from_uncal(8.0, 9.0, None)],
            "y",
        )
        .unwrap();
        let info = cut.info();
        assert!(info.starts_with("cut on y axis gate: 1 - 2 and 5 - 6"));
        assert!(info.contains("factor -2.0000"));
    }
}
