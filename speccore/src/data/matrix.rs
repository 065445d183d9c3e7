use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibration::polynomial::CalibrationHandle;
use crate::data::histogram::{BinAxis, Hist1D};
use crate::error::DataError;

/// Axis of a two-dimensional histogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixAxis {
    X,
    Y,
}

impl MatrixAxis {
    pub fn orthogonal(self) -> MatrixAxis {
        match self {
            MatrixAxis::X => MatrixAxis::Y,
            MatrixAxis::Y => MatrixAxis::X,
        }
    }
}

impl Display for MatrixAxis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MatrixAxis::X => write!(f, "x"),
            MatrixAxis::Y => write!(f, "y"),
        }
    }
}

/// Inclusive range of bin indices, always `first <= last`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinRange {
    pub first: i64,
    pub last: i64,
}

impl BinRange {
    /// Range between two bins given in any order.
    pub fn new(a: i64, b: i64) -> Self {
        BinRange { first: a.min(b), last: a.max(b) }
    }

    /// Number of bins covered. Ranges built from [`BinAxis::find_bin`]
    /// count at most the underflow and the overflow bin beyond the axis.
    pub fn nbins(&self) -> i64 {
        self.last - self.first + 1
    }
}

/// Two-dimensional histogram that can be gated along one axis and
/// projected onto the other.
pub trait MatrixSource {
    fn name(&self) -> &str;

    fn axis(&self, axis: MatrixAxis) -> &BinAxis;

    /// Bin of `axis` containing `coordinate` (uncalibrated).
    fn find_bin(&self, axis: MatrixAxis, coordinate: f64) -> i64 {
        self.axis(axis).find_bin(coordinate)
    }

    /// Sums all bins whose `axis` index lies in `range`, giving a histogram
    /// along the orthogonal axis. Parts of `range` off the axis contribute nothing.
    fn project_orthogonal(&self, axis: MatrixAxis, range: BinRange) -> Hist1D;

    /// Calibration of `axis`, if any.
    fn calibration(&self, axis: MatrixAxis) -> Option<CalibrationHandle>;

    /// Axis gated on when the caller leaves the choice to the source.
    fn default_cut_axis(&self) -> MatrixAxis {
        MatrixAxis::X
    }
}

/// Matrix stored as a dense `nalgebra` matrix indexed `(x bin, y bin)`.
#[derive(Clone, Debug)]
pub struct DenseMatrix {
    name: String,
    x: BinAxis,
    y: BinAxis,
    counts: DMatrix<f64>,
    cal_x: Option<CalibrationHandle>,
    cal_y: Option<CalibrationHandle>,
    symmetric: bool,
}

impl DenseMatrix {
    /// Creates a new `DenseMatrix`.
    ///
    /// # Arguments
    ///
    /// * `counts` - contents with the x index varying slowest,
    ///   i.e. `counts[ix * y.nbins + iy]`.
    pub fn new(
        name: impl Into<String>,
        x: BinAxis,
        y: BinAxis,
        counts: Vec<f64>,
    ) -> Result<Self, DataError> {
        let name = name.into();
        let expected = x.nbins * y.nbins;
        if counts.len() != expected {
            return Err(DataError::BinCount { name, expected, got: counts.len() });
        }
        Ok(DenseMatrix {
            name,
            x,
            y,
            counts: DMatrix::from_row_slice(x.nbins, y.nbins, &counts),
            cal_x: None,
            cal_y: None,
            symmetric: false,
        })
    }

    pub fn zeros(name: impl Into<String>, x: BinAxis, y: BinAxis) -> Self {
        DenseMatrix {
            name: name.into(),
            x,
            y,
            counts: DMatrix::zeros(x.nbins, y.nbins),
            cal_x: None,
            cal_y: None,
            symmetric: false,
        }
    }

    pub fn with_calibrations(
        mut self,
        cal_x: Option<CalibrationHandle>,
        cal_y: Option<CalibrationHandle>,
    ) -> Self {
        self.cal_x = cal_x;
        self.cal_y = cal_y;
        self
    }

    /// Marks the matrix symmetric: the y axis shares the x calibration when
    /// it has none of its own.
    pub fn symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn get(&self, ix: usize, iy: usize) -> Option<f64> {
        self.counts.get((ix, iy)).copied()
    }

    pub fn set_bin(&mut self, ix: usize, iy: usize, value: f64) -> Result<(), DataError> {
        let name = &self.name;
        let cell = self
            .counts
            .get_mut((ix, iy))
            .ok_or_else(|| DataError::OutOfRange { name: name.clone(), x: ix, y: iy })?;
        *cell = value;
        Ok(())
    }

    /// Adds `weight` to the bin containing `(x, y)`. Returns false if the
    /// point is off the matrix.
    pub fn fill(&mut self, x: f64, y: f64, weight: f64) -> bool {
        let (bx, by) = (self.x.find_bin(x), self.y.find_bin(y));
        match (self.x.clamp(bx, bx), self.y.clamp(by, by)) {
            (Some((ix, _)), Some((iy, _))) => {
                self.counts[(ix, iy)] += weight;
                true
            }
            _ => false,
        }
    }

    /// Full projection onto the x axis.
    pub fn x_projection(&self) -> Hist1D {
        let full = BinRange::new(0, self.y.nbins as i64 - 1);
        let mut h = self.project_orthogonal(MatrixAxis::Y, full);
        h.name = format!("{}_prx", self.name);
        h
    }

    /// Full projection onto the y axis.
    pub fn y_projection(&self) -> Hist1D {
        let full = BinRange::new(0, self.x.nbins as i64 - 1);
        let mut h = self.project_orthogonal(MatrixAxis::X, full);
        h.name = format!("{}_pry", self.name);
        h
    }
}

impl MatrixSource for DenseMatrix {
    fn name(&self) -> &str {
        &self.name
    }

    fn axis(&self, axis: MatrixAxis) -> &BinAxis {
        match axis {
            MatrixAxis::X => &self.x,
            MatrixAxis::Y => &self.y,
        }
    }

    fn project_orthogonal(&self, axis: MatrixAxis, range: BinRange) -> Hist1D {
        let out_axis = *self.axis(axis.orthogonal());
        let Some((lo, hi)) = self.axis(axis).clamp(range.first, range.last) else {
            return Hist1D::zeros(self.name.clone(), out_axis);
        };

        let counts: Vec<f64> = match axis {
            MatrixAxis::X => (0..self.y.nbins)
                .into_par_iter()
                .map(|iy| (lo..=hi).map(|ix| self.counts[(ix, iy)]).sum::<f64>())
                .collect(),
            MatrixAxis::Y => (0..self.x.nbins)
                .into_par_iter()
                .map(|ix| (lo..=hi).map(|iy| self.counts[(ix, iy)]).sum::<f64>())
                .collect(),
        };
        Hist1D { name: self.name.clone(), axis: out_axis, counts }
    }

    fn calibration(&self, axis: MatrixAxis) -> Option<CalibrationHandle> {
        match axis {
            MatrixAxis::X => self.cal_x.clone(),
            MatrixAxis::Y => match (&self.cal_y, self.symmetric) {
                (Some(cal), _) => Some(cal.clone()),
                (None, true) => self.cal_x.clone(),
                (None, false) => None,
            },
        }
    }
}

/// Matrix storing only filled cells, for large and mostly empty matrices.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    name: String,
    x: BinAxis,
    y: BinAxis,
    cells: BTreeMap<(usize, usize), f64>,
    cal_x: Option<CalibrationHandle>,
    cal_y: Option<CalibrationHandle>,
}

impl SparseMatrix {
    pub fn new(name: impl Into<String>, x: BinAxis, y: BinAxis) -> Self {
        SparseMatrix { name: name.into(), x, y, cells: BTreeMap::new(), cal_x: None, cal_y: None }
    }

    pub fn with_calibrations(
        mut self,
        cal_x: Option<CalibrationHandle>,
        cal_y: Option<CalibrationHandle>,
    ) -> Self {
        self.cal_x = cal_x;
        self.cal_y = cal_y;
        self
    }

    pub fn filled_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn set_bin(&mut self, ix: usize, iy: usize, value: f64) -> Result<(), DataError> {
        if ix >= self.x.nbins || iy >= self.y.nbins {
            return Err(DataError::OutOfRange { name: self.name.clone(), x: ix, y: iy });
        }
        self.cells.insert((ix, iy), value);
        Ok(())
    }

    pub fn fill(&mut self, x: f64, y: f64, weight: f64) -> bool {
        let (bx, by) = (self.x.find_bin(x), self.y.find_bin(y));
        match (self.x.clamp(bx, bx), self.y.clamp(by, by)) {
            (Some((ix, _)), Some((iy, _))) => {
                *self.cells.entry((ix, iy)).or_insert(0.0) += weight;
                true
            }
            _ => false,
        }
    }
}

impl MatrixSource for SparseMatrix {
    fn name(&self) -> &str {
        &self.name
    }

    fn axis(&self, axis: MatrixAxis) -> &BinAxis {
        match axis {
            MatrixAxis::X => &self.x,
            MatrixAxis::Y => &self.y,
        }
    }

    fn project_orthogonal(&self, axis: MatrixAxis, range: BinRange) -> Hist1D {
        let mut out = Hist1D::zeros(self.name.clone(), *self.axis(axis.orthogonal()));
        let Some((lo, hi)) = self.axis(axis).clamp(range.first, range.last) else {
            return out;
        };
        for (&(ix, iy), &value) in &self.cells {
            let (gate, target) = match axis {
                MatrixAxis::X => (ix, iy),
                MatrixAxis::Y => (iy, ix),
            };
            if (lo..=hi).contains(&gate) {
                out.counts[target] += value;
            }
        }
        out
    }

    fn calibration(&self, axis: MatrixAxis) -> Option<CalibrationHandle> {
        match axis {
            MatrixAxis::X => self.cal_x.clone(),
            MatrixAxis::Y => self.cal_y.clone(),
        }
    }
}
