use std::path::Path;

use serde::{Deserialize, Serialize};

use speccore::calibration::polynomial::{Calibration, CalibrationHandle};
use speccore::data::histogram::{BinAxis, Hist1D};
use speccore::data::matrix::{DenseMatrix, MatrixAxis};

/// JSON layout of a matrix given to `spectool cut`.
///
/// `counts` is row-major with the x index varying slowest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatrixFile {
    pub name: String,
    pub x: BinAxis,
    pub y: BinAxis,
    pub counts: Vec<f64>,
    #[serde(default)]
    pub cal_x: Option<Vec<f64>>,
    #[serde(default)]
    pub cal_y: Option<Vec<f64>>,
    #[serde(default)]
    pub symmetric: bool,
}

impl MatrixFile {
    pub fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn into_matrix(self) -> Result<DenseMatrix, Box<dyn std::error::Error>> {
        let to_handle =
            |c: Option<Vec<f64>>| c.map(|c| CalibrationHandle::new(Calibration::new(c)));
        let cal_x = to_handle(self.cal_x);
        let cal_y = to_handle(self.cal_y);
        let x = BinAxis::new(self.x.nbins, self.x.min, self.x.max)?;
        let y = BinAxis::new(self.y.nbins, self.y.min, self.y.max)?;
        Ok(DenseMatrix::new(self.name, x, y, self.counts)?
            .with_calibrations(cal_x, cal_y)
            .symmetric(self.symmetric))
    }
}

/// Result of `spectool cut` as written to JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CutOutput {
    pub axis: MatrixAxis,
    pub fg_bins: i64,
    pub bg_bins: i64,
    pub bg_factor: Option<f64>,
    /// Calibration coefficients of the projection axis.
    pub calibration: Option<Vec<f64>>,
    pub hist: Hist1D,
}

#[cfg(test)]
mod tests {
    use super::*;
    use speccore::data::matrix::MatrixSource;

    #[test]
    fn test_matrix_from_json() {
        let json = r#"{
            "name": "gg",
            "x": {"nbins": 2, "min": -0.5, "max": 1.5},
            "y": {"nbins": 3, "min": -0.5, "max": 2.5},
            "counts": [1, 2, 3, 4, 5, 6],
            "cal_y": [0.0, 2.0]
        }"#;
        let file: MatrixFile = serde_json::from_str(json).unwrap();
        let m = file.into_matrix().unwrap();
        assert_eq!(m.name(), "gg");
        assert_eq!(m.get(1, 0), Some(4.0));
        assert!(m.calibration(MatrixAxis::X).is_none());
        assert!(m.calibration(MatrixAxis::Y).is_some());
    }

    #[test]
    fn test_bad_shape() {
        let json = r#"{
            "name": "m",
            "x": {"nbins": 2, "min": 0, "max": 2},
            "y": {"nbins": 2, "min": 0, "max": 2},
            "counts": [1]
        }"#;
        let file: MatrixFile = serde_json::from_str(json).unwrap();
        assert!(file.into_matrix().is_err());
    }
}
