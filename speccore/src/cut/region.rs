use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::calibration::polynomial::{CalibrationHandle, ChannelMap};
use crate::calibration::position::Position;
use crate::data::matrix::{BinRange, MatrixAxis, MatrixSource};
use crate::error::CutError;

/// Which calibration turns a marker position into a channel of the cut axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerReconciliation {
    /// Read the channel the marker position itself derives, through the
    /// calibration it observes.
    #[default]
    AsPinned,
    /// Read the marker in calibrated space and map it into channels with
    /// the calibration of the source's cut axis.
    SourceCalibration,
}

/// Pair of positions delimiting an interval on the cut axis.
#[derive(Clone, Debug)]
pub struct RegionMarker {
    pub p1: Position,
    pub p2: Position,
}

impl RegionMarker {
    pub fn new(p1: Position, p2: Position) -> Self {
        RegionMarker { p1, p2 }
    }

    /// Marker between two channels.
    pub fn from_uncal(ch1: f64, ch2: f64, cal: Option<&CalibrationHandle>) -> Self {
        RegionMarker::new(Position::uncal_pinned(ch1, cal), Position::uncal_pinned(ch2, cal))
    }

    /// Marker between two energies.
    pub fn from_cal(e1: f64, e2: f64, cal: Option<&CalibrationHandle>) -> Self {
        RegionMarker::new(Position::cal_pinned(e1, cal), Position::cal_pinned(e2, cal))
    }

    fn channel(
        position: &Position,
        source_cal: Option<&CalibrationHandle>,
        mode: MarkerReconciliation,
    ) -> f64 {
        match (mode, source_cal) {
            (MarkerReconciliation::SourceCalibration, Some(cal)) => cal.e_to_ch(position.pos_cal()),
            (MarkerReconciliation::SourceCalibration, None) => position.pos_cal(),
            (MarkerReconciliation::AsPinned, _) => position.pos_uncal(),
        }
    }

    /// Inclusive, normalized bin range of the marker on `axis` of `source`.
    ///
    /// Fails if either position maps to a NaN or infinite channel.
    pub fn bin_range<S: MatrixSource + ?Sized>(
        &self,
        source: &S,
        axis: MatrixAxis,
        mode: MarkerReconciliation,
    ) -> Result<BinRange, CutError> {
        let source_cal = source.calibration(axis);
        let c1 = Self::channel(&self.p1, source_cal.as_ref(), mode);
        let c2 = Self::channel(&self.p2, source_cal.as_ref(), mode);
        if !c1.is_finite() || !c2.is_finite() {
            return Err(CutError::NonFiniteMarker { marker: self.to_string(), axis });
        }
        Ok(BinRange::new(source.find_bin(axis, c1), source.find_bin(axis, c2)))
    }
}

impl Display for RegionMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.p1, self.p2)
    }
}
