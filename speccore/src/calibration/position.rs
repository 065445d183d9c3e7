use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::calibration::polynomial::{CalibrationHandle, CalibrationRef, ChannelMap};
use crate::error::PositionError;

/// Coordinate space a [`Position`] is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    /// Calibrated (energy) space.
    Cal,
    /// Raw channel space.
    Uncal,
}

impl Display for Space {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Space::Cal => write!(f, "calibrated"),
            Space::Uncal => write!(f, "uncalibrated"),
        }
    }
}

/// A coordinate fixed in either calibrated or uncalibrated space.
///
/// # Description
///
/// Only the value in the pinned space is stored. The other one is derived
/// through the observed calibration on every read, so recalibrating a
/// spectrum moves positions pinned in channel space in energy (and vice
/// versa) without touching the positions themselves.
///
/// The position does not own its calibration. If every handle to it is
/// dropped, conversions fall back to the identity.
#[derive(Clone, Debug)]
pub struct Position {
    pinned: Space,
    value: f64,
    cal: Option<CalibrationRef>,
}

impl Position {
    /// Creates a new `Position`.
    ///
    /// # Arguments
    ///
    /// * `value` - coordinate in the `pinned` space.
    /// * `pinned` - space the value is authoritative in.
    /// * `cal` - calibration to observe, `None` for the identity.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use speccore::calibration::polynomial::{Calibration, CalibrationHandle};
    /// # use speccore::calibration::position::{Position, Space};
    /// let cal = CalibrationHandle::new(Calibration::new(vec![0.0, 2.0]));
    /// let pos = Position::new(100.0, Space::Cal, Some(&cal));
    /// assert_eq!(pos.pos_uncal(), 50.0);
    /// ```
    pub fn new(value: f64, pinned: Space, cal: Option<&CalibrationHandle>) -> Self {
        Position {
            pinned,
            value,
            cal: cal.map(CalibrationHandle::observe),
        }
    }

    pub fn cal_pinned(value: f64, cal: Option<&CalibrationHandle>) -> Self {
        Position::new(value, Space::Cal, cal)
    }

    pub fn uncal_pinned(value: f64, cal: Option<&CalibrationHandle>) -> Self {
        Position::new(value, Space::Uncal, cal)
    }

    pub fn pinned(&self) -> Space {
        self.pinned
    }

    pub fn is_fixed_in_cal(&self) -> bool {
        self.pinned == Space::Cal
    }

    pub fn calibration(&self) -> Option<CalibrationHandle> {
        self.cal.as_ref().and_then(CalibrationRef::upgrade)
    }

    /// Observe a different calibration. The pinned value is kept as is.
    pub fn set_calibration(&mut self, cal: Option<&CalibrationHandle>) {
        self.cal = cal.map(CalibrationHandle::observe);
    }

    fn ch_to_e(&self, ch: f64) -> f64 {
        match self.calibration() {
            Some(cal) => cal.ch_to_e(ch),
            None => ch,
        }
    }

    fn e_to_ch(&self, e: f64) -> f64 {
        match self.calibration() {
            Some(cal) => cal.e_to_ch(e),
            None => e,
        }
    }

    pub fn pos_cal(&self) -> f64 {
        match self.pinned {
            Space::Cal => self.value,
            Space::Uncal => self.ch_to_e(self.value),
        }
    }

    pub fn pos_uncal(&self) -> f64 {
        match self.pinned {
            Space::Cal => self.e_to_ch(self.value),
            Space::Uncal => self.value,
        }
    }

    pub fn set_pos_cal(&mut self, value: f64) -> Result<(), PositionError> {
        match self.pinned {
            Space::Cal => {
                self.value = value;
                Ok(())
            }
            Space::Uncal => Err(PositionError::SpacePinned { pinned: Space::Uncal }),
        }
    }

    pub fn set_pos_uncal(&mut self, value: f64) -> Result<(), PositionError> {
        match self.pinned {
            Space::Uncal => {
                self.value = value;
                Ok(())
            }
            Space::Cal => Err(PositionError::SpacePinned { pinned: Space::Cal }),
        }
    }

    /// Re-pins in calibrated space, keeping the current calibrated value.
    pub fn fix_in_cal(&mut self) {
        if self.pinned == Space::Uncal {
            self.value = self.pos_cal();
            self.pinned = Space::Cal;
        }
    }

    /// Re-pins in uncalibrated space, keeping the current channel value.
    pub fn fix_in_uncal(&mut self) {
        if self.pinned == Space::Cal {
            self.value = self.pos_uncal();
            self.pinned = Space::Uncal;
        }
    }

    pub fn fix_in(&mut self, space: Space) {
        match space {
            Space::Cal => self.fix_in_cal(),
            Space::Uncal => self.fix_in_uncal(),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.pinned {
            Space::Cal => write!(f, "Cal: {}", self.value),
            Space::Uncal => write!(f, "Uncal: {}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::polynomial::Calibration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_identity_without_calibration() {
        let pos = Position::uncal_pinned(42.5, None);
        assert_eq!(pos.pos_cal(), 42.5);
        assert_eq!(pos.pos_uncal(), 42.5);
    }

    #[test]
    fn test_set_in_wrong_space_fails() {
        let mut pos = Position::cal_pinned(10.0, None);
        assert_eq!(pos.set_pos_uncal(3.0), Err(PositionError::SpacePinned { pinned: Space::Cal }));
        assert!(pos.set_pos_cal(12.0).is_ok());
        assert_eq!(pos.pos_cal(), 12.0);

        pos.fix_in_uncal();
        assert!(pos.set_pos_uncal(3.0).is_ok());
        assert!(pos.set_pos_cal(3.0).is_err());
    }

    #[test]
    fn test_derived_value_follows_calibration() {
        let cal = CalibrationHandle::new(Calibration::new(vec![0.0, 1.0]));
        let in_channels = Position::uncal_pinned(100.0, Some(&cal));
        let in_energy = Position::cal_pinned(100.0, Some(&cal));

        cal.set(Calibration::new(vec![5.0, 0.5]));
        assert_eq!(in_channels.pos_uncal(), 100.0);
        assert_eq!(in_channels.pos_cal(), 55.0);
        assert_eq!(in_energy.pos_cal(), 100.0);
        assert_eq!(in_energy.pos_uncal(), 190.0);
    }

    #[test]
    fn test_fix_is_idempotent() {
        let cal = CalibrationHandle::new(Calibration::new(vec![1.0, 3.0]));
        let mut pos = Position::cal_pinned(31.0, Some(&cal));
        pos.fix_in_cal();
        assert_eq!(pos.pinned(), Space::Cal);
        assert_eq!(pos.pos_cal(), 31.0);
        pos.fix_in_uncal();
        pos.fix_in_uncal();
        assert_eq!(pos.pinned(), Space::Uncal);
        assert!((pos.pos_uncal() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_through_uncal() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let coeffs =
                vec![rng.gen_range(-10.0..10.0), rng.gen_range(0.1..2.0), rng.gen_range(0.0..1e-5)];
            let cal = CalibrationHandle::new(Calibration::new(coeffs));
            let e = rng.gen_range(0.0..3000.0);
            let mut pos = Position::cal_pinned(e, Some(&cal));
            pos.fix_in_uncal();
            pos.fix_in_cal();
            assert!((pos.pos_cal() - e).abs() < 1e-6, "{} drifted to {}", e, pos.pos_cal());
        }
    }

    #[test]
    fn test_dropped_calibration_reads_identity() {
        let cal = CalibrationHandle::new(Calibration::new(vec![0.0, 2.0]));
        let pos = Position::uncal_pinned(4.0, Some(&cal));
        assert_eq!(pos.pos_cal(), 8.0);
        drop(cal);
        assert_eq!(pos.pos_cal(), 4.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Position::cal_pinned(1.5, None).to_string(), "Cal: 1.5");
        assert_eq!(Position::uncal_pinned(2.0, None).to_string(), "Uncal: 2");
    }
}
