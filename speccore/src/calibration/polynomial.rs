use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

const NEWTON_MAX_ITER: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-10;

/// Bidirectional channel <-> energy mapping.
pub trait ChannelMap {
    fn ch_to_e(&self, ch: f64) -> f64;
    fn e_to_ch(&self, e: f64) -> f64;
    fn is_trivial(&self) -> bool;
}

/// Energy calibration `E(ch) = c0 + c1*ch + c2*ch^2 + ...`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    coefficients: Vec<f64>,
}

impl Calibration {
    /// Creates a new `Calibration` from polynomial coefficients, lowest order first.
    ///
    /// Trailing zero coefficients are dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use speccore::calibration::polynomial::{Calibration, ChannelMap};
    /// let cal = Calibration::new(vec![10.0, 0.5]);
    /// assert_eq!(cal.ch_to_e(100.0), 60.0);
    /// assert_eq!(cal.e_to_ch(60.0), 100.0);
    /// ```
    pub fn new(mut coefficients: Vec<f64>) -> Self {
        while coefficients.last() == Some(&0.0) {
            coefficients.pop();
        }
        Calibration { coefficients }
    }

    /// The identity calibration.
    pub fn trivial() -> Self {
        Calibration::new(vec![0.0, 1.0])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Degree of the polynomial; 0 for constant or empty calibrations.
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    fn derivative(&self, ch: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * ch + i as f64 * c)
    }

    /// Rewrites the calibration for a spectrum whose bins were grouped by `ngroup`.
    ///
    /// New channel `k` spans old channels `ngroup*k .. ngroup*k + ngroup - 1`,
    /// so its centre sits at old channel `ngroup*k + (ngroup - 1) / 2`.
    pub fn rebin(&mut self, ngroup: usize) {
        if ngroup <= 1 || self.coefficients.is_empty() {
            return;
        }
        let a = ngroup as f64;
        let b = (ngroup as f64 - 1.0) / 2.0;
        self.coefficients = substitute_linear(&self.coefficients, a, b);
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration::trivial()
    }
}

/// Coefficients of `p(a*x + b)` given those of `p(x)`.
fn substitute_linear(coefficients: &[f64], a: f64, b: f64) -> Vec<f64> {
    let n = coefficients.len();
    let mut out = vec![0.0; n];
    // Horner over polynomials: acc = acc * (a*x + b) + c_i
    for &c in coefficients.iter().rev() {
        let mut next = vec![0.0; n];
        for (k, &v) in out.iter().enumerate() {
            next[k] += v * b;
            if k + 1 < n {
                next[k + 1] += v * a;
            }
        }
        next[0] += c;
        out = next;
    }
    out
}

impl ChannelMap for Calibration {
    fn ch_to_e(&self, ch: f64) -> f64 {
        if self.coefficients.is_empty() {
            return ch;
        }
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * ch + c)
    }

    /// Analytic for linear calibrations, Newton iteration starting from the
    /// linear approximation otherwise.
    fn e_to_ch(&self, e: f64) -> f64 {
        match self.coefficients.as_slice() {
            [] => e,
            // constant calibrations have no inverse
            [_] => f64::NAN,
            [c0, c1] => (e - c0) / c1,
            [c0, c1, ..] => {
                let mut ch = (e - c0) / c1;
                for _ in 0..NEWTON_MAX_ITER {
                    let slope = self.derivative(ch);
                    if slope == 0.0 {
                        break;
                    }
                    let step = (self.ch_to_e(ch) - e) / slope;
                    ch -= step;
                    if step.abs() < NEWTON_TOLERANCE {
                        break;
                    }
                }
                ch
            }
        }
    }

    fn is_trivial(&self) -> bool {
        match self.coefficients.as_slice() {
            [] => true,
            [c0, c1] => *c0 == 0.0 && *c1 == 1.0,
            _ => false,
        }
    }
}

impl Display for Calibration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coefficients.iter().join(" "))
    }
}

/// A calibration shared between a spectrum and everything positioned on it.
///
/// Mutations through any handle are seen by every holder, including
/// [`Position`](crate::calibration::position::Position)s observing it
/// through a [`CalibrationRef`].
#[derive(Clone, Debug)]
pub struct CalibrationHandle(Arc<RwLock<Calibration>>);

impl CalibrationHandle {
    pub fn new(calibration: Calibration) -> Self {
        CalibrationHandle(Arc::new(RwLock::new(calibration)))
    }

    /// Copy of the current calibration.
    pub fn snapshot(&self) -> Calibration {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the calibration in place.
    pub fn set(&self, calibration: Calibration) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = calibration;
    }

    pub fn rebin(&self, ngroup: usize) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).rebin(ngroup);
    }

    /// Non-owning observer of this calibration.
    pub fn observe(&self) -> CalibrationRef {
        CalibrationRef(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &CalibrationHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Calibration> for CalibrationHandle {
    fn from(calibration: Calibration) -> Self {
        CalibrationHandle::new(calibration)
    }
}

impl ChannelMap for CalibrationHandle {
    fn ch_to_e(&self, ch: f64) -> f64 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).ch_to_e(ch)
    }

    fn e_to_ch(&self, e: f64) -> f64 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).e_to_ch(e)
    }

    fn is_trivial(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_trivial()
    }
}

/// Weak reference to a [`CalibrationHandle`].
#[derive(Clone, Debug)]
pub struct CalibrationRef(Weak<RwLock<Calibration>>);

impl CalibrationRef {
    /// The observed calibration, or `None` once every handle is dropped.
    pub fn upgrade(&self) -> Option<CalibrationHandle> {
        self.0.upgrade().map(CalibrationHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_round_trip() {
        let cal = Calibration::new(vec![1.5, 0.25]);
        for ch in [0.0, 17.0, 4096.5] {
            assert!((cal.e_to_ch(cal.ch_to_e(ch)) - ch).abs() < 1e-9);
        }
    }

    #[test]
    fn test_quadratic_newton() {
        let cal = Calibration::new(vec![2.0, 0.5, 1e-5]);
        let e = cal.ch_to_e(1234.0);
        assert!((cal.e_to_ch(e) - 1234.0).abs() < 1e-6);
    }

    #[test]
    fn test_trivial() {
        assert!(Calibration::trivial().is_trivial());
        assert!(Calibration::new(vec![]).is_trivial());
        assert!(Calibration::new(vec![0.0, 1.0, 0.0]).is_trivial());
        assert!(!Calibration::new(vec![0.0, 2.0]).is_trivial());
    }

    #[test]
    fn test_rebin_keeps_energy_of_grouped_channels() {
        let mut cal = Calibration::new(vec![3.0, 0.5, 2e-4]);
        let original = cal.clone();
        cal.rebin(4);
        // new channel 10 is centred on old channel 41.5
        assert!((cal.ch_to_e(10.0) - original.ch_to_e(41.5)).abs() < 1e-9);
        assert_eq!(cal.degree(), 2);
    }

    #[test]
    fn test_handle_mutation_is_shared() {
        let handle = CalibrationHandle::new(Calibration::trivial());
        let other = handle.clone();
        let observer = handle.observe();
        other.set(Calibration::new(vec![0.0, 2.0]));
        assert_eq!(handle.ch_to_e(5.0), 10.0);
        assert_eq!(observer.upgrade().map(|h| h.ch_to_e(1.0)), Some(2.0));
        assert!(handle.ptr_eq(&other));
    }

    #[test]
    fn test_observer_outlived() {
        let observer = CalibrationHandle::new(Calibration::trivial()).observe();
        assert!(observer.upgrade().is_none());
    }
}
