use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Equidistant binning of one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BinAxis {
    pub nbins: usize,
    pub min: f64,
    pub max: f64,
}

impl BinAxis {
    pub fn new(nbins: usize, min: f64, max: f64) -> Result<Self, DataError> {
        if nbins == 0 || !(min < max) {
            return Err(DataError::BadAxis { nbins, min, max });
        }
        Ok(BinAxis { nbins, min, max })
    }

    /// `nbins` channels with bin `i` centred on channel `i`.
    pub fn channels(nbins: usize) -> Self {
        BinAxis { nbins, min: -0.5, max: nbins as f64 - 0.5 }
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.nbins as f64
    }

    /// Index of the bin containing `x`, bins being closed on the left.
    ///
    /// Coordinates below the axis give the underflow bin `-1`, coordinates
    /// from `max` up the overflow bin `nbins`. NaN counts as underflow.
    pub fn find_bin(&self, x: f64) -> i64 {
        let bin = ((x - self.min) / self.width()).floor();
        if bin.is_nan() || bin < 0.0 {
            -1
        } else if bin >= self.nbins as f64 {
            self.nbins as i64
        } else {
            bin as i64
        }
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.width()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.width()
    }

    /// Restricts the inclusive bin range `first..=last` to bins on the axis.
    pub fn clamp(&self, first: i64, last: i64) -> Option<(usize, usize)> {
        let lo = first.max(0);
        let hi = last.min(self.nbins as i64 - 1);
        if lo > hi {
            return None;
        }
        Some((lo as usize, hi as usize))
    }
}

/// One-dimensional histogram.
///
/// Bin errors are not tracked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Hist1D {
    pub name: String,
    pub axis: BinAxis,
    pub counts: Vec<f64>,
}

impl Hist1D {
    pub fn new(
        name: impl Into<String>,
        axis: BinAxis,
        counts: Vec<f64>,
    ) -> Result<Self, DataError> {
        let name = name.into();
        if counts.len() != axis.nbins {
            return Err(DataError::BinCount { name, expected: axis.nbins, got: counts.len() });
        }
        Ok(Hist1D { name, axis, counts })
    }

    pub fn zeros(name: impl Into<String>, axis: BinAxis) -> Self {
        Hist1D { name: name.into(), axis, counts: vec![0.0; axis.nbins] }
    }

    /// Histogram over channels `0..counts.len()`.
    pub fn from_channels(name: impl Into<String>, counts: Vec<f64>) -> Self {
        Hist1D { name: name.into(), axis: BinAxis::channels(counts.len()), counts }
    }

    pub fn nbins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Adds `factor * other` bin by bin.
    pub fn add_scaled(&mut self, other: &Hist1D, factor: f64) -> Result<(), DataError> {
        if other.nbins() != self.nbins() {
            return Err(DataError::BinMismatch {
                left: self.name.clone(),
                left_bins: self.nbins(),
                right: other.name.clone(),
                right_bins: other.nbins(),
            });
        }
        for (c, o) in self.counts.iter_mut().zip(other.counts.iter()) {
            *c += factor * o;
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        self.counts.iter_mut().for_each(|c| *c *= factor);
    }

    /// Sum of contents between axis coordinates `lo` and `hi`, bins cut by
    /// a bound contributing in proportion to their overlap.
    pub fn integrate_with_partial_bins(&self, lo: f64, hi: f64) -> f64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let width = self.axis.width();
        let (first, last) = (self.axis.find_bin(lo), self.axis.find_bin(hi));
        let Some((first, last)) = self.axis.clamp(first, last) else {
            return 0.0;
        };
        (first..=last)
            .map(|bin| {
                let left = self.axis.bin_low_edge(bin);
                let overlap = (hi.min(left + width) - lo.max(left)).max(0.0);
                self.counts[bin] * overlap / width
            })
            .sum()
    }

    /// Groups `ngroup` adjacent bins into one; a trailing incomplete group is
    /// dropped. The new axis spans `0..nbins/ngroup` around integer channels.
    ///
    /// `ngroup` must lie in `1..=nbins`.
    pub fn rebin(&self, ngroup: usize) -> Result<Hist1D, DataError> {
        if ngroup == 0 || ngroup > self.nbins() {
            return Err(DataError::BadGroup { ngroup, nbins: self.nbins() });
        }
        let counts: Vec<f64> = self
            .counts
            .chunks_exact(ngroup)
            .map(|chunk| chunk.iter().sum::<f64>())
            .collect();
        Ok(Hist1D::from_channels(self.name.clone(), counts))
    }
}

impl Display for Hist1D {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hist1D(name: {}, bins: {}, range: {}..{}, total: {})",
            self.name,
            self.nbins(),
            self.axis.min,
            self.axis.max,
            self.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_bin_floor() {
        let axis = BinAxis::new(10, 0.0, 20.0).unwrap();
        assert_eq!(axis.find_bin(0.0), 0);
        assert_eq!(axis.find_bin(1.99), 0);
        assert_eq!(axis.find_bin(2.0), 1);
        assert_eq!(axis.find_bin(-0.1), -1);
        assert_eq!(axis.find_bin(20.0), 10);
    }

    #[test]
    fn test_find_bin_sentinels() {
        let axis = BinAxis::channels(10);
        assert_eq!(axis.find_bin(-1e300), -1);
        assert_eq!(axis.find_bin(f64::NEG_INFINITY), -1);
        assert_eq!(axis.find_bin(1e300), 10);
        assert_eq!(axis.find_bin(f64::INFINITY), 10);
        assert_eq!(axis.find_bin(f64::NAN), -1);
        assert_eq!(axis.find_bin(9.49), 9);
    }

    #[test]
    fn test_channel_axis() {
        let axis = BinAxis::channels(8);
        assert_eq!(axis.find_bin(3.0), 3);
        assert_eq!(axis.find_bin(3.49), 3);
        assert_eq!(axis.bin_center(5), 5.0);
    }

    #[test]
    fn test_bad_axis() {
        assert!(BinAxis::new(0, 0.0, 1.0).is_err());
        assert!(BinAxis::new(3, 1.0, 1.0).is_err());
        assert!(Hist1D::new("h", BinAxis::channels(3), vec![1.0]).is_err());
    }

    #[test]
    fn test_clamp() {
        let axis = BinAxis::channels(5);
        assert_eq!(axis.clamp(-3, 2), Some((0, 2)));
        assert_eq!(axis.clamp(3, 9), Some((3, 4)));
        assert_eq!(axis.clamp(6, 9), None);
    }

    #[test]
    fn test_partial_bins() {
        let h = Hist1D::from_channels("h", vec![10.0, 20.0, 30.0, 40.0]);
        // channel 1 spans 0.5..1.5
        assert!((h.integrate_with_partial_bins(0.5, 1.5) - 20.0).abs() < 1e-12);
        assert!((h.integrate_with_partial_bins(1.0, 2.0) - 25.0).abs() < 1e-12);
        assert!((h.integrate_with_partial_bins(2.0, 1.0) - 25.0).abs() < 1e-12);
        assert!((h.integrate_with_partial_bins(-10.0, 10.0) - 100.0).abs() < 1e-12);
        assert_eq!(h.integrate_with_partial_bins(10.0, 12.0), 0.0);
    }

    #[test]
    fn test_add_scaled() {
        let mut a = Hist1D::from_channels("a", vec![1.0, 2.0]);
        let b = Hist1D::from_channels("b", vec![4.0, 8.0]);
        a.add_scaled(&b, -0.5).unwrap();
        assert_eq!(a.counts, vec![-1.0, -2.0]);
        let c = Hist1D::from_channels("c", vec![1.0]);
        assert!(a.add_scaled(&c, 1.0).is_err());
    }

    #[test]
    fn test_rebin() {
        let h = Hist1D::from_channels("h", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let r = h.rebin(2).unwrap();
        assert_eq!(r.counts, vec![3.0, 7.0]);
        assert_eq!(r.axis, BinAxis::channels(2));
        assert!(h.rebin(0).is_err());
        assert_eq!(h.rebin(5).unwrap().counts, vec![15.0]);
    }

    #[test]
    fn test_rebin_group_larger_than_histogram() {
        let h = Hist1D::from_channels("h", vec![1.0, 2.0, 3.0]);
        assert_eq!(h.rebin(5), Err(DataError::BadGroup { ngroup: 5, nbins: 3 }));
    }

    #[test]
    fn test_empty_channels() {
        let h = Hist1D::from_channels("h", vec![]);
        assert_eq!(h.nbins(), 0);
        assert_eq!(h.axis.nbins, 0);
        assert_eq!(h.integrate_with_partial_bins(0.0, 3.0), 0.0);
        assert!(h.rebin(1).is_err());
    }
}
