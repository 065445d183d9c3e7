use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::calibration::polynomial::{Calibration, CalibrationHandle, ChannelMap};
use crate::cut::engine::CutHistogram;
use crate::data::histogram::{BinAxis, Hist1D};
use crate::data::matrix::MatrixAxis;
use crate::error::DataError;

/// How a spectrum was last modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modification {
    Sum,
    Difference,
    Multiplied,
    Rebinned,
    Calbinned,
}

/// Where a spectrum came from.
#[derive(Clone, Debug, PartialEq)]
pub enum SpectrumKind {
    Plain,
    File { path: PathBuf, format: Option<String> },
    /// Gated projection, gates set on `axis`.
    Cut { axis: MatrixAxis },
    Projection { axis: MatrixAxis },
    Modified(Modification),
}

impl Display for SpectrumKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SpectrumKind::Plain => write!(f, "spectrum"),
            SpectrumKind::File { .. } => write!(f, "spectrum, read from file"),
            SpectrumKind::Cut { axis } => write!(f, "cut on {} axis", axis),
            SpectrumKind::Projection { axis } => write!(f, "{} projection", axis),
            SpectrumKind::Modified(m) => {
                let what = match m {
                    Modification::Sum => "sum",
                    Modification::Difference => "difference",
                    Modification::Multiplied => "multiplied",
                    Modification::Rebinned => "rebinned",
                    Modification::Calbinned => "calbinned",
                };
                write!(f, "spectrum, modified ({})", what)
            }
        }
    }
}

/// One-dimensional spectrum with an optional shared calibration.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub hist: Hist1D,
    cal: Option<CalibrationHandle>,
    pub norm: f64,
    pub kind: SpectrumKind,
}

impl Spectrum {
    pub fn new(hist: Hist1D, cal: Option<CalibrationHandle>) -> Self {
        Spectrum { hist, cal, norm: 1.0, kind: SpectrumKind::Plain }
    }

    pub fn from_file(hist: Hist1D, path: PathBuf, format: Option<String>) -> Self {
        Spectrum { kind: SpectrumKind::File { path, format }, ..Spectrum::new(hist, None) }
    }

    pub fn from_cut(cut: CutHistogram) -> Self {
        Spectrum {
            kind: SpectrumKind::Cut { axis: cut.axis },
            ..Spectrum::new(cut.hist, cut.calibration)
        }
    }

    pub fn name(&self) -> &str {
        &self.hist.name
    }

    pub fn calibration(&self) -> Option<&CalibrationHandle> {
        self.cal.as_ref()
    }

    /// Replaces the calibration in place, so every position observing the
    /// current handle follows. A spectrum without calibration gets a new one.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        match &self.cal {
            Some(handle) => handle.set(calibration),
            None => self.cal = Some(CalibrationHandle::new(calibration)),
        }
    }

    /// Shares `handle` with this spectrum.
    pub fn attach_calibration(&mut self, handle: Option<CalibrationHandle>) {
        self.cal = handle;
    }

    pub fn is_trivially_calibrated(&self) -> bool {
        self.cal.as_ref().is_none_or(|cal| cal.is_trivial())
    }

    pub fn ch_to_e(&self, ch: f64) -> f64 {
        self.cal.as_ref().map_or(ch, |cal| cal.ch_to_e(ch))
    }

    pub fn e_to_ch(&self, e: f64) -> f64 {
        self.cal.as_ref().map_or(e, |cal| cal.e_to_ch(e))
    }

    fn shares_binning(&self, other: &Spectrum) -> bool {
        match (&self.cal, &other.cal) {
            (Some(a), Some(b)) if a.ptr_eq(b) => true,
            _ => self.is_trivially_calibrated() && other.is_trivially_calibrated(),
        }
    }

    fn combine(&mut self, other: &Spectrum, sign: f64) -> Result<(), DataError> {
        if self.shares_binning(other) {
            debug!(this = self.name(), other = other.name(), "combining binwise");
            return self.hist.add_scaled(&other.hist, sign);
        }

        info!(this = self.name(), other = other.name(), "combining calibrated");
        let axis = self.hist.axis;
        let width = axis.width();
        for n in 0..self.hist.nbins() {
            let lo = axis.bin_low_edge(n);
            let from = other.e_to_ch(self.ch_to_e(lo));
            let to = other.e_to_ch(self.ch_to_e(lo + width));
            self.hist.counts[n] += sign * other.hist.integrate_with_partial_bins(from, to);
        }
        Ok(())
    }

    /// Adds `other`. Spectra with different calibrations are added in
    /// energy, integrating `other` over the range of each bin.
    pub fn plus(&mut self, other: &Spectrum) -> Result<(), DataError> {
        self.combine(other, 1.0)?;
        self.kind = SpectrumKind::Modified(Modification::Sum);
        Ok(())
    }

    pub fn minus(&mut self, other: &Spectrum) -> Result<(), DataError> {
        self.combine(other, -1.0)?;
        self.kind = SpectrumKind::Modified(Modification::Difference);
        Ok(())
    }

    pub fn multiply(&mut self, factor: f64) {
        self.hist.scale(factor);
        self.kind = SpectrumKind::Modified(Modification::Multiplied);
    }

    /// Groups `ngroup` bins into one. The calibration is rebinned in place.
    pub fn rebin(&mut self, ngroup: usize) -> Result<(), DataError> {
        self.hist = self.hist.rebin(ngroup)?;
        if let Some(cal) = &self.cal {
            cal.rebin(ngroup);
            info!(name = self.name(), ngroup, "calibration updated for rebinned spectrum");
        }
        self.kind = SpectrumKind::Modified(Modification::Rebinned);
        Ok(())
    }

    /// Rebins to one calibration unit per bin and makes the calibration trivial.
    pub fn calbin(&mut self) -> Result<(), DataError> {
        let first = self.hist.axis.bin_center(0);
        let last = first + self.hist.nbins() as f64 * self.hist.axis.width();
        let (mut lower, mut upper) = (self.ch_to_e(first) as i64, self.ch_to_e(last) as i64);
        if lower > upper {
            std::mem::swap(&mut lower, &mut upper);
        }
        let nbins = (upper - lower).max(1) as usize;
        let axis = BinAxis::new(nbins, lower as f64 - 0.5, (lower + nbins as i64) as f64 - 0.5)?;

        let counts = (0..nbins)
            .map(|i| {
                let e = (lower + i as i64) as f64;
                self.hist.integrate_with_partial_bins(self.e_to_ch(e - 0.5), self.e_to_ch(e + 0.5))
            })
            .collect();
        self.hist = Hist1D::new(self.hist.name.clone(), axis, counts)?;
        if let Some(cal) = &self.cal {
            cal.set(Calibration::trivial());
        }
        info!(name = self.name(), nbins, "rebinned to calibration unit");
        self.kind = SpectrumKind::Modified(Modification::Calbinned);
        Ok(())
    }

    pub fn info(&self) -> String {
        let mut s = format!("Spectrum type: {}\n", self.kind);
        s += &format!("Name: {}\n", self.name());
        s += &format!("Nbins: {}\n", self.hist.nbins());
        let (xmin, xmax) = (self.hist.axis.min, self.hist.axis.max);
        match &self.cal {
            Some(cal) if !cal.is_trivial() => {
                s += &format!("Xmin: {:.2} (cal)  {:.2} (uncal)\n", cal.ch_to_e(xmin), xmin);
                s += &format!("Xmax: {:.2} (cal)  {:.2} (uncal)\n", cal.ch_to_e(xmax), xmax);
                s += &format!("Calibration: Polynomial, degree {}\n", cal.snapshot().degree());
            }
            _ => {
                s += &format!("Xmin: {:.2}\nXmax: {:.2}\n", xmin, xmax);
                s += "Calibration: none\n";
            }
        }
        if let SpectrumKind::File { path, format } = &self.kind {
            s += &format!("Filename: {}\n", path.display());
            s += &format!("File format: {}\n", format.as_deref().unwrap_or("autodetected"));
        }
        s
    }
}

impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
