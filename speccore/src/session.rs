use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::calibration::list::{parse_cal_list, read_cal_list, CalList};
use crate::calibration::polynomial::Calibration;
use crate::config::SessionConfig;
use crate::cut::engine::{AxisSelector, CutEngine};
use crate::cut::region::RegionMarker;
use crate::data::matrix::MatrixSource;
use crate::data::spectrum::Spectrum;
use crate::error::{CalibrationError, FitError, IdError, SpecError};
use crate::fit::registry::{Fitter, PeakModelRegistry};
use crate::ident::collection::Collection;
use crate::ident::identifier::Identifier;
use crate::ident::selector::{parse_ids, resolve_ids};

/// Loaded spectra together with the calibrations known by spectrum name
/// and the peak models available for fitting.
#[derive(Debug)]
pub struct Session {
    pub spectra: Collection<Spectrum>,
    caldict: BTreeMap<String, Calibration>,
    pub config: SessionConfig,
    models: PeakModelRegistry,
}

impl Session {
    pub fn new(config: SessionConfig, models: PeakModelRegistry) -> Self {
        Session {
            spectra: Collection::new(),
            caldict: BTreeMap::new(),
            config,
            models,
        }
    }

    pub fn models(&self) -> &PeakModelRegistry {
        &self.models
    }

    /// Stores `spectrum`, calibrating it from the calibration list if its
    /// name is known there.
    pub fn add_spectrum(&mut self, mut spectrum: Spectrum) -> Identifier {
        if let Some(cal) = self.caldict.get(spectrum.name()) {
            spectrum.set_calibration(cal.clone());
        }
        self.spectra.add(spectrum)
    }

    /// Resolves a selector expression against the loaded spectra.
    pub fn select(&self, text: &str) -> Result<Vec<Identifier>, IdError> {
        parse_ids(text, &self.spectra, self.config.only_existent)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Identifier> {
        self.spectra.iter().find(|(_, s)| s.name() == name).map(|(id, _)| *id)
    }

    pub fn calibration_for(&self, name: &str) -> Option<&Calibration> {
        self.caldict.get(name)
    }

    /// Sets `cal` on every selected spectrum and returns their ids.
    /// Selected ids without a spectrum are logged and skipped.
    pub fn apply_calibration(
        &mut self,
        cal: &Calibration,
        text: &str,
    ) -> Result<Vec<Identifier>, IdError> {
        let resolution = resolve_ids(text, &self.spectra, false)?;
        let mut applied = Vec::with_capacity(resolution.ids.len());
        for id in resolution.ids {
            match self.spectra.get_mut(&id) {
                Some(spectrum) => {
                    spectrum.set_calibration(cal.clone());
                    self.caldict.insert(spectrum.name().to_string(), cal.clone());
                    applied.push(id);
                }
                None => warn!(%id, "cannot calibrate spectrum, it does not exist"),
            }
        }
        info!(calibration = %cal, count = applied.len(), "applied calibration");
        Ok(applied)
    }

    fn merge_cal_list(&mut self, list: CalList) -> usize {
        let mut applied = 0;
        for (name, cal) in list.entries {
            for (_, spectrum) in self.spectra.iter_mut().filter(|(_, s)| s.name() == name) {
                spectrum.set_calibration(cal.clone());
                applied += 1;
            }
            self.caldict.insert(name, cal);
        }
        applied
    }

    /// Stores the calibrations of a calibration list by name and applies
    /// them to loaded spectra of that name. Returns the number of spectra
    /// calibrated.
    pub fn load_cal_list(&mut self, text: &str) -> usize {
        self.merge_cal_list(parse_cal_list(text))
    }

    pub fn read_cal_list(&mut self, path: &Path) -> Result<usize, CalibrationError> {
        Ok(self.merge_cal_list(read_cal_list(path)?))
    }

    pub fn set_normalization(&mut self, norm: f64, text: &str) -> Result<Vec<Identifier>, IdError> {
        let ids = self.select(text)?;
        for id in &ids {
            if let Some(spectrum) = self.spectra.get_mut(id) {
                spectrum.norm = norm;
            }
        }
        Ok(ids)
    }

    /// Fitter for the configured default peak model and background degree.
    pub fn fitter(&self) -> Result<Fitter, FitError> {
        Fitter::new(&self.models, &self.config.default_peak_model, self.config.background_degree)
    }

    /// Cuts `source`, stores the cut as a new spectrum, and makes it the
    /// active and only visible one.
    pub fn cut<S: MatrixSource + ?Sized>(
        &mut self,
        source: &S,
        regions: &[RegionMarker],
        backgrounds: &[RegionMarker],
        axis: AxisSelector,
    ) -> Result<Identifier, SpecError> {
        let engine = CutEngine::new(self.config.cut.clone());
        let cut = engine.execute(source, regions, backgrounds, axis)?;
        let id = self.spectra.add(Spectrum::from_cut(cut));
        self.spectra.show_only(&id)?;
        Ok(id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(SessionConfig::default(), PeakModelRegistry::with_builtin())
    }
}
