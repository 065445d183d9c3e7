use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::histogram::Hist1D;
use crate::error::FitError;

/// Peak found by a [`PeakModel`], in the coordinates of the fitted histogram.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedPeak {
    pub position: f64,
    pub volume: f64,
    pub width: f64,
}

impl Display for FittedPeak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "pos: {:.3}, vol: {:.1}, width: {:.3}", self.position, self.volume, self.width)
    }
}

/// Fitting service for one peak shape.
pub trait PeakModel: Send + Sync {
    fn name(&self) -> &str;

    /// Fits peaks in `region` of `hist`.
    ///
    /// # Arguments
    ///
    /// * `region` - fit interval in axis coordinates.
    /// * `peaks` - start positions, one per expected peak.
    /// * `backgrounds` - intervals the background polynomial is fitted to.
    /// * `bg_degree` - degree of the background polynomial.
    fn fit(
        &self,
        hist: &Hist1D,
        region: (f64, f64),
        peaks: &[f64],
        backgrounds: &[(f64, f64)],
        bg_degree: usize,
    ) -> Result<Vec<FittedPeak>, FitError>;
}

/// Named peak models, built once at startup and passed to whoever fits.
#[derive(Clone, Default)]
pub struct PeakModelRegistry {
    models: BTreeMap<String, Arc<dyn PeakModel>>,
}

impl PeakModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in [`CentroidModel`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CentroidModel));
        registry
    }

    /// Adds `model`, replacing any model of the same name.
    pub fn register(&mut self, model: Arc<dyn PeakModel>) -> Option<Arc<dyn PeakModel>> {
        debug!(model = model.name(), "registered peak model");
        self.models.insert(model.name().to_string(), model)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PeakModel>, FitError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| FitError::UnknownModel(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for PeakModelRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeakModelRegistry").field("models", &self.names()).finish()
    }
}

/// A peak model bound to background settings.
#[derive(Clone)]
pub struct Fitter {
    model: Arc<dyn PeakModel>,
    pub bg_degree: usize,
}

impl Fitter {
    pub fn new(
        registry: &PeakModelRegistry,
        model: &str,
        bg_degree: usize,
    ) -> Result<Self, FitError> {
        Ok(Fitter { model: registry.get(model)?, bg_degree })
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn fit(
        &self,
        hist: &Hist1D,
        region: (f64, f64),
        peaks: &[f64],
        backgrounds: &[(f64, f64)],
    ) -> Result<Vec<FittedPeak>, FitError> {
        self.model.fit(hist, region, peaks, backgrounds, self.bg_degree)
    }
}

impl fmt::Debug for Fitter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fitter")
            .field("model", &self.model.name())
            .field("bg_degree", &self.bg_degree)
            .finish()
    }
}

/// Moments of the background subtracted region: one peak at the centroid,
/// with the region's net area as volume and the standard deviation as width.
#[derive(Clone, Copy, Debug, Default)]
pub struct CentroidModel;

fn bins_in(hist: &Hist1D, (a, b): (f64, f64)) -> impl Iterator<Item = (f64, f64)> + '_ {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (0..hist.nbins())
        .map(move |i| (hist.axis.bin_center(i), hist.counts[i]))
        .filter(move |(x, _)| *x >= lo && *x <= hi)
}

fn fit_background(
    hist: &Hist1D,
    backgrounds: &[(f64, f64)],
    degree: usize,
) -> Result<Vec<f64>, FitError> {
    if backgrounds.is_empty() {
        return Ok(Vec::new());
    }
    let points: Vec<(f64, f64)> = backgrounds.iter().flat_map(|r| bins_in(hist, *r)).collect();
    if points.len() < degree + 1 {
        return Err(FitError::Service(format!(
            "background of degree {} needs {} bins, got {}",
            degree,
            degree + 1,
            points.len()
        )));
    }
    let design = DMatrix::from_fn(points.len(), degree + 1, |i, j| points[i].0.powi(j as i32));
    let values = DVector::from_iterator(points.len(), points.iter().map(|p| p.1));
    let solution = design
        .svd(true, true)
        .solve(&values, 1e-12)
        .map_err(|e| FitError::Service(e.to_string()))?;
    Ok(solution.iter().copied().collect())
}

impl PeakModel for CentroidModel {
    fn name(&self) -> &str {
        "centroid"
    }

    fn fit(
        &self,
        hist: &Hist1D,
        region: (f64, f64),
        _peaks: &[f64],
        backgrounds: &[(f64, f64)],
        bg_degree: usize,
    ) -> Result<Vec<FittedPeak>, FitError> {
        let bg = fit_background(hist, backgrounds, bg_degree)?;
        let net: Vec<(f64, f64)> = bins_in(hist, region)
            .map(|(x, c)| (x, c - bg.iter().rev().fold(0.0, |acc, k| acc * x + k)))
            .collect();

        let volume: f64 = net.iter().map(|(_, c)| c).sum();
        if volume <= 0.0 {
            return Err(FitError::Service("no net counts in fit region".to_string()));
        }
        let position = net.iter().map(|(x, c)| x * c).sum::<f64>() / volume;
        let variance = net.iter().map(|(x, c)| (x - position).powi(2) * c).sum::<f64>() / volume;
        Ok(vec![FittedPeak { position, volume, width: variance.max(0.0).sqrt() }])
    }
}
