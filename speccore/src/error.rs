use std::path::PathBuf;

use thiserror::Error;

use crate::calibration::position::Space;
use crate::data::matrix::MatrixAxis;
use crate::ident::identifier::Identifier;

/// Failure to parse an identifier selector expression.
///
/// Any of these rejects the whole expression; callers never receive a
/// partially resolved list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// A token is neither a keyword nor a `major[.minor]` literal.
    #[error("invalid identifier '{token}'")]
    Malformed { token: String },

    /// A range token that does not split into exactly two endpoints.
    #[error("invalid range '{token}'")]
    MalformedRange { token: String },

    /// A keyword used as a range endpoint did not resolve to exactly one id.
    #[error("range endpoint '{token}' does not name exactly one identifier")]
    NonSingletonEndpoint { token: String },
}

/// Failure of the cut engine. Invalid input is raised before any projection is done.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CutError {
    #[error("need at least one gate for cut")]
    NoRegions,

    #[error("bad value for axis parameter: '{0}'")]
    BadAxis(String),

    /// A marker position has no channel on the cut axis, e.g. through a
    /// constant calibration.
    #[error("marker {marker} has no channel on the {axis} axis")]
    NonFiniteMarker { marker: String, axis: MatrixAxis },

    /// The source returned a projection that does not fit its own axis.
    #[error(transparent)]
    Projection(#[from] DataError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// The value was set in the space the position is not pinned to.
    #[error("position is fixed in {pinned} space")]
    SpacePinned { pinned: Space },
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error(
        "calibration of degree {degree} needs at least {needed} channel/energy pairs, got {got}"
    )]
    TooFewPairs { degree: usize, needed: usize, got: usize },

    #[error("calibration fit failed: {detail}")]
    FitFailed { detail: String },

    #[error("error opening calibration list '{path}': {source}")]
    ListIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shape problems in histogram and matrix data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("histogram '{name}' has {got} bins, axis expects {expected}")]
    BinCount { name: String, expected: usize, got: usize },

    #[error(
        "cannot combine '{left}' ({left_bins} bins) with '{right}' ({right_bins} bins) binwise"
    )]
    BinMismatch {
        left: String,
        left_bins: usize,
        right: String,
        right_bins: usize,
    },

    #[error("bin ({x}, {y}) is outside of matrix '{name}'")]
    OutOfRange { name: String, x: usize, y: usize },

    #[error("cannot group {nbins} bins by {ngroup}")]
    BadGroup { ngroup: usize, nbins: usize },

    #[error("axis must have at least one bin and min < max (got {nbins} bins, {min}..{max})")]
    BadAxis { nbins: usize, min: f64, max: f64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("there is no object with id {0}")]
    NoSuchId(Identifier),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitError {
    #[error("unknown peak model '{0}'")]
    UnknownModel(String),

    #[error("peak fit failed: {0}")]
    Service(String),
}

/// Umbrella error for operations spanning several concerns.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Cut(#[from] CutError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Fit(#[from] FitError),
}
