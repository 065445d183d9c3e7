use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IdError;

static LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("identifier literal pattern is valid")
});

/// Two-level key addressing one managed object (spectrum, fit, cut).
///
/// # Description
///
/// Spectra are usually addressed by `major` alone, objects living below a
/// spectrum (fits, cuts) by `major.minor`. Both levels are non-negative,
/// which the unsigned representation guarantees.
///
/// Ordering is lexicographic on `(major, minor)` with an absent level
/// sorting below any present one, so `2 < 2.0 < 2.7 < 3`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Identifier {
    pub major: Option<u32>,
    pub minor: Option<u32>,
}

impl Identifier {
    /// Creates a new `Identifier`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use speccore::ident::identifier::Identifier;
    /// let id = Identifier::new(Some(3), Some(1));
    /// assert_eq!(id.to_string(), "3.1");
    /// ```
    pub fn new(major: Option<u32>, minor: Option<u32>) -> Self {
        Identifier { major, minor }
    }

    /// Identifier with only a major level, as used for spectra.
    pub fn major(major: u32) -> Self {
        Identifier { major: Some(major), minor: None }
    }

    pub fn child(major: u32, minor: u32) -> Self {
        Identifier { major: Some(major), minor: Some(minor) }
    }

    /// True if both levels are present.
    pub fn is_complete(&self) -> bool {
        self.major.is_some() && self.minor.is_some()
    }

    /// Numeric rendering, `major + minor / 10`.
    ///
    /// Only meant for display sorting in tables, it is not injective.
    pub fn as_f64(&self) -> f64 {
        let major = self.major.map(f64::from).unwrap_or(0.0);
        let minor = self.minor.map(f64::from).unwrap_or(0.0);
        major + minor / 10.0
    }
}

impl From<u32> for Identifier {
    fn from(major: u32) -> Self {
        Identifier::major(major)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.major, self.minor) {
            (Some(major), Some(minor)) => write!(f, "{}.{}", major, minor),
            (Some(major), None) => write!(f, "{}", major),
            (None, Some(minor)) => write!(f, ".{}", minor),
            (None, None) => Ok(()),
        }
    }
}

impl FromStr for Identifier {
    type Err = IdError;

    /// Parses a `"<major>"` or `"<major>.<minor>"` literal. Keywords are
    /// handled by the selector parser, not here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdError::Malformed { token: s.to_string() };
        let caps = LITERAL.captures(s.trim()).ok_or_else(malformed)?;

        let major = caps[1].parse::<u32>().map_err(|_| malformed())?;
        let minor = match caps.get(2) {
            Some(m) => Some(m.as_str().parse::<u32>().map_err(|_| malformed())?),
            None => None,
        };
        Ok(Identifier::new(Some(major), minor))
    }
}
