use serde::{Deserialize, Serialize};

use crate::cut::region::MarkerReconciliation;

/// Configuration for gated cuts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutConfig {
    /// How marker positions are turned into channels of the cut axis (default: as pinned)
    pub reconciliation: MarkerReconciliation,
    /// Appended to the source name to name the cut (default: "_cut")
    pub name_suffix: String,
}

impl Default for CutConfig {
    fn default() -> Self {
        CutConfig {
            reconciliation: MarkerReconciliation::AsPinned,
            name_suffix: "_cut".to_string(),
        }
    }
}

/// Configuration for a [`crate::session::Session`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cut: CutConfig,
    /// Drop identifiers that are not live when resolving selectors (default: true)
    pub only_existent: bool,
    /// Peak model used by new fitters (default: "centroid")
    pub default_peak_model: String,
    /// Degree of the background polynomial of new fitters (default: 1)
    pub background_degree: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            cut: CutConfig::default(),
            only_existent: true,
            default_peak_model: "centroid".to_string(),
            background_degree: 1,
        }
    }
}
