//! Engine configuration.

use calcgraph_core::UNAUTHORIZED_TOKEN;

/// Tunables for an [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum dependents one propagation may visit. Default: 100 000.
    pub max_propagation_visits: usize,
    /// Formula given to nodes provisioned for empty entity slots. Default: `"0"`.
    pub default_formula: String,
    /// Token returned in place of a masked value. Default: `#AUTH!`.
    pub unauthorized_token: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_propagation_visits: 100_000,
            default_formula: "0".to_string(),
            unauthorized_token: UNAUTHORIZED_TOKEN.to_string(),
        }
    }
}
