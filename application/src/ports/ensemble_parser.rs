//! Ensemble Parser port.
//!
//! Defines how raw YAML text becomes a validated `Ensemble`. The default
//! implementation (serde_yaml decode + hand-written validation) lives in
//! `conductor-infrastructure::parser`.

use conductor_domain::{ConductorError, Ensemble};
use std::collections::HashSet;

/// Port for parsing and validating ensemble documents.
pub trait EnsembleParserPort: Send + Sync {
    /// Decode `yaml` into a validated `Ensemble`. Schema and domain-rule
    /// errors (§4.2 steps 1-3) are surfaced as `ConductorError::EnsembleParse`.
    fn parse(&self, yaml: &str) -> Result<Ensemble, ConductorError>;

    /// Scan `ensemble.flow[*].agent` (version-stripped) against
    /// `available_names` and fail with the list of anything missing
    /// (§4.2 step 5 / testable property 11).
    fn validate_agent_references(
        &self,
        ensemble: &Ensemble,
        available_names: &HashSet<String>,
    ) -> Result<(), ConductorError>;
}
