//! Error types used across the worker.

/// Errors produced by the detection library.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Malformed input file (index, topology file, hits table, model definition).
    #[error("invalid input: {0}")]
    Input(String),
    /// A model definition violates its own constraints.
    #[error("model inconsistency: {0}")]
    ModelInconsistency(String),
    /// A programmer error; the run must abort.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// An operation was invoked outside its domain.
    #[error("{0}")]
    Domain(String),
    /// Gene lookup by name failed.
    #[error("model {model} does not contain gene {gene}")]
    NoSuchGene {
        /// Name of the model that was queried.
        model: String,
        /// Name of the gene that could not be found.
        gene: String,
    },
    /// A hit with an unscorable status reached the scoring step.
    #[error("cannot score a hit with status {0}")]
    Scoring(String),
}
