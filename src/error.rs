use thiserror::Error;

/// Build-level failures. Recoverable conditions (cap hits, sample misses)
/// never surface here — they are reported through the diagnostics channel
/// and the build proceeds with a conservative fallback.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Structural corruption detected while reading the terrain buffers.
    #[error("terrain data invalid: {0}")]
    TerrainInvalid(String),

    /// A per-build timeout or resource cap fired.
    #[error("build budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A numeric guard tripped (e.g. the whole wavefront died at step 0).
    #[error("numeric degeneracy: {0}")]
    NumericDegenerate(String),

    /// The worker executing the build died out of band.
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),
}
