use thiserror::Error;

/// Failure modes produced by the planner, per the error taxonomy of the
/// placement spec (§7). `MissingProfile` is deliberately absent here: a
/// missing `(model, config)` profile entry is coerced to zero capability by
/// [`crate::profile::capability`] rather than raised as an error.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(
        "cannot satisfy the memory budget of {mem_budget_per_device} per device with the given models"
    )]
    InfeasibleBudget { mem_budget_per_device: f64 },

    #[error("required MIP backend is not available: {0}")]
    SolverUnavailable(String),

    #[error("solver hit its {time_limit_secs}s time limit without a feasible incumbent")]
    SolverTimeout { time_limit_secs: u64 },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
