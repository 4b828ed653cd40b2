use thiserror::Error;

/// Failure kinds surfaced by the controller. `run_epoch` never returns
/// these across its boundary; operational failures are converted to a
/// `false` return plus a recorded reason in state.
#[derive(Error, Debug)]
pub enum PegError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("failed to fetch price from oracle")]
    OracleUnavailable,
    #[error("oracle price is stale (age {age_seconds}s, max {max_age_seconds}s)")]
    OracleStale {
        age_seconds: u64,
        max_age_seconds: u64,
    },
    #[error("ledger reported invalid total supply {0}")]
    SupplyInvalid(i128),
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("cannot enable peg while circuit breaker is latched")]
    CircuitBreakerLatched,
}
