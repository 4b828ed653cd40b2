//! Configuration, state, event, and bond records for the peg
//! controller. Persisted records serialize through [`crate::codec`].

use std::fmt;

use crate::math::TARGET_PRICE;

/// Controller configuration. All rates and thresholds are scaled by
/// `PPM_SCALE`; amounts are smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PegConfig {
    /// Master switch; when false, epochs succeed as no-ops.
    pub enabled: bool,

    /// Time-based epoch cadence (informational; the scheduler-supplied
    /// epoch id is authoritative).
    pub epoch_seconds: u64,
    /// Block-based epoch cadence, used when `use_block_epochs` is set.
    pub epoch_blocks: u64,
    pub use_block_epochs: bool,

    /// No action inside this band around the target (10_000 = 1%).
    pub deadband_ppm: i64,
    /// Proportional gain (50_000 = k of 0.05).
    pub k_ppm: i64,
    /// Integral gain; zero together with `kd_ppm` selects
    /// pure-proportional mode.
    pub ki_ppm: i64,
    /// Derivative gain.
    pub kd_ppm: i64,

    /// Per-epoch cap on expansion as a fraction of supply.
    pub max_expansion_ppm: i64,
    /// Per-epoch cap on contraction as a fraction of supply.
    pub max_contraction_ppm: i64,

    /// A price older than this is rejected as stale.
    pub oracle_max_age_seconds: u64,
    /// Deviation beyond this latches the circuit breaker.
    pub circuit_breaker_ppm: i64,

    /// Upper bound on cumulative outstanding bond debt (0 = unbounded).
    pub max_bond_debt: i128,
    /// Clamp on the integral accumulator (0 = unbounded).
    pub max_integral: i128,
    /// Epochs until an issued bond matures.
    pub bond_maturity_epochs: u64,
    /// Discount rate recorded on issued bonds.
    pub bond_discount_ppm: i64,

    /// Protocol-owned address: expansion destination and contraction
    /// source.
    pub treasury_address: String,
}

impl Default for PegConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            epoch_seconds: 3_600,
            epoch_blocks: 600,
            use_block_epochs: false,
            deadband_ppm: 10_000,
            k_ppm: 50_000,
            ki_ppm: 0,
            kd_ppm: 0,
            max_expansion_ppm: 50_000,
            max_contraction_ppm: 50_000,
            oracle_max_age_seconds: 600,
            circuit_breaker_ppm: 500_000,
            max_bond_debt: 0,
            max_integral: 0,
            bond_maturity_epochs: 30,
            bond_discount_ppm: 50_000,
            treasury_address: String::new(),
        }
    }
}

/// Outcome recorded for an epoch or operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PegAction {
    Disabled,
    Deadband,
    Expand,
    Contract,
    None,
    Error,
    CircuitBreaker,
    EmergencyStop,
    CircuitBreakerReset,
}

impl PegAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PegAction::Disabled => "disabled",
            PegAction::Deadband => "deadband",
            PegAction::Expand => "expand",
            PegAction::Contract => "contract",
            PegAction::None => "none",
            PegAction::Error => "error",
            PegAction::CircuitBreaker => "circuit_breaker",
            PegAction::EmergencyStop => "emergency_stop",
            PegAction::CircuitBreakerReset => "circuit_breaker_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "disabled" => PegAction::Disabled,
            "deadband" => PegAction::Deadband,
            "expand" => PegAction::Expand,
            "contract" => PegAction::Contract,
            "none" => PegAction::None,
            "error" => PegAction::Error,
            "circuit_breaker" => PegAction::CircuitBreaker,
            "emergency_stop" => PegAction::EmergencyStop,
            "circuit_breaker_reset" => PegAction::CircuitBreakerReset,
            _ => return None,
        })
    }
}

impl fmt::Display for PegAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller state, persisted after every epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PegState {
    pub epoch_id: u64,
    pub timestamp: u64,
    pub block_height: u64,

    /// Latest accepted oracle price.
    pub last_price_scaled: i64,

    pub last_supply: i128,
    /// Positive = expansion, negative = contraction.
    pub last_delta: i128,

    pub total_bond_debt: i128,
    pub bonds_issued_this_epoch: i128,
    pub bonds_redeemed_this_epoch: i128,

    /// PID accumulator; updated only when integral/derivative gains
    /// are active.
    pub integral: i128,
    pub prev_error_scaled: i64,

    pub last_action: PegAction,
    pub last_reason: String,
    pub circuit_breaker_triggered: bool,
}

impl Default for PegState {
    fn default() -> Self {
        Self {
            epoch_id: 0,
            timestamp: 0,
            block_height: 0,
            last_price_scaled: TARGET_PRICE,
            last_supply: 0,
            last_delta: 0,
            total_bond_debt: 0,
            bonds_issued_this_epoch: 0,
            bonds_redeemed_this_epoch: 0,
            integral: 0,
            prev_error_scaled: 0,
            last_action: PegAction::None,
            last_reason: String::new(),
            circuit_breaker_triggered: false,
        }
    }
}

/// Audit-trail entry, written once per acting or dead-band epoch and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PegEvent {
    pub epoch_id: u64,
    pub timestamp: u64,
    pub block_height: u64,
    pub price_scaled: i64,
    pub supply: i128,
    pub delta: i128,
    pub action: PegAction,
    pub reason: String,
}

/// Contraction debt that could not be satisfied from treasury.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondState {
    pub bond_id: u64,
    pub amount: i128,
    pub issued_epoch: u64,
    pub maturity_epoch: u64,
    pub discount_rate_ppm: i64,
}
