//! The epoch state machine.
//!
//! `run_epoch` is the single entry point the scheduler drives. Under
//! one internal mutex it fetches and validates the oracle price,
//! computes a capped supply delta in scaled-integer arithmetic,
//! executes it through the ledger port, and persists state plus an
//! audit event. Operational failures never cross the boundary as
//! errors; they become a `false` return with the reason recorded in
//! state. Only an extreme price deviation or an operator
//! `emergency_stop` latches the circuit breaker.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};
use unita_ledger::{Ledger, LedgerError};
use unita_oracle::Oracle;
use unita_storage::KvStore;
use unita_types::address::is_valid_address;

use crate::error::PegError;
use crate::math::{deviation_ppm, scaled_mul, PPM_SCALE, PRICE_SCALE, TARGET_PRICE};
use crate::state::{BondState, PegAction, PegConfig, PegEvent, PegState};
use crate::store::{PegStore, PegStoreError};

const MAX_EVENT_QUERY: usize = 1_000;

struct Inner {
    config: PegConfig,
    state: PegState,
}

pub struct PegController {
    ledger: Arc<dyn Ledger>,
    oracle: Arc<dyn Oracle>,
    store: PegStore,
    inner: Mutex<Inner>,
}

impl PegController {
    /// Build a controller, restoring persisted state when present.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        oracle: Arc<dyn Oracle>,
        kv: Arc<dyn KvStore>,
        config: PegConfig,
    ) -> Result<Self, PegError> {
        validate_config(&config)?;

        let store = PegStore::new(kv);
        let state = match store.load_state() {
            Ok(Some(state)) => {
                info!(epoch_id = state.epoch_id, "peg controller restored persisted state");
                state
            }
            Ok(None) => {
                info!("peg controller starting with fresh state");
                PegState::default()
            }
            Err(err) => return Err(PegError::PersistenceFailed(err.to_string())),
        };

        info!(
            enabled = config.enabled,
            k_ppm = config.k_ppm,
            deadband_ppm = config.deadband_ppm,
            "peg controller created"
        );

        Ok(Self {
            ledger,
            oracle,
            store,
            inner: Mutex::new(Inner { config, state }),
        })
    }

    /// Execute one epoch. Returns `false` on oracle, supply, ledger,
    /// or persistence failure; the failure reason lands in state.
    pub fn run_epoch(&self, epoch_id: u64, block_height: u64, timestamp: u64) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        // Replayed or out-of-order epoch ids are idempotent no-ops so
        // a retrying scheduler cannot double-apply an epoch.
        if epoch_id <= inner.state.epoch_id {
            debug!(
                epoch_id,
                current_epoch = inner.state.epoch_id,
                "ignoring replayed epoch id"
            );
            return true;
        }

        let snapshot = inner.state.clone();

        inner.state.epoch_id = epoch_id;
        inner.state.block_height = block_height;
        inner.state.timestamp = timestamp;
        inner.state.bonds_issued_this_epoch = 0;
        inner.state.bonds_redeemed_this_epoch = 0;

        if !inner.config.enabled {
            inner.state.last_action = PegAction::Disabled;
            inner.state.last_reason =
                "peg mechanism is disabled in configuration".to_string();
            return self.commit_state(inner, &snapshot);
        }

        if inner.state.circuit_breaker_triggered {
            inner.state.last_action = PegAction::CircuitBreaker;
            inner.state.last_reason =
                "circuit breaker is latched; awaiting manual reset".to_string();
            warn!(epoch_id, "circuit breaker active, no action taken");
            return self.commit_state(inner, &snapshot);
        }

        // Step 1: fetch and validate the oracle price.
        let Some(price) = self.oracle.latest().filter(|p| p.is_valid()) else {
            inner.state.last_action = PegAction::Error;
            inner.state.last_reason = PegError::OracleUnavailable.to_string();
            error!(epoch_id, "oracle price fetch failed");
            self.commit_state(inner, &snapshot);
            return false;
        };

        if price.is_stale(timestamp, inner.config.oracle_max_age_seconds) {
            let err = PegError::OracleStale {
                age_seconds: timestamp.saturating_sub(price.timestamp),
                max_age_seconds: inner.config.oracle_max_age_seconds,
            };
            inner.state.last_action = PegAction::Error;
            inner.state.last_reason = err.to_string();
            error!(epoch_id, %err, "rejecting stale oracle price");
            self.commit_state(inner, &snapshot);
            return false;
        }

        let price_scaled = price.price_scaled;
        inner.state.last_price_scaled = price_scaled;
        info!(epoch_id, price_scaled, source = %price.source, "oracle price accepted");

        // Step 2: circuit-breaker check against price deviation.
        let dev_ppm = deviation_ppm(price_scaled, TARGET_PRICE);
        if dev_ppm > inner.config.circuit_breaker_ppm {
            inner.state.circuit_breaker_triggered = true;
            inner.config.enabled = false;
            inner.state.last_action = PegAction::CircuitBreaker;
            inner.state.last_reason = format!(
                "circuit breaker triggered: deviation {dev_ppm} ppm exceeds {} ppm",
                inner.config.circuit_breaker_ppm
            );
            error!(epoch_id, dev_ppm, "{}", inner.state.last_reason);
            return self.commit_state(inner, &snapshot);
        }

        // Step 3: dead-band.
        let error_scaled = price_scaled - TARGET_PRICE;
        let deadband_abs = scaled_mul(
            TARGET_PRICE as i128,
            inner.config.deadband_ppm as i128,
            PPM_SCALE as i128,
        ) as i64;

        if error_scaled.abs() < deadband_abs {
            inner.state.last_action = PegAction::Deadband;
            inner.state.last_reason = format!(
                "price within dead-band of ±{} ppm, no action needed",
                inner.config.deadband_ppm
            );
            inner.state.last_delta = 0;
            let event = PegEvent {
                epoch_id,
                timestamp,
                block_height,
                price_scaled,
                supply: inner.state.last_supply,
                delta: 0,
                action: PegAction::Deadband,
                reason: inner.state.last_reason.clone(),
            };
            info!(epoch_id, "{}", inner.state.last_reason);
            return self.commit_with_event(inner, &snapshot, &event);
        }

        // Step 4: current supply.
        let supply = match self.ledger.total_supply() {
            Ok(s) if s > 0 => s,
            Ok(s) => {
                inner.state.last_action = PegAction::Error;
                inner.state.last_reason = PegError::SupplyInvalid(s).to_string();
                error!(epoch_id, supply = s, "ledger reported non-positive supply");
                self.commit_state(inner, &snapshot);
                return false;
            }
            Err(err) => {
                inner.state.last_action = PegAction::Error;
                inner.state.last_reason = format!("failed to query total supply: {err}");
                error!(epoch_id, %err, "supply query failed");
                self.commit_state(inner, &snapshot);
                return false;
            }
        };
        inner.state.last_supply = supply;

        // Step 5: delta, proportional or full PID.
        let raw_delta = if inner.config.ki_ppm > 0 || inner.config.kd_ppm > 0 {
            delta_pid(inner, error_scaled, supply)
        } else {
            delta_proportional(inner.config.k_ppm, error_scaled, supply)
        };

        // Step 6: per-epoch caps.
        let cap_up = scaled_mul(supply, inner.config.max_expansion_ppm as i128, PPM_SCALE as i128);
        let cap_dn = scaled_mul(
            supply,
            inner.config.max_contraction_ppm as i128,
            PPM_SCALE as i128,
        );
        let delta = raw_delta.clamp(-cap_dn, cap_up);
        inner.state.last_delta = delta;
        debug!(epoch_id, raw_delta, delta, "supply delta computed");

        // Step 7: execute.
        let (success, action) = if delta > 0 {
            (self.execute_expansion(inner, delta, epoch_id), PegAction::Expand)
        } else if delta < 0 {
            (
                self.execute_contraction(inner, -delta, epoch_id),
                PegAction::Contract,
            )
        } else {
            inner.state.last_reason = "calculated delta is zero after clamping".to_string();
            (true, PegAction::None)
        };
        inner.state.last_action = action;

        // Step 8: persist state, then the audit event.
        let event = PegEvent {
            epoch_id,
            timestamp,
            block_height,
            price_scaled,
            supply,
            delta,
            action,
            reason: inner.state.last_reason.clone(),
        };
        let committed = self.commit_with_event(inner, &snapshot, &event);

        if success && committed {
            info!(epoch_id, action = %action, "{}", event.reason);
        } else {
            error!(epoch_id, action = %action, "epoch failed: {}", event.reason);
        }
        success && committed
    }

    pub fn get_state(&self) -> PegState {
        self.lock().state.clone()
    }

    pub fn get_config(&self) -> PegConfig {
        self.lock().config.clone()
    }

    /// Replace the configuration; takes effect at the next epoch.
    /// Enabling while the circuit breaker is latched is rejected.
    pub fn update_config(&self, new_config: PegConfig) -> Result<(), PegError> {
        validate_config(&new_config)?;
        let mut inner = self.lock();
        if new_config.enabled && inner.state.circuit_breaker_triggered {
            warn!("rejected config update: peg cannot be enabled while circuit breaker is latched");
            return Err(PegError::CircuitBreakerLatched);
        }
        info!(
            enabled = new_config.enabled,
            k_ppm = new_config.k_ppm,
            "peg configuration updated"
        );
        inner.config = new_config;
        Ok(())
    }

    /// Recent audit events, newest first, skipping epochs that emitted
    /// none (disabled, circuit-broken, or failed epochs).
    pub fn get_recent_events(&self, count: usize) -> Vec<PegEvent> {
        let inner = self.lock();
        let count = count.min(MAX_EVENT_QUERY);
        let mut events = Vec::new();
        let mut epoch = inner.state.epoch_id;
        while events.len() < count && epoch > 0 {
            match self.store.load_event(epoch) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!(epoch, %err, "skipping unreadable peg event"),
            }
            epoch -= 1;
        }
        events
    }

    /// Latch the circuit breaker and disable the peg. Requires
    /// `reset_circuit_breaker` plus an explicit re-enable to resume.
    pub fn emergency_stop(&self, reason: &str) {
        let mut inner = self.lock();
        inner.state.circuit_breaker_triggered = true;
        inner.config.enabled = false;
        inner.state.last_action = PegAction::EmergencyStop;
        inner.state.last_reason = reason.to_string();
        if let Err(err) = self.store.save_state(&inner.state) {
            error!(%err, "failed to persist emergency stop");
        }
        error!(reason, "peg emergency stop engaged");
    }

    /// Clear the latch. The peg stays disabled until the operator
    /// re-enables it through `update_config`.
    pub fn reset_circuit_breaker(&self, reason: &str) {
        let mut inner = self.lock();
        inner.state.circuit_breaker_triggered = false;
        inner.state.last_action = PegAction::CircuitBreakerReset;
        inner.state.last_reason = reason.to_string();
        if let Err(err) = self.store.save_state(&inner.state) {
            error!(%err, "failed to persist circuit breaker reset");
        }
        warn!(reason, "circuit breaker reset; peg remains disabled until re-enabled");
    }

    /// Enabled, not latched, fresh oracle, healthy ledger, positive
    /// supply.
    pub fn is_healthy(&self) -> bool {
        let inner = self.lock();
        if !inner.config.enabled || inner.state.circuit_breaker_triggered {
            return false;
        }
        let Some(price) = self.oracle.latest().filter(|p| p.is_valid()) else {
            return false;
        };
        if price.is_stale(inner.state.timestamp, inner.config.oracle_max_age_seconds) {
            return false;
        }
        if !self.ledger.is_healthy() {
            return false;
        }
        matches!(self.ledger.total_supply(), Ok(supply) if supply > 0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned guard still holds consistent data: failure paths
        // roll state back to the pre-epoch snapshot before returning.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit_state(&self, inner: &mut Inner, snapshot: &PegState) -> bool {
        match self.store.save_state(&inner.state) {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "failed to persist peg state; rolling back epoch");
                inner.state = snapshot.clone();
                false
            }
        }
    }

    fn commit_with_event(&self, inner: &mut Inner, snapshot: &PegState, event: &PegEvent) -> bool {
        if !self.commit_state(inner, snapshot) {
            return false;
        }
        match self.store.save_event(event) {
            Ok(()) => true,
            Err(err) => {
                error!(%err, epoch_id = event.epoch_id, "failed to persist peg event; rolling back epoch");
                inner.state = snapshot.clone();
                false
            }
        }
    }

    fn execute_expansion(&self, inner: &mut Inner, amount: i128, epoch_id: u64) -> bool {
        let treasury = inner.config.treasury_address.clone();
        match self.ledger.mint_to_treasury(amount, &treasury) {
            Ok(()) => {
                inner.state.last_reason =
                    format!("minted {amount} units to treasury (price above target)");
                self.redeem_matured_bonds(inner, epoch_id, amount);
                true
            }
            Err(err) => {
                inner.state.last_reason = format!("mint of {amount} units rejected: {err}");
                false
            }
        }
    }

    /// Redeem matured bonds oldest-first, capped by the amount minted
    /// this epoch.
    fn redeem_matured_bonds(&self, inner: &mut Inner, epoch_id: u64, budget: i128) {
        let upper = match self.store.next_bond_id() {
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "bond counter unreadable; skipping redemption");
                return;
            }
        };

        let mut remaining = budget;
        let mut redeemed_total = 0i128;
        let mut redeemed_count = 0u64;

        for bond_id in 1..upper {
            if remaining <= 0 {
                break;
            }
            let bond = match self.store.load_bond(bond_id) {
                Ok(Some(bond)) => bond,
                Ok(None) => continue,
                Err(err) => {
                    warn!(bond_id, %err, "unreadable bond record skipped");
                    continue;
                }
            };
            if bond.maturity_epoch > epoch_id || bond.amount > remaining {
                continue;
            }
            if let Err(err) = self.store.delete_bond(bond_id) {
                warn!(bond_id, %err, "failed to delete redeemed bond");
                break;
            }
            remaining -= bond.amount;
            redeemed_total += bond.amount;
            redeemed_count += 1;
            inner.state.total_bond_debt -= bond.amount;
            inner.state.bonds_redeemed_this_epoch += bond.amount;
        }

        if redeemed_total > 0 {
            inner.state.last_reason.push_str(&format!(
                "; redeemed {redeemed_count} matured bonds totalling {redeemed_total} units"
            ));
            info!(epoch_id, redeemed_count, redeemed_total, "matured bonds redeemed");
        }
    }

    fn execute_contraction(&self, inner: &mut Inner, amount: i128, epoch_id: u64) -> bool {
        let treasury = inner.config.treasury_address.clone();
        let balance = match self.ledger.treasury_balance(&treasury) {
            Ok(b) => b.max(0),
            Err(err) => {
                inner.state.last_reason = format!("treasury balance query failed: {err}");
                return false;
            }
        };

        let mut burned = 0i128;
        let covered = amount.min(balance);
        if covered > 0 {
            match self.ledger.burn_from_treasury(covered, &treasury) {
                Ok(()) => burned = covered,
                Err(LedgerError::InsufficientBalance {
                    available,
                    required,
                }) => {
                    // Fee headroom can make even the reported balance
                    // unburnable; the shortfall path covers it.
                    debug!(available, required, "treasury could not cover burn; falling back to bonds");
                }
                Err(err) => {
                    inner.state.last_reason = format!("burn of {covered} units rejected: {err}");
                    return false;
                }
            }
        }

        let shortfall = amount - burned;
        if shortfall == 0 {
            inner.state.last_reason =
                format!("burned {burned} units from treasury (price below target)");
            return true;
        }

        let headroom = if inner.config.max_bond_debt > 0 {
            (inner.config.max_bond_debt - inner.state.total_bond_debt).max(0)
        } else {
            i128::MAX
        };
        let issuable = shortfall.min(headroom);
        let uncovered = shortfall - issuable;

        if issuable > 0 {
            if let Err(err) = self.issue_bonds(inner, issuable, epoch_id) {
                inner.state.last_reason =
                    format!("bond issuance of {issuable} units failed: {err}");
                return false;
            }
        }

        let mut reason = format!(
            "burned {burned} units and issued {issuable} units of bonds for the shortfall (price below target)"
        );
        if uncovered > 0 {
            reason.push_str(&format!(
                "; {uncovered} units left uncovered by the bond debt cap"
            ));
        }
        inner.state.last_reason = reason;
        true
    }

    fn issue_bonds(
        &self,
        inner: &mut Inner,
        amount: i128,
        epoch_id: u64,
    ) -> Result<BondState, PegStoreError> {
        let bond_id = self.store.allocate_bond_id()?;
        let bond = BondState {
            bond_id,
            amount,
            issued_epoch: epoch_id,
            maturity_epoch: epoch_id + inner.config.bond_maturity_epochs,
            discount_rate_ppm: inner.config.bond_discount_ppm,
        };
        self.store.save_bond(&bond)?;
        inner.state.total_bond_debt += amount;
        inner.state.bonds_issued_this_epoch += amount;
        info!(
            bond_id,
            amount,
            maturity_epoch = bond.maturity_epoch,
            "issued contraction bonds"
        );
        Ok(bond)
    }
}

impl Drop for PegController {
    fn drop(&mut self) {
        let inner = self.lock();
        if let Err(err) = self.store.save_state(&inner.state) {
            error!(%err, "failed to persist final peg state on shutdown");
        }
    }
}

fn delta_proportional(k_ppm: i64, error_scaled: i64, supply: i128) -> i128 {
    let gain = scaled_mul(k_ppm as i128, error_scaled as i128, PPM_SCALE as i128);
    scaled_mul(gain, supply, PRICE_SCALE as i128)
}

fn delta_pid(inner: &mut Inner, error_scaled: i64, supply: i128) -> i128 {
    let config = &inner.config;
    let state = &mut inner.state;

    state.integral += error_scaled as i128;
    if config.max_integral > 0 {
        state.integral = state.integral.clamp(-config.max_integral, config.max_integral);
    }
    let derivative = error_scaled - state.prev_error_scaled;

    let p = delta_proportional(config.k_ppm, error_scaled, supply);
    let i = scaled_mul(
        scaled_mul(config.ki_ppm as i128, state.integral, PPM_SCALE as i128),
        supply,
        PRICE_SCALE as i128,
    );
    let d = scaled_mul(
        scaled_mul(config.kd_ppm as i128, derivative as i128, PPM_SCALE as i128),
        supply,
        PRICE_SCALE as i128,
    );

    state.prev_error_scaled = error_scaled;
    p + i + d
}

fn validate_config(config: &PegConfig) -> Result<(), PegError> {
    let ppm_fields = [
        ("deadband_ppm", config.deadband_ppm),
        ("k_ppm", config.k_ppm),
        ("ki_ppm", config.ki_ppm),
        ("kd_ppm", config.kd_ppm),
        ("max_expansion_ppm", config.max_expansion_ppm),
        ("max_contraction_ppm", config.max_contraction_ppm),
        ("circuit_breaker_ppm", config.circuit_breaker_ppm),
        ("bond_discount_ppm", config.bond_discount_ppm),
    ];
    for (name, value) in ppm_fields {
        if value < 0 {
            return Err(PegError::ConfigInvalid(format!(
                "{name} must be non-negative, got {value}"
            )));
        }
    }
    if config.max_bond_debt < 0 {
        return Err(PegError::ConfigInvalid(format!(
            "max_bond_debt must be non-negative, got {}",
            config.max_bond_debt
        )));
    }
    if config.max_integral < 0 {
        return Err(PegError::ConfigInvalid(format!(
            "max_integral must be non-negative, got {}",
            config.max_integral
        )));
    }
    if config.use_block_epochs {
        if config.epoch_blocks == 0 {
            return Err(PegError::ConfigInvalid(
                "epoch_blocks must be positive when block epochs are used".to_string(),
            ));
        }
    } else if config.epoch_seconds == 0 {
        return Err(PegError::ConfigInvalid(
            "epoch_seconds must be positive".to_string(),
        ));
    }
    if config.enabled && !is_valid_address(&config.treasury_address) {
        return Err(PegError::ConfigInvalid(format!(
            "treasury address '{}' is malformed",
            config.treasury_address
        )));
    }
    Ok(())
}
