//! Price-oracle port for the peg controller.
//!
//! The controller only ever sees the [`Oracle`] trait; concrete feeds
//! are chosen at startup from a `kind:params` spec string. Everything
//! here returns deterministic scaled integers: a price of $1.05 is
//! `1_050_000` at [`PRICE_SCALE`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use unita_types::units::{PRICE_SCALE, TARGET_PRICE};

mod aggregate;
mod stub;

pub use aggregate::AggregatedOracle;
pub use stub::{FileOracle, FixedOracle, RandomOracle};

/// A single price observation from a feed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OraclePrice {
    /// Price scaled by [`PRICE_SCALE`] ($0.98 = 980_000).
    pub price_scaled: i64,
    /// Unix epoch seconds at observation time.
    pub timestamp: u64,
    /// Source identifier or signer key.
    pub source: String,
    /// Optional cryptographic signature over the observation.
    pub signature: Vec<u8>,
}

impl OraclePrice {
    pub fn is_valid(&self) -> bool {
        self.price_scaled > 0 && self.timestamp > 0
    }

    pub fn is_stale(&self, current_time: u64, max_age_seconds: u64) -> bool {
        current_time.saturating_sub(self.timestamp) > max_age_seconds
    }
}

/// Abstract price source. Implementations must be thread-safe; the
/// controller shares one instance across scheduler and RPC threads.
pub trait Oracle: Send + Sync {
    /// Latest observation, or `None` when the feed cannot produce one
    /// (transport failure, parse failure, missing file).
    fn latest(&self) -> Option<OraclePrice>;

    /// Median of up to `count` recent observations.
    fn median(&self, count: usize) -> Option<OraclePrice> {
        let _ = count;
        self.latest()
    }

    /// Recent observations for diagnostics.
    fn recent(&self, count: usize) -> Vec<OraclePrice> {
        let _ = count;
        Vec::new()
    }
}

/// Construction-time error for oracle spec strings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OracleSpecError {
    #[error("unknown oracle kind '{0}'")]
    UnknownKind(String),
    #[error("invalid oracle parameters '{params}' for kind '{kind}'")]
    InvalidParams { kind: String, params: String },
}

/// Build an oracle from a `kind(:params)?` spec string.
///
/// Recognized kinds:
/// - `stub` (or empty): fixed at the target price
/// - `fixed:1.05`: fixed at the given price
/// - `file:/path/to/price.txt`: first line of the file, re-read per call
/// - `random:1.00:0.05`: random walk around the center (stress harness only)
/// - `aggregated:<sub>;<sub>;...`: median over sub-oracle specs
pub fn oracle_from_spec(spec: &str) -> Result<Box<dyn Oracle>, OracleSpecError> {
    let spec = spec.trim();
    if spec.is_empty() || spec == "stub" {
        return Ok(Box::new(FixedOracle::new(TARGET_PRICE)));
    }

    let (kind, params) = spec.split_once(':').unwrap_or((spec, ""));
    let invalid = || OracleSpecError::InvalidParams {
        kind: kind.to_string(),
        params: params.to_string(),
    };

    match kind {
        "fixed" => {
            let price = parse_decimal_6(params).filter(|p| *p > 0).ok_or_else(invalid)?;
            Ok(Box::new(FixedOracle::new(price)))
        }
        "file" => {
            if params.is_empty() {
                return Err(invalid());
            }
            Ok(Box::new(FileOracle::new(params)))
        }
        "random" => {
            let (center, variance) = match params.split_once(':') {
                Some((c, v)) => (
                    parse_decimal_6(c).ok_or_else(invalid)?,
                    parse_decimal_6(v).ok_or_else(invalid)?,
                ),
                None => (parse_decimal_6(params).ok_or_else(invalid)?, 50_000),
            };
            if center <= 0 || variance < 0 {
                return Err(invalid());
            }
            RandomOracle::new(center, variance)
                .map(|o| Box::new(o) as Box<dyn Oracle>)
                .map_err(|_| invalid())
        }
        "aggregated" => {
            let subs = params
                .split(';')
                .filter(|s| !s.trim().is_empty())
                .map(oracle_from_spec)
                .collect::<Result<Vec<_>, _>>()?;
            if subs.is_empty() {
                return Err(invalid());
            }
            Ok(Box::new(AggregatedOracle::new(subs)))
        }
        other => Err(OracleSpecError::UnknownKind(other.to_string())),
    }
}

/// Parse a decimal string into a six-decimal scaled integer without
/// going through floating point ("1.05" -> 1_050_000).
pub fn parse_decimal_6(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() > 6 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let frac: i64 = if frac_part.is_empty() {
        0
    } else {
        let parsed: i64 = frac_part.parse().ok()?;
        parsed * 10i64.pow((6 - frac_part.len()) as u32)
    };
    let value = int.checked_mul(PRICE_SCALE)?.checked_add(frac)?;
    Some(if negative { -value } else { value })
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
