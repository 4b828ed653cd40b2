//! Development and test oracle variants: fixed price, file-backed
//! price, and a seeded random walk for stress harnesses.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use tracing::warn;
use unita_types::units::{PPM_SCALE, PRICE_SCALE};

use crate::{unix_now, Oracle, OraclePrice};

/// Always reports the same price, stamped with the current time.
pub struct FixedOracle {
    price_scaled: Mutex<i64>,
}

impl FixedOracle {
    pub fn new(price_scaled: i64) -> Self {
        Self {
            price_scaled: Mutex::new(price_scaled),
        }
    }

    /// Replace the reported price. Used by simulators and tests to
    /// script a price path through a live controller.
    pub fn set_price(&self, price_scaled: i64) {
        let mut guard = self.price_scaled.lock().unwrap_or_else(|e| e.into_inner());
        *guard = price_scaled;
    }
}

impl Oracle for FixedOracle {
    fn latest(&self) -> Option<OraclePrice> {
        let price_scaled = *self.price_scaled.lock().unwrap_or_else(|e| e.into_inner());
        Some(OraclePrice {
            price_scaled,
            timestamp: unix_now(),
            source: "fixed".to_string(),
            signature: vec![],
        })
    }

    fn recent(&self, count: usize) -> Vec<OraclePrice> {
        if count == 0 {
            return Vec::new();
        }
        self.latest().into_iter().collect()
    }
}

/// Reads a single decimal price from a file on every call.
pub struct FileOracle {
    path: PathBuf,
}

impl FileOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Oracle for FileOracle {
    fn latest(&self) -> Option<OraclePrice> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "price file unreadable");
                return None;
            }
        };
        let line = contents.lines().next().unwrap_or("");
        let Some(price_scaled) = crate::parse_decimal_6(line) else {
            warn!(path = %self.path.display(), line, "price file did not parse");
            return None;
        };
        Some(OraclePrice {
            price_scaled,
            timestamp: unix_now(),
            source: format!("file:{}", self.path.display()),
            signature: vec![],
        })
    }
}

/// Gaussian random walk around a center price, clamped to
/// [$0.10, $10.00]. Nondeterministically seeded; for stress harnesses
/// only, never for consensus.
pub struct RandomOracle {
    center_scaled: i64,
    variance_ppm: i64,
    normal: Normal,
    rng: Mutex<StdRng>,
}

impl RandomOracle {
    pub fn new(center_scaled: i64, variance_ppm: i64) -> Result<Self, statrs::StatsError> {
        Ok(Self {
            center_scaled,
            variance_ppm,
            normal: Normal::new(0.0, 1.0)?,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }
}

impl Oracle for RandomOracle {
    fn latest(&self) -> Option<OraclePrice> {
        let z: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.sample(self.normal)
        };
        let variance_fraction = self.variance_ppm as f64 / PPM_SCALE as f64;
        let price = self.center_scaled as f64 * (1.0 + z * variance_fraction);

        const MIN_PRICE: i64 = PRICE_SCALE / 10;
        const MAX_PRICE: i64 = PRICE_SCALE * 10;
        let price_scaled = (price as i64).clamp(MIN_PRICE, MAX_PRICE);

        Some(OraclePrice {
            price_scaled,
            timestamp: unix_now(),
            source: "random".to_string(),
            signature: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_oracle_reports_and_updates() {
        let oracle = FixedOracle::new(1_050_000);
        let price = oracle.latest().unwrap();
        assert_eq!(price.price_scaled, 1_050_000);
        assert!(price.is_valid());

        oracle.set_price(980_000);
        assert_eq!(oracle.latest().unwrap().price_scaled, 980_000);
    }

    #[test]
    fn file_oracle_reads_first_line() {
        let path = std::env::temp_dir().join(format!("una-price-{}.txt", std::process::id()));
        fs::write(&path, "1.037500\nstale second line\n").unwrap();

        let oracle = FileOracle::new(&path);
        let price = oracle.latest().unwrap();
        assert_eq!(price.price_scaled, 1_037_500);

        fs::write(&path, "garbage\n").unwrap();
        assert!(oracle.latest().is_none());

        fs::remove_file(&path).unwrap();
        assert!(oracle.latest().is_none());
    }

    #[test]
    fn random_oracle_stays_within_clamp() {
        let oracle = RandomOracle::new(PRICE_SCALE, 5_000_000).unwrap();
        for _ in 0..200 {
            let price = oracle.latest().unwrap();
            assert!(price.price_scaled >= PRICE_SCALE / 10);
            assert!(price.price_scaled <= PRICE_SCALE * 10);
        }
    }
}
