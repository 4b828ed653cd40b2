//! Bech32-style address validation for UNA addresses.
//!
//! Full codec work (checksums, key derivation) belongs to the wallet
//! and crypto layers; the chain core only needs to reject malformed
//! strings before they reach scripts or treasury configuration.

/// Human-readable prefix for mainnet addresses.
pub const ADDRESS_HRP: &str = "una1";

/// Bech32 data alphabet.
const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const MIN_ADDRESS_LEN: usize = 12;
const MAX_ADDRESS_LEN: usize = 90;

/// Check whether `addr` is a plausible UNA address: correct prefix,
/// sane length, and data part drawn from the bech32 alphabet.
pub fn is_valid_address(addr: &str) -> bool {
    if addr.len() < MIN_ADDRESS_LEN || addr.len() > MAX_ADDRESS_LEN {
        return false;
    }
    let Some(data) = addr.strip_prefix(ADDRESS_HRP) else {
        return false;
    };
    data.chars().all(|c| CHARSET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(is_valid_address("una1treasury0dev0000000000000000"));
        assert!(is_valid_address("una1qqqqqqqq"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("una1"));
        assert!(!is_valid_address("una1short"));
        assert!(!is_valid_address("btc1qqqqqqqqqqqq"));
        // 'b' and 'o' are outside the bech32 alphabet
        assert!(!is_valid_address("una1bbbbbbbbbbbb"));
        assert!(!is_valid_address("una1oooooooooooo"));
        let too_long = format!("una1{}", "q".repeat(100));
        assert!(!is_valid_address(&too_long));
    }
}
