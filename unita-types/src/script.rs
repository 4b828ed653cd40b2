//! Locking-script conventions.
//!
//! Two script shapes exist on this chain: outputs locked to an address
//! and provably-unspendable outputs. An unspendable script begins with
//! `OP_RETURN`, which no input can ever satisfy; the peg contraction
//! path uses it with the `PEG_BURN` tag to destroy coins.

/// Opcode that makes an output provably unspendable.
pub const OP_RETURN: u8 = 0x6a;

/// Opcode that locks an output to the address that follows it.
pub const OP_PAY_TO_ADDR: u8 = 0x51;

/// ASCII tag carried by peg-burn outputs.
pub const BURN_TAG: &[u8] = b"PEG_BURN";

/// Build a script locking an output to `addr`.
pub fn lock_to_address(addr: &str) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + addr.len());
    script.push(OP_PAY_TO_ADDR);
    script.push(addr.len() as u8);
    script.extend_from_slice(addr.as_bytes());
    script
}

/// Extract the address a script pays to, if it is an address lock.
pub fn address_of(script: &[u8]) -> Option<&str> {
    if script.len() < 2 || script[0] != OP_PAY_TO_ADDR {
        return None;
    }
    let len = script[1] as usize;
    if script.len() != 2 + len {
        return None;
    }
    std::str::from_utf8(&script[2..]).ok()
}

/// Build a provably-unspendable script carrying `tag`.
pub fn unspendable_with_tag(tag: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(1 + tag.len());
    script.push(OP_RETURN);
    script.extend_from_slice(tag);
    script
}

/// An output is unspendable by construction when its script begins
/// with `OP_RETURN`.
pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

/// Recognize the canonical peg-burn script.
pub fn is_peg_burn(script: &[u8]) -> bool {
    is_unspendable(script) && script[1..].starts_with(BURN_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_lock_round_trips() {
        let script = lock_to_address("una1treasury0dev0000000000000000");
        assert_eq!(
            address_of(&script),
            Some("una1treasury0dev0000000000000000")
        );
        assert!(!is_unspendable(&script));
    }

    #[test]
    fn burn_script_is_unspendable_and_tagged() {
        let script = unspendable_with_tag(BURN_TAG);
        assert!(is_unspendable(&script));
        assert!(is_peg_burn(&script));
        assert!(address_of(&script).is_none());
    }

    #[test]
    fn truncated_scripts_do_not_parse() {
        assert!(address_of(&[OP_PAY_TO_ADDR]).is_none());
        assert!(address_of(&[OP_PAY_TO_ADDR, 30, b'u']).is_none());
        assert!(!is_unspendable(&[]));
    }
}
