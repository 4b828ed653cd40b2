//! Fixed binary layout for persisted peg records.
//!
//! Every record begins with a little-endian u16 schema version;
//! readers reject versions they do not know. 64-bit scalars are
//! little-endian, 128-bit values are written as low u64 then high u64,
//! strings as a u32 length prefix plus bytes, bools as one byte.
//! Encode → decode → encode is byte-identical.

use thiserror::Error;

use crate::state::{BondState, PegAction, PegEvent, PegState};

pub const SCHEMA_VERSION: u16 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer underflow during decode")]
    UnexpectedEof,
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u16),
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEof)?;
        if end > self.buf.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("slice length checked");
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(u64::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.u64()? as i64)
    }

    fn i128(&mut self) -> Result<i128, CodecError> {
        let low = self.u64()?;
        let high = self.u64()?;
        Ok((((high as u128) << 64) | low as u128) as i128)
    }

    fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.take(1)?[0] != 0)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn action(&mut self) -> Result<PegAction, CodecError> {
        let s = self.string()?;
        PegAction::parse(&s).ok_or(CodecError::UnknownAction(s))
    }

    fn finish(self) -> Result<(), CodecError> {
        let remaining = self.buf.len() - self.pos;
        if remaining != 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, v: i64) {
    put_u64(out, v as u64);
}

fn put_i128(out: &mut Vec<u8>, v: i128) {
    put_u64(out, v as u64);
    put_u64(out, (v >> 64) as u64);
}

fn put_bool(out: &mut Vec<u8>, v: bool) {
    out.push(v as u8);
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

pub fn encode_state(state: &PegState) -> Vec<u8> {
    let mut out = Vec::with_capacity(160 + state.last_reason.len());
    put_u16(&mut out, SCHEMA_VERSION);
    put_u64(&mut out, state.epoch_id);
    put_u64(&mut out, state.timestamp);
    put_u64(&mut out, state.block_height);
    put_i64(&mut out, state.last_price_scaled);
    put_i128(&mut out, state.last_supply);
    put_i128(&mut out, state.last_delta);
    put_i128(&mut out, state.total_bond_debt);
    put_i128(&mut out, state.bonds_issued_this_epoch);
    put_i128(&mut out, state.bonds_redeemed_this_epoch);
    put_i128(&mut out, state.integral);
    put_i64(&mut out, state.prev_error_scaled);
    put_string(&mut out, state.last_action.as_str());
    put_string(&mut out, &state.last_reason);
    put_bool(&mut out, state.circuit_breaker_triggered);
    out
}

pub fn decode_state(bytes: &[u8]) -> Result<PegState, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.u16()?;
    if version != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let state = PegState {
        epoch_id: r.u64()?,
        timestamp: r.u64()?,
        block_height: r.u64()?,
        last_price_scaled: r.i64()?,
        last_supply: r.i128()?,
        last_delta: r.i128()?,
        total_bond_debt: r.i128()?,
        bonds_issued_this_epoch: r.i128()?,
        bonds_redeemed_this_epoch: r.i128()?,
        integral: r.i128()?,
        prev_error_scaled: r.i64()?,
        last_action: r.action()?,
        last_reason: r.string()?,
        circuit_breaker_triggered: r.bool()?,
    };
    r.finish()?;
    Ok(state)
}

pub fn encode_event(event: &PegEvent) -> Vec<u8> {
    let mut out = Vec::with_capacity(96 + event.reason.len());
    put_u16(&mut out, SCHEMA_VERSION);
    put_u64(&mut out, event.epoch_id);
    put_u64(&mut out, event.timestamp);
    put_u64(&mut out, event.block_height);
    put_i64(&mut out, event.price_scaled);
    put_i128(&mut out, event.supply);
    put_i128(&mut out, event.delta);
    put_string(&mut out, event.action.as_str());
    put_string(&mut out, &event.reason);
    out
}

pub fn decode_event(bytes: &[u8]) -> Result<PegEvent, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.u16()?;
    if version != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let event = PegEvent {
        epoch_id: r.u64()?,
        timestamp: r.u64()?,
        block_height: r.u64()?,
        price_scaled: r.i64()?,
        supply: r.i128()?,
        delta: r.i128()?,
        action: r.action()?,
        reason: r.string()?,
    };
    r.finish()?;
    Ok(event)
}

pub fn encode_bond(bond: &BondState) -> Vec<u8> {
    let mut out = Vec::with_capacity(50);
    put_u16(&mut out, SCHEMA_VERSION);
    put_u64(&mut out, bond.bond_id);
    put_i128(&mut out, bond.amount);
    put_u64(&mut out, bond.issued_epoch);
    put_u64(&mut out, bond.maturity_epoch);
    put_i64(&mut out, bond.discount_rate_ppm);
    out
}

pub fn decode_bond(bytes: &[u8]) -> Result<BondState, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.u16()?;
    if version != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let bond = BondState {
        bond_id: r.u64()?,
        amount: r.i128()?,
        issued_epoch: r.u64()?,
        maturity_epoch: r.u64()?,
        discount_rate_ppm: r.i64()?,
    };
    r.finish()?;
    Ok(bond)
}
