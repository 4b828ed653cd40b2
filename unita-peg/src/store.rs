//! Namespaced persistence layout over the key/value engine.
//!
//! Keys: `state:current` for the controller state, `events:<epoch BE>`
//! for the append-only audit log (big-endian so forward scans ascend
//! by epoch), `bonds:<id BE>` for bond records, and `bonds:next_id`
//! for the monotonic bond-id counter.

use std::sync::Arc;

use thiserror::Error;
use unita_storage::{KvStore, StoreError};

use crate::codec::{self, CodecError};
use crate::state::{BondState, PegEvent, PegState};

const STATE_KEY: &[u8] = b"state:current";
const EVENT_PREFIX: &[u8] = b"events:";
const BOND_PREFIX: &[u8] = b"bonds:";
const BOND_NEXT_ID_KEY: &[u8] = b"bonds:next_id";

const FIRST_BOND_ID: u64 = 1;

#[derive(Error, Debug)]
pub enum PegStoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Clone)]
pub struct PegStore {
    kv: Arc<dyn KvStore>,
}

impl PegStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn event_key(epoch_id: u64) -> Vec<u8> {
        let mut key = EVENT_PREFIX.to_vec();
        key.extend_from_slice(&epoch_id.to_be_bytes());
        key
    }

    fn bond_key(bond_id: u64) -> Vec<u8> {
        let mut key = BOND_PREFIX.to_vec();
        key.extend_from_slice(&bond_id.to_be_bytes());
        key
    }

    pub fn save_state(&self, state: &PegState) -> Result<(), PegStoreError> {
        self.kv.put(STATE_KEY, &codec::encode_state(state))?;
        Ok(())
    }

    pub fn load_state(&self) -> Result<Option<PegState>, PegStoreError> {
        match self.kv.get(STATE_KEY)? {
            Some(bytes) => Ok(Some(codec::decode_state(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_event(&self, event: &PegEvent) -> Result<(), PegStoreError> {
        self.kv
            .put(&Self::event_key(event.epoch_id), &codec::encode_event(event))?;
        Ok(())
    }

    pub fn load_event(&self, epoch_id: u64) -> Result<Option<PegEvent>, PegStoreError> {
        match self.kv.get(&Self::event_key(epoch_id))? {
            Some(bytes) => Ok(Some(codec::decode_event(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_bond(&self, bond: &BondState) -> Result<(), PegStoreError> {
        self.kv
            .put(&Self::bond_key(bond.bond_id), &codec::encode_bond(bond))?;
        Ok(())
    }

    pub fn load_bond(&self, bond_id: u64) -> Result<Option<BondState>, PegStoreError> {
        match self.kv.get(&Self::bond_key(bond_id))? {
            Some(bytes) => Ok(Some(codec::decode_bond(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_bond(&self, bond_id: u64) -> Result<(), PegStoreError> {
        self.kv.delete(&Self::bond_key(bond_id))?;
        Ok(())
    }

    /// One past the highest bond id ever allocated.
    pub fn next_bond_id(&self) -> Result<u64, PegStoreError> {
        match self.kv.get(BOND_NEXT_ID_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(raw))
            }
            _ => Ok(FIRST_BOND_ID),
        }
    }

    /// Reserve the next bond id, advancing the persisted counter.
    pub fn allocate_bond_id(&self) -> Result<u64, PegStoreError> {
        let id = self.next_bond_id()?;
        self.kv
            .put(BOND_NEXT_ID_KEY, &(id + 1).to_le_bytes())?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PegAction;
    use unita_storage::MemoryStore;

    fn store() -> PegStore {
        PegStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn state_persists_and_reloads() {
        let store = store();
        assert!(store.load_state().unwrap().is_none());

        let mut state = PegState::default();
        state.epoch_id = 9;
        state.last_action = PegAction::Expand;
        store.save_state(&state).unwrap();
        assert_eq!(store.load_state().unwrap(), Some(state));
    }

    #[test]
    fn events_are_keyed_by_epoch() {
        let store = store();
        let event = PegEvent {
            epoch_id: 5,
            timestamp: 100,
            block_height: 50,
            price_scaled: 1_000_000,
            supply: 1,
            delta: 0,
            action: PegAction::Deadband,
            reason: "in band".to_string(),
        };
        store.save_event(&event).unwrap();
        assert_eq!(store.load_event(5).unwrap(), Some(event));
        assert!(store.load_event(4).unwrap().is_none());
    }

    #[test]
    fn bond_ids_allocate_monotonically() {
        let store = store();
        assert_eq!(store.next_bond_id().unwrap(), 1);
        assert_eq!(store.allocate_bond_id().unwrap(), 1);
        assert_eq!(store.allocate_bond_id().unwrap(), 2);
        assert_eq!(store.next_bond_id().unwrap(), 3);
    }

    #[test]
    fn bond_records_store_and_delete() {
        let store = store();
        let bond = BondState {
            bond_id: 1,
            amount: 500,
            issued_epoch: 2,
            maturity_epoch: 32,
            discount_rate_ppm: 50_000,
        };
        store.save_bond(&bond).unwrap();
        assert_eq!(store.load_bond(1).unwrap(), Some(bond));
        store.delete_bond(1).unwrap();
        assert!(store.load_bond(1).unwrap().is_none());
    }

    #[test]
    fn allocating_ids_does_not_create_bond_records() {
        let store = store();
        let id = store.allocate_bond_id().unwrap();
        assert!(store.load_bond(id).unwrap().is_none());
    }
}
