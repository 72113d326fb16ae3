//! Pool adapter arena.
//!
//! One slot per (venue, user, collateral, borrow) key. A slot is created the
//! first time the key is selected and reused afterwards, so at most one
//! position ever exists per key. Each slot carries a secret from which
//! [`PositionCapability`] tokens are minted; the debt monitor only accepts
//! bookkeeping calls that present a matching capability.

use parking_lot::{Mutex, RwLock};
use router_venues::{PoolAdapter, PoolAdapterConfig};
use serde::{Serialize, Serializer};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RouterError, RouterResult};

/// Stable handle to a pool adapter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolAdapterHandle(u64);

impl PoolAdapterHandle {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolAdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pa#{}", self.0)
    }
}

impl Serialize for PoolAdapterHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Proof that the holder acts for one specific pool adapter.
///
/// Cannot be constructed outside this crate and is not `Clone`.
#[derive(Debug)]
pub struct PositionCapability {
    handle: PoolAdapterHandle,
    secret: u64,
}

impl PositionCapability {
    pub fn handle(&self) -> PoolAdapterHandle {
        self.handle
    }

    #[cfg(test)]
    pub(crate) fn forged(handle: PoolAdapterHandle, secret: u64) -> Self {
        Self { handle, secret }
    }
}

/// Shared, individually locked pool adapter.
pub type SharedPoolAdapter = Arc<Mutex<Box<dyn PoolAdapter>>>;

struct Slot {
    adapter: SharedPoolAdapter,
    config: PoolAdapterConfig,
    secret: u64,
}

#[derive(Default)]
struct StoreInner {
    slots: HashMap<PoolAdapterHandle, Slot>,
    by_key: HashMap<PoolAdapterConfig, PoolAdapterHandle>,
    next_id: u64,
}

/// Arena of pool adapters addressed by [`PoolAdapterHandle`].
pub struct PoolAdapterStore {
    inner: RwLock<StoreInner>,
    secrets: RandomState,
}

impl PoolAdapterStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            secrets: RandomState::new(),
        }
    }

    /// Return the slot for `config`, allocating it with `create` if absent.
    ///
    /// The second value is `true` when a new slot was allocated.
    pub fn get_or_allocate<F>(&self, config: &PoolAdapterConfig, create: F) -> (PoolAdapterHandle, bool)
    where
        F: FnOnce(PoolAdapterConfig) -> Box<dyn PoolAdapter>,
    {
        if let Some(handle) = self.find(config) {
            return (handle, false);
        }

        let mut inner = self.inner.write();
        // Raced with another allocation for the same key
        if let Some(handle) = inner.by_key.get(config) {
            return (*handle, false);
        }

        inner.next_id += 1;
        let handle = PoolAdapterHandle(inner.next_id);
        let slot = Slot {
            adapter: Arc::new(Mutex::new(create(config.clone()))),
            config: config.clone(),
            secret: self.secrets.hash_one(handle.0),
        };
        inner.slots.insert(handle, slot);
        inner.by_key.insert(config.clone(), handle);

        debug!(
            handle = %handle,
            venue = %config.venue,
            user = %config.user,
            "Allocated pool adapter"
        );
        (handle, true)
    }

    /// Look up the slot for a key.
    pub fn find(&self, config: &PoolAdapterConfig) -> Option<PoolAdapterHandle> {
        self.inner.read().by_key.get(config).copied()
    }

    /// Pool adapter behind a handle.
    pub fn adapter(&self, handle: PoolAdapterHandle) -> RouterResult<SharedPoolAdapter> {
        self.inner
            .read()
            .slots
            .get(&handle)
            .map(|s| s.adapter.clone())
            .ok_or(RouterError::UnknownPoolAdapter(handle))
    }

    /// Identity of the position behind a handle.
    pub fn config(&self, handle: PoolAdapterHandle) -> RouterResult<PoolAdapterConfig> {
        self.inner
            .read()
            .slots
            .get(&handle)
            .map(|s| s.config.clone())
            .ok_or(RouterError::UnknownPoolAdapter(handle))
    }

    /// Mint a capability for a slot. Only router internals act for a pool adapter.
    pub(crate) fn capability(&self, handle: PoolAdapterHandle) -> RouterResult<PositionCapability> {
        self.inner
            .read()
            .slots
            .get(&handle)
            .map(|s| PositionCapability {
                handle,
                secret: s.secret,
            })
            .ok_or(RouterError::UnknownPoolAdapter(handle))
    }

    /// Check a capability and return the identity it grants.
    pub fn verify(&self, capability: &PositionCapability) -> RouterResult<PoolAdapterConfig> {
        let inner = self.inner.read();
        match inner.slots.get(&capability.handle) {
            Some(slot) if slot.secret == capability.secret => Ok(slot.config.clone()),
            _ => Err(RouterError::InvalidCapability(capability.handle)),
        }
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PoolAdapterStore {
    fn default() -> Self {
        Self::new()
    }
}
