//! Fixed-capacity pool of nested machine states, shared by every channel.
//!
//! Records are addressed by slot index. A slot's record is created the first
//! time it is needed; released records are parked in the pool and reset when
//! handed out again. The pool never grows past its capacity.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::DEFAULT_POOL_CAPACITY;
use crate::machine_state::MachineState;

/// A machine state on loan from the pool.
#[derive(Debug)]
pub struct PooledState {
    slot: usize,
    pub state: MachineState,
}

impl PooledState {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    free: Vec<PooledState>,
    num_allocated: usize,
    released_with_locks: usize,
}

#[derive(Debug)]
pub struct StatePool {
    capacity: usize,
    inner: Mutex<PoolInner>,
}

impl StatePool {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(PoolInner::default()) }
    }

    /// The process-wide pool.
    pub fn global() -> Arc<StatePool> {
        static GLOBAL: OnceLock<Arc<StatePool>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(StatePool::new(DEFAULT_POOL_CAPACITY))))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a fresh record, or `None` once every slot is in use.
    pub fn allocate(&self) -> Option<PooledState> {
        let mut inner = self.inner.lock();
        if let Some(mut record) = inner.free.pop() {
            record.state.reset();
            return Some(record);
        }
        if inner.num_allocated == self.capacity {
            return None;
        }
        inner.num_allocated += 1;
        Some(PooledState { slot: inner.num_allocated - 1, state: MachineState::default() })
    }

    /// Give a record back. Locks still held are not released here; they
    /// only show up in [`StatePool::released_with_locks`].
    pub fn release(&self, record: PooledState) {
        let mut inner = self.inner.lock();
        if !record.state.locked_resources.is_empty() {
            inner.released_with_locks += 1;
        }
        debug_assert!(!inner.free.iter().any(|r| r.slot == record.slot), "slot {} released twice", record.slot);
        inner.free.push(record);
    }

    /// Slots created so far.
    pub fn num_allocated(&self) -> usize {
        self.inner.lock().num_allocated
    }

    pub fn num_in_use(&self) -> usize {
        let inner = self.inner.lock();
        inner.num_allocated - inner.free.len()
    }

    pub fn released_with_locks(&self) -> usize {
        self.inner.lock().released_with_locks
    }
}

impl Default for StatePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
