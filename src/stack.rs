use std::sync::Arc;

use crate::error::{GCodeError, Result};
use crate::machine_state::MachineState;
use crate::pool::{PooledState, StatePool};
use crate::resources::ResourceBitmap;

/// Per-channel stack of machine states.
///
/// The bottom frame belongs to the channel for its whole life and never
/// comes from the pool; every nested frame is on loan from the shared pool.
#[derive(Debug)]
pub struct MachineStateStack {
    bottom: MachineState,
    nested: Vec<PooledState>,
    pool: Arc<StatePool>,
}

impl MachineStateStack {
    pub fn new(pool: Arc<StatePool>) -> Self {
        Self { bottom: MachineState::default(), nested: Vec::new(), pool }
    }

    pub fn top(&self) -> &MachineState {
        self.nested.last().map_or(&self.bottom, |p| &p.state)
    }

    pub fn top_mut(&mut self) -> &mut MachineState {
        match self.nested.last_mut() {
            Some(p) => &mut p.state,
            None => &mut self.bottom,
        }
    }

    pub fn bottom(&self) -> &MachineState {
        &self.bottom
    }

    /// Number of nested frames above the bottom one.
    pub fn depth(&self) -> usize {
        self.nested.len()
    }

    pub fn pool(&self) -> &Arc<StatePool> {
        &self.pool
    }

    /// Frames from the top down to the bottom.
    pub fn frames(&self) -> impl Iterator<Item = &MachineState> {
        self.nested.iter().rev().map(|p| &p.state).chain(std::iter::once(&self.bottom))
    }

    /// Enter a nested procedure. On failure the stack is left untouched.
    pub fn push(&mut self) -> Result<()> {
        let Some(mut record) = self.pool.allocate() else {
            console_log!("machine state pool exhausted at depth {}", self.depth());
            return Err(GCodeError::ResourceExhausted(self.pool.capacity()));
        };
        let parent = self.top_mut();
        record.state.copy_state_from(parent);
        parent.in_nested_procedure = true;
        self.nested.push(record);
        Ok(())
    }

    /// Leave the current nested procedure. Locks held by the popped frame
    /// are the caller's to release beforehand.
    pub fn pop(&mut self) -> Result<()> {
        let Some(record) = self.nested.pop() else {
            console_log!("machine state stack underflow");
            return Err(GCodeError::Underflow);
        };
        self.pool.release(record);
        self.top_mut().in_nested_procedure = false;
        Ok(())
    }

    /// Pop every nested frame, returning the locks they still held.
    pub fn unwind(&mut self) -> ResourceBitmap {
        let mut held = ResourceBitmap::empty();
        while let Some(mut record) = self.nested.pop() {
            held = held.union(record.state.locked_resources);
            record.state.locked_resources.clear_all();
            self.pool.release(record);
        }
        self.bottom.in_nested_procedure = false;
        held
    }
}

impl Drop for MachineStateStack {
    fn drop(&mut self) {
        for record in self.nested.drain(..) {
            self.pool.release(record);
        }
    }
}
