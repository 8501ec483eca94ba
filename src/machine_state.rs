use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_FEEDRATE;
use crate::gcode_state::GCodeState;
use crate::resources::ResourceBitmap;

/// Replay position inside a file owned by the storage layer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileReplay {
    pub handle: u32,
    /// Bytes read from the file so far.
    pub position: u64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    Cancelled,
}

/// Waiting / received / cancelled handshake for a message that needs the
/// user to press OK or Cancel.
///
/// The reply comes from a UI or network callback, not from the context
/// that drives the channel, so every flag is atomic. `cancelled` is always
/// published before `received`.
#[derive(Debug, Default)]
pub struct Acknowledgement {
    waiting: AtomicBool,
    received: AtomicBool,
    cancelled: AtomicBool,
}

impl Acknowledgement {
    pub fn begin_wait(&self) {
        self.received.store(false, Ordering::Release);
        self.cancelled.store(false, Ordering::Release);
        self.waiting.store(true, Ordering::Release);
    }

    /// Signal the reply. Returns false if nothing was waiting.
    pub fn acknowledge(&self, cancelled: bool) -> bool {
        if !self.waiting.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.cancelled.store(cancelled, Ordering::Release);
        self.received.store(true, Ordering::Release);
        true
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn is_received(&self) -> bool {
        self.received.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn clear(&mut self) {
        *self.waiting.get_mut() = false;
        *self.received.get_mut() = false;
        *self.cancelled.get_mut() = false;
    }

    /// Consume a received reply.
    pub fn take_outcome(&self) -> Option<AckOutcome> {
        if !self.received.swap(false, Ordering::AcqRel) {
            return None;
        }
        if self.cancelled.swap(false, Ordering::AcqRel) {
            Some(AckOutcome::Cancelled)
        } else {
            Some(AckOutcome::Acknowledged)
        }
    }
}

/// One frame of a channel's execution state.
#[derive(Debug)]
pub struct MachineState {
    pub feedrate: f64,
    pub file_state: Option<FileReplay>,
    pub locked_resources: ResourceBitmap,
    pub state: GCodeState,
    pub tool_change_param: u8,
    pub new_tool_number: i16,

    pub drives_relative: bool,
    pub axes_relative: bool,
    pub doing_file_macro: bool,
    pub wait_while_cooling: bool,
    pub running_m501: bool,
    pub running_m502: bool,
    pub volumetric_extrusion: bool,
    /// Set while another frame sits on top of this one.
    pub in_nested_procedure: bool,

    ack: Arc<Acknowledgement>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            feedrate: DEFAULT_FEEDRATE,
            file_state: None,
            locked_resources: ResourceBitmap::empty(),
            state: GCodeState::Normal,
            tool_change_param: 0,
            new_tool_number: -1,
            drives_relative: false,
            axes_relative: false,
            doing_file_macro: false,
            wait_while_cooling: false,
            running_m501: false,
            running_m502: false,
            volumetric_extrusion: false,
            in_nested_procedure: false,
            ack: Arc::default(),
        }
    }
}

impl MachineState {
    /// Return to the default state. The acknowledgement is only reused when
    /// no other context still holds a handle to it.
    pub fn reset(&mut self) {
        let mut ack = std::mem::take(&mut self.ack);
        match Arc::get_mut(&mut ack) {
            Some(unshared) => unshared.clear(),
            None => ack = Arc::default(),
        }
        *self = Self { ack, ..Self::default() };
    }

    /// Carry over the coordinate modes a nested procedure inherits.
    pub fn copy_state_from(&mut self, other: &MachineState) {
        self.drives_relative = other.drives_relative;
        self.axes_relative = other.axes_relative;
        self.feedrate = other.feedrate;
    }

    pub fn ack(&self) -> &Acknowledgement {
        &self.ack
    }

    /// Handle another context can keep to answer this frame's message.
    pub fn ack_handle(&self) -> Arc<Acknowledgement> {
        Arc::clone(&self.ack)
    }

    pub fn snapshot(&self) -> MachineStateSnapshot {
        MachineStateSnapshot {
            feedrate: self.feedrate,
            file_state: self.file_state,
            locked_resources: self.locked_resources,
            state: self.state,
            tool_change_param: self.tool_change_param,
            new_tool_number: self.new_tool_number,
            drives_relative: self.drives_relative,
            axes_relative: self.axes_relative,
            doing_file_macro: self.doing_file_macro,
            wait_while_cooling: self.wait_while_cooling,
            running_m501: self.running_m501,
            running_m502: self.running_m502,
            volumetric_extrusion: self.volumetric_extrusion,
            in_nested_procedure: self.in_nested_procedure,
            waiting_for_acknowledgement: self.ack.is_waiting(),
            message_acknowledged: self.ack.is_received(),
            message_cancelled: self.ack.is_cancelled(),
        }
    }
}

/// Plain copy of a [`MachineState`], for status reports and comparisons.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MachineStateSnapshot {
    pub feedrate: f64,
    pub file_state: Option<FileReplay>,
    pub locked_resources: ResourceBitmap,
    pub state: GCodeState,
    pub tool_change_param: u8,
    pub new_tool_number: i16,
    pub drives_relative: bool,
    pub axes_relative: bool,
    pub doing_file_macro: bool,
    pub wait_while_cooling: bool,
    pub running_m501: bool,
    pub running_m502: bool,
    pub volumetric_extrusion: bool,
    pub in_nested_procedure: bool,
    pub waiting_for_acknowledgement: bool,
    pub message_acknowledged: bool,
    pub message_cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_normal_and_unlocked() {
        let ms = MachineState::default();
        assert_eq!(ms.state, GCodeState::Normal);
        assert!(ms.locked_resources.is_empty());
        assert_eq!(ms.feedrate, DEFAULT_FEEDRATE);
        assert!(!ms.ack().is_waiting());
    }

    #[test]
    fn copy_state_only_carries_coordinate_modes() {
        let mut parent = MachineState::default();
        parent.feedrate = 1200.0;
        parent.axes_relative = true;
        parent.drives_relative = true;
        parent.volumetric_extrusion = true;
        parent.locked_resources.set(1).unwrap();
        parent.state = GCodeState::Homing1;

        let mut child = MachineState::default();
        child.copy_state_from(&parent);
        assert_eq!(child.feedrate, 1200.0);
        assert!(child.axes_relative && child.drives_relative);
        assert!(!child.volumetric_extrusion);
        assert!(child.locked_resources.is_empty());
        assert_eq!(child.state, GCodeState::Normal);
    }

    #[test]
    fn reset_detaches_shared_acknowledgement() {
        let mut ms = MachineState::default();
        ms.state = GCodeState::Pausing1;
        ms.ack().begin_wait();
        let handle = ms.ack_handle();
        ms.reset();
        assert_eq!(ms.state, GCodeState::Normal);
        assert!(!ms.ack().is_waiting());
        assert!(handle.acknowledge(false));
        assert!(!ms.ack().is_received());

        drop(handle);
        ms.ack().begin_wait();
        let before = Arc::as_ptr(&ms.ack_handle());
        ms.reset();
        assert_eq!(Arc::as_ptr(&ms.ack_handle()), before);
        assert!(!ms.ack().is_waiting());
    }

    #[test]
    fn acknowledgement_handshake() {
        let ack = Acknowledgement::default();
        assert!(!ack.acknowledge(false), "nothing was waiting");

        ack.begin_wait();
        assert!(ack.is_waiting());
        assert_eq!(ack.take_outcome(), None);
        assert!(ack.acknowledge(true));
        assert!(!ack.is_waiting());
        assert!(!ack.acknowledge(false), "second reply is ignored");
        assert_eq!(ack.take_outcome(), Some(AckOutcome::Cancelled));
        assert_eq!(ack.take_outcome(), None);
    }

    #[test]
    fn acknowledgement_from_another_thread() {
        let ms = MachineState::default();
        ms.ack().begin_wait();
        let handle = ms.ack_handle();
        std::thread::spawn(move || {
            assert!(handle.acknowledge(false));
        })
        .join()
        .unwrap();
        assert!(ms.ack().is_received());
        assert_eq!(ms.ack().take_outcome(), Some(AckOutcome::Acknowledged));
    }
}
