//! The device lifecycle state word.

use std::sync::atomic::{AtomicU32, Ordering};

/// Lifecycle states of a [`crate::Device`].
///
/// ```text
/// Uninitialized -> Stopped <-> (Starting -> Started -> Stopping) -> Stopped
/// ```
///
/// Transitions happen only through atomic exchanges on a single word, so
/// every observer sees a coherent state; `Started` is published by the
/// worker immediately before it enters the I/O loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceState {
    /// Torn down; no backend resources held.
    Uninitialized = 0,
    /// Initialized and idle.
    Stopped = 1,
    /// `start` issued; the worker is bringing the endpoint up.
    Starting = 2,
    /// The I/O loop is running.
    Started = 3,
    /// `stop` issued; waiting for the worker to wind down.
    Stopping = 4,
}

fn from_word(word: u32) -> DeviceState {
    match word {
        0 => DeviceState::Uninitialized,
        1 => DeviceState::Stopped,
        2 => DeviceState::Starting,
        3 => DeviceState::Started,
        4 => DeviceState::Stopping,
        _ => unreachable!("corrupt device state word {word}"),
    }
}

/// Atomically mutated 32-bit state word.
pub(crate) struct AtomicDeviceState(AtomicU32);

impl AtomicDeviceState {
    pub fn new(state: DeviceState) -> Self {
        AtomicDeviceState(AtomicU32::new(state as u32))
    }

    pub fn load(&self) -> DeviceState {
        from_word(self.0.load(Ordering::Acquire))
    }

    pub fn swap(&self, state: DeviceState) -> DeviceState {
        from_word(self.0.swap(state as u32, Ordering::AcqRel))
    }

    /// Transition `current -> new`, failing with the actual state if some
    /// other transition got there first.
    pub fn compare_exchange(
        &self,
        current: DeviceState,
        new: DeviceState,
    ) -> Result<DeviceState, DeviceState> {
        self.0
            .compare_exchange(current as u32, new as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(from_word)
            .map_err(from_word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_returns_previous() {
        let state = AtomicDeviceState::new(DeviceState::Stopped);
        assert_eq!(state.swap(DeviceState::Starting), DeviceState::Stopped);
        assert_eq!(state.load(), DeviceState::Starting);
    }

    #[test]
    fn compare_exchange_rejects_wrong_pre_state() {
        let state = AtomicDeviceState::new(DeviceState::Stopped);
        let err = state
            .compare_exchange(DeviceState::Started, DeviceState::Stopping)
            .unwrap_err();
        assert_eq!(err, DeviceState::Stopped);
        assert_eq!(state.load(), DeviceState::Stopped);
    }
}
