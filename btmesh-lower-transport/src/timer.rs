use btmesh_common::address::UnicastAddress;

/// Opaque handle to a scheduled timer. Cancellation is expected to be
/// idempotent, so no `active` flag is needed alongside it (§9 design notes).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub(crate) u32);

/// Which of the layer's timers fired, and for what.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// RX acknowledgment timer for a peer's active reassembly.
    AckTimeout(UnicastAddress),
    /// RX incomplete timer for a peer's active reassembly.
    IncompleteTimeout(UnicastAddress),
    /// TX acknowledgment timer for the single active outgoing message.
    TxAckTimeout,
}

/// The only contract this layer needs from a timer facility: schedule a
/// one-shot callback after `after_ms` milliseconds carrying an opaque event,
/// and cancel it before it fires. The concrete facility (RTC, `embassy-time`,
/// a millisecond tick counter) is a host concern.
pub trait TimerSource {
    fn schedule(&mut self, after_ms: u32, event: TimerEvent) -> TimerId;
    fn cancel(&mut self, handle: TimerId);
}

/// Deterministic, manually-advanced clock for tests: `fire_due(now)` returns
/// every event whose deadline has elapsed, in the order they were scheduled.
/// Cancelled timers never fire even if their deadline has already passed.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::{TimerEvent, TimerId, TimerSource};
    use heapless::Vec;

    pub struct VirtualTimer {
        now_ms: u32,
        next_id: u32,
        pending: Vec<(TimerId, u32, TimerEvent), 16>,
    }

    impl Default for VirtualTimer {
        fn default() -> Self {
            Self {
                now_ms: 0,
                next_id: 0,
                pending: Vec::new(),
            }
        }
    }

    impl VirtualTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn now(&self) -> u32 {
            self.now_ms
        }

        /// Advances the clock and returns every event whose deadline is now
        /// due, in scheduling order.
        pub fn advance(&mut self, ms: u32) -> Vec<TimerEvent, 16> {
            self.now_ms += ms;
            let mut due = Vec::new();
            let now = self.now_ms;
            self.pending.retain(|(_, deadline, event)| {
                if *deadline <= now {
                    let _ = due.push(*event);
                    false
                } else {
                    true
                }
            });
            due
        }

        pub fn pending_count(&self) -> usize {
            self.pending.len()
        }
    }

    impl TimerSource for VirtualTimer {
        fn schedule(&mut self, after_ms: u32, event: TimerEvent) -> TimerId {
            let id = TimerId(self.next_id);
            self.next_id += 1;
            let _ = self.pending.push((id, self.now_ms + after_ms, event));
            id
        }

        fn cancel(&mut self, handle: TimerId) {
            self.pending.retain(|(id, _, _)| *id != handle);
        }
    }
}
