//! Virtual-clock scheduling
//!
//! The mixer tick is driven by the emulator's virtual clock rather than wall
//! time. Components register callbacks with a [`Scheduler`] and arm them a
//! number of cycles into the future; when a callback fires it is told how
//! many cycles late it ran so periodic events can compensate.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::trace;

/// Handle to a registered event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(usize);

/// Event callback
///
/// Receives the number of cycles the firing was late by. Returning
/// `Some(cycles)` re-arms the event that many cycles after the current time;
/// a negative value lands in the past and fires again within the same slice.
pub type EventCallback = Box<dyn FnMut(i64) -> Option<i64> + Send>;

/// Virtual-time event scheduler
pub trait Scheduler {
    /// Register a callback under a diagnostic name
    fn register_event(&mut self, name: &'static str, callback: EventCallback) -> EventId;

    /// Arm an event to fire `cycles_into_future` cycles from now
    fn schedule_event(&mut self, cycles_into_future: u64, event: EventId);

    /// Cancel any pending firings of an event
    fn unschedule_event(&mut self, event: EventId);

    /// Cancel and drop a registered callback
    fn unregister_event(&mut self, event: EventId);
}

struct RegisteredEvent {
    name: &'static str,
    callback: EventCallback,
    /// Bumped on unschedule so stale heap entries are skipped
    generation: u64,
}

/// Cycle-counting scheduler
///
/// Time only moves when [`advance`](VirtualClock::advance) is called. Events
/// that fall inside an advanced slice fire at the end of the slice, in due
/// order, and observe their lateness relative to their due time.
pub struct VirtualClock {
    now: u64,
    sequence: u64,
    events: Vec<Option<RegisteredEvent>>,
    /// (due, sequence, event, generation)
    pending: BinaryHeap<Reverse<(u64, u64, usize, u64)>>,
}

impl VirtualClock {
    /// Create a clock at cycle zero
    pub fn new() -> Self {
        VirtualClock {
            now: 0,
            sequence: 0,
            events: Vec::new(),
            pending: BinaryHeap::new(),
        }
    }

    /// Current virtual time in cycles
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Number of armed firings
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|Reverse((_, _, id, generation))| self.is_live(*id, *generation))
            .count()
    }

    fn is_live(&self, id: usize, generation: u64) -> bool {
        matches!(self.events.get(id), Some(Some(e)) if e.generation == generation)
    }

    fn push(&mut self, due: u64, id: usize) {
        let Some(Some(event)) = self.events.get(id) else {
            return;
        };
        let generation = event.generation;
        self.sequence += 1;
        self.pending
            .push(Reverse((due, self.sequence, id, generation)));
    }

    /// Advance virtual time by `cycles`, firing every event that becomes due
    ///
    /// Returns the number of callbacks fired.
    pub fn advance(&mut self, cycles: u64) -> usize {
        self.now += cycles;
        let mut fired = 0;

        while let Some(Reverse((due, _, id, generation))) = self.pending.peek().copied() {
            if due > self.now {
                break;
            }
            self.pending.pop();
            if !self.is_live(id, generation) {
                continue;
            }

            let cycles_late = (self.now - due) as i64;
            let rearm = match self.events.get_mut(id) {
                Some(Some(event)) => {
                    trace!(event = event.name, cycles_late, "firing event");
                    (event.callback)(cycles_late)
                }
                _ => None,
            };
            fired += 1;

            if let Some(delay) = rearm {
                self.push(self.now.saturating_add_signed(delay), id);
            }
        }

        fired
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualClock {
    fn register_event(&mut self, name: &'static str, callback: EventCallback) -> EventId {
        self.events.push(Some(RegisteredEvent {
            name,
            callback,
            generation: 0,
        }));
        EventId(self.events.len() - 1)
    }

    fn schedule_event(&mut self, cycles_into_future: u64, event: EventId) {
        self.push(self.now + cycles_into_future, event.0);
    }

    fn unschedule_event(&mut self, event: EventId) {
        if let Some(Some(registered)) = self.events.get_mut(event.0) {
            registered.generation += 1;
        }
    }

    fn unregister_event(&mut self, event: EventId) {
        if let Some(slot) = self.events.get_mut(event.0) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn periodic(period: u64, log: Arc<Mutex<Vec<i64>>>) -> EventCallback {
        Box::new(move |late| {
            log.lock().push(late);
            Some(period as i64 - late)
        })
    }

    #[test]
    fn test_event_fires_when_due() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = VirtualClock::new();
        let id = clock.register_event("test", periodic(100, Arc::clone(&log)));
        clock.schedule_event(100, id);

        assert_eq!(clock.advance(99), 0);
        assert_eq!(clock.advance(1), 1);
        assert_eq!(*log.lock(), vec![0]);
    }

    #[test]
    fn test_lateness_correction_keeps_average_rate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = VirtualClock::new();
        let id = clock.register_event("test", periodic(100, Arc::clone(&log)));
        clock.schedule_event(100, id);

        // Uneven slices: 1000 cycles must still yield exactly 10 firings
        let mut fired = 0;
        for slice in [130, 70, 250, 50, 333, 167] {
            fired += clock.advance(slice);
        }
        assert_eq!(fired, 10);
        assert_eq!(log.lock()[0], 30, "first firing was 30 cycles late");
    }

    #[test]
    fn test_large_advance_fires_every_period() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = VirtualClock::new();
        let id = clock.register_event("test", periodic(100, Arc::clone(&log)));
        clock.schedule_event(100, id);

        assert_eq!(clock.advance(450), 4);
        assert_eq!(*log.lock(), vec![350, 250, 150, 50]);
    }

    #[test]
    fn test_unschedule_stops_firing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = VirtualClock::new();
        let id = clock.register_event("test", periodic(100, Arc::clone(&log)));
        clock.schedule_event(100, id);
        clock.advance(100);

        clock.unschedule_event(id);
        assert_eq!(clock.pending_count(), 0);
        assert_eq!(clock.advance(1000), 0);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_unregister_drops_callback() {
        let mut clock = VirtualClock::new();
        let id = clock.register_event("test", Box::new(|_| None));
        clock.schedule_event(10, id);
        clock.unregister_event(id);

        assert_eq!(clock.advance(100), 0);
    }
}
