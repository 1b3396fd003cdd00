//! Non-recursive single-threaded event bus an `Archive` fires mutation
//! notifications through, and observers (UI panels, undo managers, the
//! `ArchiveManager`-equivalent) subscribe to.

use crate::archive::entry::ArchiveEntry;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ArchiveEvent {
    EntryAdded { entry: ArchiveEntry },
    EntryRemoved { entry: ArchiveEntry, dir_path: String, index: usize },
    EntryStateChanged { entry: ArchiveEntry },
    EntriesSwapped { index1: usize, index2: usize, dir_path: String },
    EntryRenamed { entry: ArchiveEntry, old_name: String },
    Saved,
    Modified,
}

pub type Listener = Arc<dyn Fn(&ArchiveEvent) + Send + Sync>;

/// Dispatch queue with re-entrancy guarded by a single `dispatching` flag:
/// a listener that triggers another `emit` while one is in progress gets its
/// event appended to the queue rather than recursing, so the archive's own
/// mutation methods stay simple call/return pairs.
#[derive(Default)]
pub struct SignalBus {
    listeners: parking_lot::Mutex<Vec<Listener>>,
    queue: parking_lot::Mutex<Vec<ArchiveEvent>>,
    dispatching: std::sync::atomic::AtomicBool,
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) {
        self.listeners.lock().push(listener);
    }

    pub fn emit(&self, event: ArchiveEvent) {
        self.queue.lock().push(event);
        self.drain();
    }

    fn drain(&self) {
        use std::sync::atomic::Ordering;
        if self.dispatching.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let next = self.queue.lock().pop();
            let Some(event) = next else { break };
            let listeners = self.listeners.lock().clone();
            for listener in &listeners {
                listener(&event);
            }
        }
        self.dispatching.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listener_receives_emitted_events_in_order() {
        let bus = SignalBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        bus.subscribe(Arc::new(move |_event| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));
        bus.emit(ArchiveEvent::Saved);
        bus.emit(ArchiveEvent::Modified);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reentrant_emit_from_listener_does_not_recurse() {
        let bus = Arc::new(SignalBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let bus2 = bus.clone();
        let seen2 = seen.clone();
        bus.subscribe(Arc::new(move |event| {
            seen2.fetch_add(1, Ordering::SeqCst);
            if matches!(event, ArchiveEvent::Modified) {
                bus2.emit(ArchiveEvent::Saved);
            }
        }));
        bus.emit(ArchiveEvent::Modified);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
