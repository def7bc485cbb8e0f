//! A one-slot blocking cell.

use std::sync::{Condvar, Mutex};

/// A value that can be stored and taken atomically.
///
/// `take` blocks until a value is present. Used for the id-mapping
/// round-trip between an indexer thread and the query-database thread.
#[derive(Default)]
pub struct AtomicObject<T> {
    slot: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T> AtomicObject<T> {
    pub fn new() -> AtomicObject<T> {
        AtomicObject {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    pub fn set(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
        self.cv.notify_one();
    }

    /// Stores `value` only when the slot is empty.
    pub fn set_if_empty(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(value);
            self.cv.notify_one();
        }
    }

    /// Blocks until a value is present, then removes and returns it.
    pub fn take(&self) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = self.cv.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Runs `action` with exclusive access to the slot. Waiters are notified
    /// when the action changes the slot between empty and occupied.
    pub fn with_lock(&self, action: impl FnOnce(&mut Option<T>)) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let had_value = slot.is_some();
        action(&mut slot);
        if had_value != slot.is_some() {
            self.cv.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn take_blocks_until_set() {
        let cell = Arc::new(AtomicObject::new());
        let setter = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cell.set(42);
            })
        };
        assert_eq!(cell.take(), 42);
        setter.join().unwrap();
    }

    #[test]
    fn set_if_empty_keeps_existing() {
        let cell = AtomicObject::new();
        cell.set(1);
        cell.set_if_empty(2);
        assert_eq!(cell.take(), 1);
        cell.set_if_empty(3);
        assert_eq!(cell.take(), 3);
    }
}
