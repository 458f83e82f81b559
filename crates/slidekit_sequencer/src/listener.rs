// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change listeners of a sequence.
//!
//! Listeners are called in registration order every time a sequence
//! finishes a rebuild.

use std::fmt;

/// Callback run after a sequence changed
type Callback = Box<dyn FnMut()>;

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of listeners
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Callback)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&mut self) {
        for (_, callback) in &mut self.entries {
            callback();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_notify_in_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::default();

        let first = Rc::clone(&calls);
        listeners.add(Box::new(move || first.borrow_mut().push(1)));
        let second = Rc::clone(&calls);
        let id = listeners.add(Box::new(move || second.borrow_mut().push(2)));

        listeners.notify();
        assert_eq!(*calls.borrow(), vec![1, 2]);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.notify();
        assert_eq!(*calls.borrow(), vec![1, 2, 1]);
        assert_eq!(listeners.len(), 1);
    }
}
