//! Ordered, synchronous change notification.
//!
//! [`Observers`] keeps zero or more callbacks and invokes them in the order
//! they were registered, on the caller's stack. Registration hands back an
//! [`ObserverId`] that can later be used to unsubscribe.

use std::fmt;

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<E> = Box<dyn FnMut(&E)>;

/// A list of callbacks for events of type `E`.
pub struct Observers<E> {
    callbacks: Vec<(ObserverId, Callback<E>)>,
    next_id: u64,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It runs after every previously registered one.
    pub fn subscribe(&mut self, callback: impl FnMut(&E) + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Invoke every callback with `event`, in registration order.
    pub fn notify(&mut self, event: &E) {
        for (_, callback) in &mut self.callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn callbacks_run_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::<u32>::new();
        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            observers.subscribe(move |value| seen.borrow_mut().push(format!("{tag}{value}")));
        }
        observers.notify(&7);
        assert_eq!(*seen.borrow(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let count = Rc::new(RefCell::new(0));
        let mut observers = Observers::<()>::new();
        let c1 = Rc::clone(&count);
        let first = observers.subscribe(move |_| *c1.borrow_mut() += 1);
        let c2 = Rc::clone(&count);
        observers.subscribe(move |_| *c2.borrow_mut() += 10);

        assert!(observers.unsubscribe(first));
        assert!(!observers.unsubscribe(first));
        observers.notify(&());
        assert_eq!(*count.borrow(), 10);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn notify_with_no_subscribers_is_noop() {
        let mut observers = Observers::<String>::new();
        observers.notify(&"nothing".to_owned());
        assert!(observers.is_empty());
    }
}
