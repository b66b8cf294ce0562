use std::collections::BTreeMap;

/// An ordered chain of handlers, dispatched in ascending id order with
/// short-circuit on the first handler that reports it has handled the
/// call (returns `true`).
///
/// This mirrors the original transport's `msgHandlers`/`errHandlers` maps
/// on each connection: every session-level consumer (a `Service`, a
/// `Request`, the server's own top-level dispatch) registers under a
/// handler id and the chain walks ids low-to-high, stopping as soon as one
/// handler claims the message. A `BTreeMap` is used explicitly rather than
/// a `HashMap` so that iteration order is the id order, not an incidental
/// hash order.
pub struct HandlerChain<A> {
    handlers: BTreeMap<i32, Box<dyn FnMut(A) -> bool + Send>>,
}

impl<A> Default for HandlerChain<A> {
    fn default() -> Self {
        Self { handlers: BTreeMap::new() }
    }
}

impl<A: Copy> HandlerChain<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`. Registering a second handler under
    /// an id already in use replaces the first, matching the original's
    /// `map::insert` semantics on `addMsgHandler`/`addErrorHandler`.
    pub fn register(&mut self, id: i32, handler: impl FnMut(A) -> bool + Send + 'static) {
        self.handlers.insert(id, Box::new(handler));
    }

    pub fn deregister(&mut self, id: i32) {
        self.handlers.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Calls each handler in ascending id order, stopping at (and
    /// returning `true` for) the first one that returns `true`. Returns
    /// `false` if every handler declines or none are registered.
    pub fn dispatch(&mut self, arg: A) -> bool {
        for handler in self.handlers.values_mut() {
            if handler(arg) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn dispatches_in_ascending_id_order_and_short_circuits() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain: HandlerChain<&str> = HandlerChain::new();

        {
            let calls = calls.clone();
            chain.register(20, move |_msg| {
                calls.lock().unwrap().push(20);
                false
            });
        }
        {
            let calls = calls.clone();
            chain.register(10, move |_msg| {
                calls.lock().unwrap().push(10);
                true
            });
        }
        {
            let calls = calls.clone();
            chain.register(5, move |_msg| {
                calls.lock().unwrap().push(5);
                false
            });
        }

        let handled = chain.dispatch("hello");

        assert!(handled);
        // id 5 runs first, claims nothing, id 10 runs next and claims it;
        // id 20 never runs because 10 short-circuited the chain.
        assert_eq!(*calls.lock().unwrap(), vec![5, 10]);
    }

    #[test]
    fn unclaimed_message_falls_through_to_false() {
        let mut chain: HandlerChain<&str> = HandlerChain::new();
        chain.register(1, |_msg| false);
        chain.register(2, |_msg| false);
        assert!(!chain.dispatch("unrecognized"));
    }

    #[test]
    fn deregister_removes_a_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut chain: HandlerChain<&str> = HandlerChain::new();
        {
            let count = count.clone();
            chain.register(1, move |_msg| {
                count.fetch_add(1, Ordering::SeqCst);
                true
            });
        }
        chain.deregister(1);
        assert!(!chain.dispatch("x"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
