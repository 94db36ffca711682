use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Handler<T> {
    id: HandlerId,
    once: bool,
    callback: Box<dyn FnMut(&T)>,
}

/// Observer list. Handlers run in registration order; one-shot handlers are
/// dropped after the first dispatch that reaches them.
pub struct Signal<T> {
    handlers: Vec<Handler<T>>,
    next_id: u64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: impl FnMut(&T) + 'static) -> HandlerId {
        self.register(Box::new(callback), false)
    }

    pub fn add_once(&mut self, callback: impl FnMut(&T) + 'static) -> HandlerId {
        self.register(Box::new(callback), true)
    }

    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|handler| handler.id != id);
        before != self.handlers.len()
    }

    pub fn remove_all(&mut self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&mut self, payload: &T) {
        if self.handlers.is_empty() {
            return;
        }
        for handler in &mut self.handlers {
            (handler.callback)(payload);
        }
        self.handlers.retain(|handler| !handler.once);
    }

    fn register(&mut self, callback: Box<dyn FnMut(&T)>, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push(Handler { id, once, callback });
        id
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn once_handlers_fire_a_single_time() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::<u32>::new();
        let persistent = Rc::clone(&hits);
        signal.add(move |value| persistent.borrow_mut().push(("add", *value)));
        let once = Rc::clone(&hits);
        signal.add_once(move |value| once.borrow_mut().push(("once", *value)));

        signal.dispatch(&1);
        signal.dispatch(&2);

        assert_eq!(
            *hits.borrow(),
            vec![("add", 1), ("once", 1), ("add", 2)]
        );
        assert_eq!(signal.handler_count(), 1);
    }

    #[test]
    fn remove_all_drops_every_handler() {
        let mut signal = Signal::<()>::new();
        signal.add(|_| {});
        let id = signal.add_once(|_| {});
        assert!(signal.remove(id));
        assert!(!signal.remove(id));
        signal.remove_all();
        assert_eq!(signal.handler_count(), 0);
    }
}
