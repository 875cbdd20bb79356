//! Session events and the subscriber registry
//!
//! Handlers are keyed by [`EventKind`] and run synchronously, in registration
//! order, on the thread that emits. Emission works on a snapshot of the
//! handler list, so a handler may subscribe, dispose, or call back into the
//! session while it runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::geometry::Geometry;

/// Kinds of events a host can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Exit,
    Resize,
    Stdin,
    Stdout,
    Focus,
    Blur,
    TitleChanged,
}

/// Session events
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Bytes the screen itself sent upstream (terminal replies)
    Data(String),
    /// Session has exited, with the child's exit code when known
    Exit(Option<u32>),
    /// Geometry applied
    Resize(Geometry),
    /// Bytes delivered to the child's input channel
    Stdin(Vec<u8>),
    /// Decoded child output written to the screen
    Stdout(String),
    Focus,
    Blur,
    /// Raw title from a title escape sequence, before truncation
    TitleChanged(String),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Data(_) => EventKind::Data,
            SessionEvent::Exit(_) => EventKind::Exit,
            SessionEvent::Resize(_) => EventKind::Resize,
            SessionEvent::Stdin(_) => EventKind::Stdin,
            SessionEvent::Stdout(_) => EventKind::Stdout,
            SessionEvent::Focus => EventKind::Focus,
            SessionEvent::Blur => EventKind::Blur,
            SessionEvent::TitleChanged(_) => EventKind::TitleChanged,
        }
    }
}

type Handler = Rc<dyn Fn(&SessionEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Per-kind ordered handler lists
#[derive(Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));

        Subscription {
            registry: Rc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Call every handler registered for the event's kind
    pub fn emit(&self, event: &SessionEvent) {
        let snapshot: Vec<Handler> = match self.registry.borrow().handlers.get(&event.kind()) {
            Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return,
        };

        for handler in snapshot {
            handler(event);
        }
    }

    /// Drop every handler
    pub fn clear(&self) {
        self.registry.borrow_mut().handlers.clear();
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .borrow()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Disposer returned by every subscription
///
/// Dropping it keeps the handler registered; call [`Subscription::dispose`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unregister the handler. Harmless if the bus is gone or was cleared.
    pub fn dispose(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        if let Some(list) = registry.handlers.get_mut(&self.kind) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            bus.subscribe(EventKind::Focus, move |_| order.borrow_mut().push(n));
        }
        bus.emit(&SessionEvent::Focus);

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_emit_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        bus.subscribe(EventKind::Blur, move |_| counter.set(counter.get() + 1));

        bus.emit(&SessionEvent::Focus);
        bus.emit(&SessionEvent::Stdout("x".into()));
        assert_eq!(hits.get(), 0);

        bus.emit(&SessionEvent::Blur);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dispose_removes_only_that_handler() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(Vec::new()));

        let a = hits.clone();
        let first = bus.subscribe(EventKind::Exit, move |_| a.borrow_mut().push("a"));
        let b = hits.clone();
        let _second = bus.subscribe(EventKind::Exit, move |_| b.borrow_mut().push("b"));

        first.dispose();
        bus.emit(&SessionEvent::Exit(None));

        assert_eq!(*hits.borrow(), vec!["b"]);
        assert_eq!(bus.handler_count(EventKind::Exit), 1);
    }

    #[test]
    fn test_same_closure_may_register_twice() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let handler = {
            let hits = hits.clone();
            move |_: &SessionEvent| hits.set(hits.get() + 1)
        };
        bus.subscribe(EventKind::Resize, handler.clone());
        bus.subscribe(EventKind::Resize, handler);

        bus.emit(&SessionEvent::Resize(Geometry::new(80, 24)));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = Rc::new(EventBus::new());
        let inner_hits = Rc::new(Cell::new(0));

        let bus_ref = Rc::downgrade(&bus);
        let hits = inner_hits.clone();
        bus.subscribe(EventKind::Focus, move |_| {
            if let Some(bus) = bus_ref.upgrade() {
                let hits = hits.clone();
                bus.subscribe(EventKind::Focus, move |_| hits.set(hits.get() + 1));
            }
        });

        // The handler added mid-emit does not run for the current event
        bus.emit(&SessionEvent::Focus);
        assert_eq!(inner_hits.get(), 0);
        assert_eq!(bus.handler_count(EventKind::Focus), 2);
    }

    #[test]
    fn test_dispose_after_clear_is_noop() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::Data, |_| {});
        bus.clear();
        sub.dispose();
        assert_eq!(bus.handler_count(EventKind::Data), 0);

        let orphan = {
            let bus = EventBus::new();
            bus.subscribe(EventKind::Data, |_| {})
        };
        orphan.dispose();
    }
}
