use std::collections::HashMap;

use tracing::trace;

use crate::events::{EventKind, InboundEvent};

pub type EventHandler = Box<dyn FnMut(&InboundEvent) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Fans inbound events out to handlers registered per [`EventKind`].
///
/// Handlers run in registration order. There is no deduplication and no
/// automatic cleanup: whoever subscribes must unsubscribe when torn down.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>,
    next_id: u64,
}

impl EventRouter {
    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    pub fn unsubscribe(&mut self, kind: EventKind, id: SubscriptionId) -> bool {
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        before != handlers.len()
    }

    pub fn unsubscribe_all(&mut self, kind: EventKind) -> usize {
        self.handlers.remove(&kind).map_or(0, |handlers| handlers.len())
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Returns how many handlers saw the event; zero means it was dropped.
    pub fn route(&mut self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            trace!(?kind, "router: no subscribers, dropping event");
            return 0;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(event);
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use shared::domain::UserId;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventHandler {
        let log = Arc::clone(log);
        Box::new(move |event| {
            if let InboundEvent::UserOnline(user_id) = event {
                log.lock().expect("log").push(format!("{tag}:{user_id}"));
            }
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::default();
        router.subscribe(EventKind::UserOnline, recorder(&log, "first"));
        router.subscribe(EventKind::UserOnline, recorder(&log, "second"));

        let seen = router.route(&InboundEvent::UserOnline(UserId::from("u1")));

        assert_eq!(seen, 2);
        assert_eq!(*log.lock().expect("log"), vec!["first:u1", "second:u1"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::default();
        let first = router.subscribe(EventKind::UserOnline, recorder(&log, "first"));
        router.subscribe(EventKind::UserOnline, recorder(&log, "second"));

        assert!(router.unsubscribe(EventKind::UserOnline, first));
        assert!(!router.unsubscribe(EventKind::UserOnline, first));
        router.route(&InboundEvent::UserOnline(UserId::from("u1")));

        assert_eq!(*log.lock().expect("log"), vec!["second:u1"]);
    }

    #[test]
    fn unsubscribe_all_leaves_other_kinds_alone() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::default();
        router.subscribe(EventKind::UserOnline, recorder(&log, "a"));
        router.subscribe(EventKind::UserOnline, recorder(&log, "b"));
        router.subscribe(EventKind::UserOffline, recorder(&log, "c"));

        assert_eq!(router.unsubscribe_all(EventKind::UserOnline), 2);
        assert_eq!(router.handler_count(EventKind::UserOnline), 0);
        assert_eq!(router.handler_count(EventKind::UserOffline), 1);
    }

    #[test]
    fn events_without_subscribers_are_dropped() {
        let mut router = EventRouter::default();
        assert_eq!(
            router.route(&InboundEvent::SendError {
                error: "boom".into()
            }),
            0
        );
    }

    #[test]
    fn duplicate_events_are_delivered_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = EventRouter::default();
        router.subscribe(EventKind::UserOnline, recorder(&log, "h"));
        let event = InboundEvent::UserOnline(UserId::from("u1"));
        router.route(&event);
        router.route(&event);
        assert_eq!(log.lock().expect("log").len(), 2);
    }
}
