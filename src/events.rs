use std::collections::HashMap;
use std::fmt::Display;

use bevy::log::warn;

use crate::error::CallbackError;

pub const IMPACT_EVENT: &str = "impact";

/// Named event -> callbacks, in registration order. Registrations are
/// additive; there is no way to remove one.
pub struct EventBus<C> {
    handlers: HashMap<String, Vec<C>>,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C: Clone> EventBus<C> {
    pub fn register(&mut self, event: impl Into<String>, callback: C) {
        self.handlers.entry(event.into()).or_default().push(callback);
    }

    /// Snapshot of the handlers for `event`. Callbacks registered while a
    /// dispatch runs are picked up by the next dispatch, not the current one.
    pub fn handlers(&self, event: &str) -> Vec<C> {
        self.handlers.get(event).cloned().unwrap_or_default()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<CallbackError>,
}

/// Runs every handler in order. A failing handler is logged and recorded,
/// and the remaining handlers still run.
pub fn dispatch<C, E, F>(event: &str, handlers: &[C], mut invoke: F) -> DispatchReport
where
    E: Display,
    F: FnMut(&C) -> Result<(), E>,
{
    let mut report = DispatchReport::default();
    for (handler_index, handler) in handlers.iter().enumerate() {
        match invoke(handler) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                let failure = CallbackError {
                    event: event.to_string(),
                    handler_index,
                    message: err.to_string(),
                };
                warn!("[Arcane events] {failure}");
                report.failures.push(failure);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;
    type Handler = Rc<dyn Fn(&Log) -> Result<(), String>>;

    fn handler(name: &'static str) -> Handler {
        Rc::new(move |log: &Log| -> Result<(), String> {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn dispatches_in_registration_order() {
        let mut bus = EventBus::<Handler>::default();
        bus.register(IMPACT_EVENT, handler("a"));
        bus.register(IMPACT_EVENT, handler("b"));
        bus.register("other", handler("c"));

        let log = Log::default();
        let report = dispatch(IMPACT_EVENT, &bus.handlers(IMPACT_EVENT), |h| (**h)(&log));
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let mut bus = EventBus::<Handler>::default();
        bus.register(IMPACT_EVENT, handler("a"));
        bus.register(
            IMPACT_EVENT,
            Rc::new(|_: &Log| -> Result<(), String> { Err("boom".to_string()) }) as Handler,
        );
        bus.register(IMPACT_EVENT, handler("c"));

        let log = Log::default();
        let report = dispatch(IMPACT_EVENT, &bus.handlers(IMPACT_EVENT), |h| (**h)(&log));
        assert_eq!(*log.borrow(), vec!["a", "c"]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handler_index, 1);
        assert_eq!(report.failures[0].message, "boom");
        assert_eq!(report.failures[0].event, IMPACT_EVENT);
    }

    #[test]
    fn unknown_event_dispatches_nothing() {
        let bus = EventBus::<Handler>::default();
        let log = Log::default();
        let report = dispatch("nope", &bus.handlers("nope"), |h| (**h)(&log));
        assert_eq!(report.delivered, 0);
        assert!(report.failures.is_empty());
        assert_eq!(bus.handler_count("nope"), 0);
    }

    #[test]
    fn event_types_are_listed_sorted() {
        let mut bus = EventBus::<u8>::default();
        bus.register("zap", 1);
        bus.register(IMPACT_EVENT, 2);
        bus.register(IMPACT_EVENT, 3);
        assert_eq!(bus.event_types(), vec!["impact".to_string(), "zap".to_string()]);
        assert_eq!(bus.handler_count(IMPACT_EVENT), 2);
    }
}
