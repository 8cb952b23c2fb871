use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::EventParams;

pub type ListenerFn = Arc<dyn Fn(&EventParams) + Send + Sync>;

#[derive(Default)]
struct HubState {
    registered: HashSet<String>,
    listeners: HashMap<String, Vec<ListenerFn>>,
    /// Events triggered since the last successful `wait_for`.
    triggered: HashSet<String>,
}

/// Listener table plus per-event "triggered" flags.
///
/// Listeners run on the triggering thread, outside the hub's lock, so they
/// may call back into the hub.
#[derive(Default)]
pub struct EventHub {
    state: Mutex<HubState>,
    triggered: Condvar,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an event name. Triggering works without this; it only feeds
    /// [`is_registered`](Self::is_registered) and diagnostics.
    pub fn register_event(&self, name: impl Into<String>) {
        let name = name.into();
        log::debug!("event `{name}` registered");
        self.state.lock().registered.insert(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.state.lock().registered.contains(name)
    }

    pub fn register_listener<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&EventParams) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .listeners
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Removes every listener of `name`. Returns how many were removed.
    pub fn unregister_listeners(&self, name: &str) -> usize {
        self.state
            .lock()
            .listeners
            .remove(name)
            .map_or(0, |listeners| listeners.len())
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.state.lock().listeners.get(name).map_or(0, Vec::len)
    }

    /// Calls every listener of `name` in registration order, then wakes
    /// waiters.
    pub fn trigger(&self, name: &str, params: &EventParams) {
        let listeners = {
            let state = self.state.lock();
            if !state.registered.contains(name) {
                log::trace!("triggering unregistered event `{name}`");
            }
            state.listeners.get(name).cloned().unwrap_or_default()
        };

        for listener in &listeners {
            listener(params);
        }

        self.state.lock().triggered.insert(name.to_string());
        self.triggered.notify_all();
    }

    /// Blocks until `name` is triggered or `timeout` passes.
    ///
    /// Consumes the triggered flag: a trigger that happened before the call
    /// satisfies exactly one wait.
    pub fn wait_for(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.triggered.remove(name) {
                return true;
            }
            if self.triggered.wait_until(&mut state, deadline).timed_out() {
                return state.triggered.remove(name);
            }
        }
    }

    /// Forgets every event, listener and pending trigger.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.registered.clear();
        state.listeners.clear();
        state.triggered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventValue;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::thread;

    #[test]
    fn listeners_receive_params_in_order() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hub.register_listener("tick", move |p: &EventParams| {
                seen.lock().push((tag, p.int("n")));
            });
        }

        hub.trigger("tick", &EventParams::new().with("n", EventValue::Int(3)));

        assert_eq!(*seen.lock(), vec![("first", Some(3)), ("second", Some(3))]);
    }

    #[test]
    fn unregister_removes_all_listeners_of_an_event() {
        let hub = EventHub::new();
        let hits = Arc::new(AtomicI64::new(0));
        let h = Arc::clone(&hits);
        hub.register_listener("a", move |_: &EventParams| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        hub.register_listener("a", |_: &EventParams| {});

        assert_eq!(hub.unregister_listeners("a"), 2);
        hub.trigger("a", &EventParams::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(hub.listener_count("a"), 0);
    }

    #[test]
    fn listener_may_reenter_the_hub() {
        let hub = Arc::new(EventHub::new());
        let inner = Arc::clone(&hub);
        hub.register_listener("outer", move |_: &EventParams| {
            inner.trigger("inner", &EventParams::new());
        });

        hub.trigger("outer", &EventParams::new());
        assert!(hub.wait_for("inner", Duration::ZERO));
    }

    #[test]
    fn wait_for_consumes_one_trigger() {
        let hub = EventHub::new();
        hub.trigger("done", &EventParams::new());

        assert!(hub.wait_for("done", Duration::from_millis(10)));
        assert!(!hub.wait_for("done", Duration::from_millis(10)));
    }

    #[test]
    fn wait_for_wakes_on_trigger_from_another_thread() {
        let hub = Arc::new(EventHub::new());
        let producer = Arc::clone(&hub);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.trigger("ready", &EventParams::new());
        });

        assert!(hub.wait_for("ready", Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn clear_forgets_everything() {
        let hub = EventHub::new();
        hub.register_event("x");
        hub.register_listener("x", |_: &EventParams| {});
        hub.trigger("x", &EventParams::new());

        hub.clear();

        assert!(!hub.is_registered("x"));
        assert_eq!(hub.listener_count("x"), 0);
        assert!(!hub.wait_for("x", Duration::ZERO));
    }
}
