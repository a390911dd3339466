//! Inter-thread event bus decoupling acquisition from presentation.
//!
//! One dedicated dispatch thread owns delivery: publishers enqueue
//! `(signal, payload)` pairs on an unbounded channel and never block or run
//! listener code themselves. Listeners are registered per signal name and
//! invoked synchronously on the dispatch thread, in registration order, so
//! a slow listener delays later deliveries but never a publisher.
//!
//! Delivery is strictly FIFO and lossless: every publish reaches every
//! listener registered for its signal at dispatch time. (An earlier design
//! held exactly one pending message and overwrote it on rapid publishes;
//! the channel removes that hazard.)
//!
//! Cooperative cancellation rides beside the message path, not through it:
//! [`BusHandle::set_done`] flips an atomic flag that the acquisition loop
//! polls between reads, so checking for cancellation never contends with
//! message dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Well-known signal names published by the acquisition session.
pub mod signal {
    /// Human-readable progress strings for a status display.
    pub const DISPLAY: &str = "display";
    /// Run has entered its running state (empty payload); countdown
    /// listeners key off this exact signal.
    pub const RUN_START: &str = "run_start";
    /// Payload carries the byte count just appended to the log.
    pub const BYTES_RECEIVED: &str = "bytes_received";
}

/// Callback invoked on the dispatch thread with the signal payload.
pub type Listener = Box<dyn FnMut(&str) + Send>;

enum BusMessage {
    Signal { name: String, payload: String },
    Shutdown,
}

type ListenerTable = Arc<Mutex<HashMap<String, Vec<Listener>>>>;

/// Cloneable publisher/cancellation handle, safe to move into worker
/// threads.
#[derive(Clone)]
pub struct BusHandle {
    tx: Sender<BusMessage>,
    done: Arc<AtomicBool>,
}

impl BusHandle {
    /// Enqueues `payload` for everyone listening on `name`. Never blocks;
    /// after the bus has closed this is a no-op.
    pub fn publish(&self, name: &str, payload: &str) {
        let msg = BusMessage::Signal {
            name: name.to_string(),
            payload: payload.to_string(),
        };
        if self.tx.send(msg).is_err() {
            log::warn!("Event bus closed; dropping signal '{name}'");
        }
    }

    /// Sets the cooperative cancellation flag.
    pub fn set_done(&self, value: bool) {
        self.done.store(value, Ordering::SeqCst);
    }

    /// Reads the cooperative cancellation flag.
    pub fn check_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// The event bus: owns the dispatch thread and the listener table.
pub struct EventBus {
    handle: BusHandle,
    listeners: ListenerTable,
    dispatch: Option<JoinHandle<()>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Starts the dispatch thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<BusMessage>();
        let listeners: ListenerTable = Arc::new(Mutex::new(HashMap::new()));
        let table = Arc::clone(&listeners);

        let dispatch = thread::Builder::new()
            .name("bus-dispatch".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        BusMessage::Signal { name, payload } => {
                            let mut table = match table.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            if let Some(callbacks) = table.get_mut(&name) {
                                for callback in callbacks.iter_mut() {
                                    callback(&payload);
                                }
                            } else {
                                log::debug!("No listeners for signal '{name}'");
                            }
                        }
                        BusMessage::Shutdown => break,
                    }
                }
            })
            .map_err(|e| {
                log::error!("Failed to spawn bus dispatch thread: {e}");
                e
            })
            .ok();

        Self {
            handle: BusHandle {
                tx,
                done: Arc::new(AtomicBool::new(false)),
            },
            listeners,
            dispatch,
        }
    }

    /// A cloneable handle for publishers and the acquisition loop.
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Appends `callback` to the listener list for `name`. Listeners fire
    /// in registration order; registering never disturbs an in-flight
    /// dispatch (the table lock is held only around delivery of a single
    /// message).
    pub fn register_listener(&self, name: &str, callback: Listener) {
        let mut table = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.entry(name.to_string()).or_default().push(callback);
    }

    /// Removes every listener registered for `name`.
    pub fn unregister(&self, name: &str) {
        let mut table = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.remove(name);
    }

    /// Convenience passthrough to [`BusHandle::publish`].
    pub fn publish(&self, name: &str, payload: &str) {
        self.handle.publish(name, payload);
    }

    /// Convenience passthrough to [`BusHandle::set_done`].
    pub fn set_done(&self, value: bool) {
        self.handle.set_done(value);
    }

    /// Convenience passthrough to [`BusHandle::check_done`].
    pub fn check_done(&self) -> bool {
        self.handle.check_done()
    }

    /// Shuts the bus down: sets `done` (unblocking any acquisition loop),
    /// wakes the dispatch thread with a shutdown message, and joins it.
    /// After `close` returns no listener will run again. Idempotent.
    pub fn close(&mut self) {
        self.handle.set_done(true);
        if let Some(dispatch) = self.dispatch.take() {
            // Queued signals drain first; the sentinel is FIFO like any
            // other message.
            let _ = self.handle.tx.send(BusMessage::Shutdown);
            if dispatch.join().is_err() {
                log::error!("Bus dispatch thread panicked");
            }
            log::debug!("Event bus closed");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_listener_receives_payload() {
        let mut bus = EventBus::new();
        let (tx, rx) = channel();
        bus.register_listener(
            signal::BYTES_RECEIVED,
            Box::new(move |payload| {
                tx.send(payload.to_string()).ok();
            }),
        );

        bus.publish(signal::BYTES_RECEIVED, "42");
        let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got, "42");
        bus.close();
    }

    #[test]
    fn test_delivery_is_fifo_across_signals() {
        let mut bus = EventBus::new();
        let (tx, rx) = channel();
        let tx_a = tx.clone();
        bus.register_listener(
            "a",
            Box::new(move |p| {
                tx_a.send(format!("a:{p}")).ok();
            }),
        );
        bus.register_listener(
            "b",
            Box::new(move |p| {
                tx.send(format!("b:{p}")).ok();
            }),
        );

        for i in 0..10 {
            bus.publish("a", &i.to_string());
            bus.publish("b", &i.to_string());
        }

        let mut got = Vec::new();
        for _ in 0..20 {
            got.push(rx.recv_timeout(Duration::from_secs(1)).unwrap());
        }
        let expected: Vec<String> = (0..10)
            .flat_map(|i| [format!("a:{i}"), format!("b:{i}")])
            .collect();
        assert_eq!(got, expected);
        bus.close();
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let mut bus = EventBus::new();
        let (tx, rx) = channel();
        for tag in ["first", "second", "third"] {
            let tx = tx.clone();
            bus.register_listener(
                "s",
                Box::new(move |_| {
                    tx.send(tag).ok();
                }),
            );
        }

        bus.publish("s", "");
        let order: Vec<&str> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(order, ["first", "second", "third"]);
        bus.close();
    }

    #[test]
    fn test_unrelated_signal_not_delivered() {
        let mut bus = EventBus::new();
        let (tx, rx) = channel();
        bus.register_listener(
            "wanted",
            Box::new(move |p| {
                tx.send(p.to_string()).ok();
            }),
        );

        bus.publish("unwanted", "nope");
        bus.publish("wanted", "yes");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "yes");
        assert!(rx.try_recv().is_err());
        bus.close();
    }

    #[test]
    fn test_close_terminates_and_sets_done() {
        let mut bus = EventBus::new();
        assert!(!bus.check_done());
        bus.close();
        assert!(bus.check_done());
        // Idempotent; publishing afterwards must not panic.
        bus.close();
        bus.publish(signal::DISPLAY, "too late");
    }

    #[test]
    fn test_done_flag_independent_of_messages() {
        let bus = EventBus::new();
        let handle = bus.handle();
        assert!(!handle.check_done());
        handle.set_done(true);
        assert!(handle.check_done());
        handle.set_done(false);
        assert!(!handle.check_done());
    }
}
