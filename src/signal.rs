//! Signal/notification channel - per-consumer mailboxes of changed values
//!
//! A signal is an explicit notification delivered to specific, opted-in
//! consumer threads, distinct from the ordinary dirty-flush propagation.
//! Every registered consumer has its own ordered mailbox: two independent
//! UI contexts must each see every change exactly once, so this is not a
//! single shared queue.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::trace;

use crate::schema::ValueId;
use crate::value::Variant;

/// Identity of one consumer thread
pub type ConsumerId = u64;

/// One change notification: the id and a snapshot of the value at signal time
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub id: ValueId,
    pub value: Variant,
}

/// Errors from popping a consumer mailbox
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The consumer thread was never registered
    #[error("unknown signal consumer {0}")]
    UnknownConsumer(ConsumerId),

    /// Mailbox empty (zero-wait poll) or still empty after the bounded wait
    #[error("no signal pending")]
    Empty,
}

struct Mailbox {
    tx: Sender<SignalEvent>,
    rx: Receiver<SignalEvent>,
}

/// Routes signal events to registered consumer mailboxes
///
/// Emission cost control: mutations on ids nobody registered via
/// `set_register` never pay the enqueue cost.
pub struct SignalRouter {
    registered: RwLock<HashSet<ValueId>>,
    mailboxes: RwLock<HashMap<ConsumerId, Mailbox>>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self {
            registered: RwLock::new(HashSet::new()),
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a consumer thread; a new empty mailbox is created.
    /// Registering an existing consumer keeps its pending events.
    pub fn add_consumer(&self, consumer: ConsumerId) {
        let mut boxes = self.mailboxes.write();
        boxes.entry(consumer).or_insert_with(|| {
            let (tx, rx) = channel::unbounded();
            trace!(consumer, "signal consumer registered");
            Mailbox { tx, rx }
        });
    }

    /// Drop a consumer and its pending events
    pub fn remove_consumer(&self, consumer: ConsumerId) {
        self.mailboxes.write().remove(&consumer);
    }

    /// Toggle whether mutations of `id` enqueue signal events at all
    pub fn set_register(&self, id: ValueId, register: bool) {
        let mut reg = self.registered.write();
        if register {
            reg.insert(id);
        } else {
            reg.remove(&id);
        }
    }

    pub fn is_registered(&self, id: ValueId) -> bool {
        self.registered.read().contains(&id)
    }

    /// Enqueue an event to every consumer mailbox, if `id` is registered.
    ///
    /// Called by the store while holding the mutated cell's lock so the
    /// value swap and the enqueue are atomic as a unit.
    pub fn emit(&self, id: ValueId, value: &Variant) {
        if !self.is_registered(id) {
            return;
        }
        let boxes = self.mailboxes.read();
        for mailbox in boxes.values() {
            // unbounded channel, send never blocks
            let _ = mailbox.tx.send(SignalEvent {
                id,
                value: value.clone(),
            });
        }
    }

    /// Pop the oldest pending event for a consumer.
    ///
    /// `timeout` of `None` is a zero-wait poll; `Some(d)` blocks for at most
    /// `d`. Both return [`SignalError::Empty`] when nothing arrives.
    pub fn pop(
        &self,
        consumer: ConsumerId,
        timeout: Option<Duration>,
    ) -> Result<SignalEvent, SignalError> {
        // Clone the receiver so the mailbox table lock is not held while
        // blocking; cloned receivers share the same queue.
        let rx = {
            let boxes = self.mailboxes.read();
            boxes
                .get(&consumer)
                .ok_or(SignalError::UnknownConsumer(consumer))?
                .rx
                .clone()
        };

        match timeout {
            None => rx.try_recv().map_err(|_| SignalError::Empty),
            Some(d) => rx.recv_timeout(d).map_err(|_| SignalError::Empty),
        }
    }
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_id_emits_nothing() {
        let router = SignalRouter::new();
        router.add_consumer(1);
        router.emit(10, &Variant::Int(1));
        assert_eq!(router.pop(1, None), Err(SignalError::Empty));
    }

    #[test]
    fn every_consumer_sees_each_event_once() {
        let router = SignalRouter::new();
        router.add_consumer(1);
        router.add_consumer(2);
        router.set_register(10, true);

        router.emit(10, &Variant::Int(7));

        for consumer in [1, 2] {
            let event = router.pop(consumer, None).unwrap();
            assert_eq!(event.id, 10);
            assert_eq!(event.value, Variant::Int(7));
            assert_eq!(router.pop(consumer, None), Err(SignalError::Empty));
        }
    }

    #[test]
    fn unknown_consumer_is_distinct_from_empty() {
        let router = SignalRouter::new();
        assert_eq!(router.pop(9, None), Err(SignalError::UnknownConsumer(9)));
    }

    #[test]
    fn deregistering_stops_emission() {
        let router = SignalRouter::new();
        router.add_consumer(1);
        router.set_register(10, true);
        router.emit(10, &Variant::Bool(true));
        router.set_register(10, false);
        router.emit(10, &Variant::Bool(false));

        assert!(router.pop(1, None).is_ok());
        assert_eq!(router.pop(1, None), Err(SignalError::Empty));
    }

    #[test]
    fn bounded_wait_times_out() {
        let router = SignalRouter::new();
        router.add_consumer(1);
        let started = std::time::Instant::now();
        let res = router.pop(1, Some(Duration::from_millis(20)));
        assert_eq!(res, Err(SignalError::Empty));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn events_pop_in_order() {
        let router = SignalRouter::new();
        router.add_consumer(1);
        router.set_register(5, true);
        for i in 0..4 {
            router.emit(5, &Variant::Int(i));
        }
        for i in 0..4 {
            assert_eq!(router.pop(1, None).unwrap().value, Variant::Int(i));
        }
    }
}
