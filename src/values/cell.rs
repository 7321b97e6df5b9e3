//! Scalar cells - the smallest synchronized unit
//!
//! A scalar cell holds one typed value and a dirty flag. The value swap,
//! the dirty mark and the signal enqueue all happen under the cell's write
//! lock, so a concurrent flush never observes a half-applied mutation.

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::schema::ValueId;
use crate::signal::SignalRouter;
use crate::transport::SyncMessage;
use crate::value::{Variant, VariantKind};

struct Inner {
    value: Variant,
    dirty: bool,
}

/// Scalar value with the signal emission path
pub(crate) struct ScalarCell {
    id: ValueId,
    kind: VariantKind,
    inner: RwLock<Inner>,
}

impl ScalarCell {
    pub(crate) fn new(id: ValueId, kind: VariantKind) -> Self {
        Self {
            id,
            kind,
            inner: RwLock::new(Inner {
                value: Variant::default_for(kind),
                dirty: false,
            }),
        }
    }

    fn check(&self, value: &Variant) -> Result<(), StoreError> {
        if value.kind() != self.kind {
            return Err(StoreError::TypeMismatch {
                id: self.id,
                expected: self.kind.to_string(),
                got: value.kind().to_string(),
            });
        }
        Ok(())
    }

    /// Write a new value; last writer wins.
    ///
    /// `update` marks the cell dirty for the next flush, `set_signal`
    /// additionally enqueues the new value to registered consumers.
    pub(crate) fn set(
        &self,
        value: Variant,
        set_signal: bool,
        update: bool,
        signals: &SignalRouter,
    ) -> Result<(), StoreError> {
        self.check(&value)?;
        let mut w = self.inner.write();
        if set_signal {
            signals.emit(self.id, &value);
        }
        w.value = value;
        w.dirty |= update;
        Ok(())
    }

    /// Snapshot of the current value
    pub(crate) fn get(&self) -> Variant {
        self.inner.read().value.clone()
    }

    /// Apply a peer-originated write. Does not re-mark the cell dirty, so
    /// the write is not echoed back to the peer.
    pub(crate) fn apply_remote(
        &self,
        value: Variant,
        signal: bool,
        signals: &SignalRouter,
    ) -> Result<(), StoreError> {
        self.check(&value)?;
        let mut w = self.inner.write();
        if signal {
            signals.emit(self.id, &value);
        }
        w.value = value;
        Ok(())
    }

    pub(crate) fn mark_dirty(&self) {
        self.inner.write().dirty = true;
    }

    /// Take the pending change, if any, as a patch message
    pub(crate) fn flush(&self) -> Option<SyncMessage> {
        let mut w = self.inner.write();
        if !w.dirty {
            return None;
        }
        w.dirty = false;
        Some(SyncMessage::Value {
            id: self.id,
            value: w.value.clone(),
            signal: false,
        })
    }
}

/// Scalar value the consumer polls for; exempt from the signal path
pub(crate) struct StaticCell {
    id: ValueId,
    kind: VariantKind,
    inner: RwLock<Inner>,
}

impl StaticCell {
    pub(crate) fn new(id: ValueId, kind: VariantKind) -> Self {
        Self {
            id,
            kind,
            inner: RwLock::new(Inner {
                value: Variant::default_for(kind),
                dirty: false,
            }),
        }
    }

    pub(crate) fn set(&self, value: Variant, update: bool) -> Result<(), StoreError> {
        if value.kind() != self.kind {
            return Err(StoreError::TypeMismatch {
                id: self.id,
                expected: self.kind.to_string(),
                got: value.kind().to_string(),
            });
        }
        let mut w = self.inner.write();
        w.value = value;
        w.dirty |= update;
        Ok(())
    }

    pub(crate) fn get(&self) -> Variant {
        self.inner.read().value.clone()
    }

    pub(crate) fn mark_dirty(&self) {
        self.inner.write().dirty = true;
    }

    pub(crate) fn flush(&self) -> Option<SyncMessage> {
        let mut w = self.inner.write();
        if !w.dirty {
            return None;
        }
        w.dirty = false;
        Some(SyncMessage::Static {
            id: self.id,
            value: w.value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let signals = SignalRouter::new();
        let cell = ScalarCell::new(10, VariantKind::Int);
        cell.set(Variant::Int(42), false, false, &signals).unwrap();
        assert_eq!(cell.get(), Variant::Int(42));
    }

    #[test]
    fn type_mismatch_leaves_value_untouched() {
        let signals = SignalRouter::new();
        let cell = ScalarCell::new(10, VariantKind::Int);
        cell.set(Variant::Int(1), false, false, &signals).unwrap();

        let err = cell
            .set(Variant::Text("no".into()), false, true, &signals)
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { id: 10, .. }));
        assert_eq!(cell.get(), Variant::Int(1));
        assert!(cell.flush().is_none());
    }

    #[test]
    fn flush_only_after_update() {
        let signals = SignalRouter::new();
        let cell = ScalarCell::new(10, VariantKind::Bool);

        cell.set(Variant::Bool(true), false, false, &signals)
            .unwrap();
        assert!(cell.flush().is_none());

        cell.set(Variant::Bool(false), false, true, &signals)
            .unwrap();
        let msg = cell.flush().unwrap();
        assert_eq!(
            msg,
            SyncMessage::Value {
                id: 10,
                value: Variant::Bool(false),
                signal: false
            }
        );
        // dirty flag cleared by the flush
        assert!(cell.flush().is_none());
    }

    #[test]
    fn set_signal_enqueues_to_registered_consumers() {
        let signals = SignalRouter::new();
        signals.add_consumer(0);
        signals.set_register(10, true);

        let cell = ScalarCell::new(10, VariantKind::Float);
        cell.set(Variant::Float(1.5), true, false, &signals).unwrap();

        let event = signals.pop(0, None).unwrap();
        assert_eq!(event.id, 10);
        assert_eq!(event.value, Variant::Float(1.5));
    }

    #[test]
    fn remote_apply_does_not_mark_dirty() {
        let signals = SignalRouter::new();
        let cell = ScalarCell::new(10, VariantKind::Int);
        cell.apply_remote(Variant::Int(5), false, &signals).unwrap();
        assert_eq!(cell.get(), Variant::Int(5));
        assert!(cell.flush().is_none());
    }

    #[test]
    fn static_cell_flushes_static_message() {
        let cell = StaticCell::new(11, VariantKind::Text);
        cell.set(Variant::from("tick"), true).unwrap();
        let msg = cell.flush().unwrap();
        assert_eq!(
            msg,
            SyncMessage::Static {
                id: 11,
                value: Variant::from("tick")
            }
        );
    }
}
