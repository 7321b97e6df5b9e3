//! Dict container cell - keyed entries with per-key dirty tracking
//!
//! A dict is one value id, but single-item edits must not force the whole
//! container over the wire. The dirty record is the set of touched keys;
//! at flush time each touched key resolves against the current map (present
//! means set, absent means remove), so per-key changes are last-state-wins
//! regardless of the order they happened in.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::schema::ValueId;
use crate::transport::{DictPatch, SyncMessage};
use crate::value::{Variant, VariantKey, VariantKeyKind, VariantKind};
use crate::values::JOURNAL_COLLAPSE;

struct Inner {
    map: HashMap<VariantKey, Variant>,
    /// Whole container must be retransmitted
    full: bool,
    /// Keys changed since the last flush
    touched: HashSet<VariantKey>,
    /// At least one mutation requested a flush (`update=true`)
    pending: bool,
}

pub(crate) struct DictCell {
    id: ValueId,
    key_kind: VariantKeyKind,
    value_kind: VariantKind,
    inner: RwLock<Inner>,
}

impl DictCell {
    pub(crate) fn new(id: ValueId, key_kind: VariantKeyKind, value_kind: VariantKind) -> Self {
        Self {
            id,
            key_kind,
            value_kind,
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                full: false,
                touched: HashSet::new(),
                pending: false,
            }),
        }
    }

    fn check_key(&self, key: &VariantKey) -> Result<(), StoreError> {
        if key.kind() != self.key_kind {
            return Err(StoreError::TypeMismatch {
                id: self.id,
                expected: format!("{} key", self.key_kind),
                got: format!("{} key", key.kind()),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &Variant) -> Result<(), StoreError> {
        if value.kind() != self.value_kind {
            return Err(StoreError::TypeMismatch {
                id: self.id,
                expected: self.value_kind.to_string(),
                got: value.kind().to_string(),
            });
        }
        Ok(())
    }

    /// Replace the whole container; marks the whole id dirty
    pub(crate) fn replace(
        &self,
        map: HashMap<VariantKey, Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        for (k, v) in &map {
            self.check_key(k)?;
            self.check_value(v)?;
        }
        let mut w = self.inner.write();
        w.map = map;
        w.full = true;
        w.touched.clear();
        w.pending |= update;
        Ok(())
    }

    /// Snapshot of the whole container
    pub(crate) fn get(&self) -> HashMap<VariantKey, Variant> {
        self.inner.read().map.clone()
    }

    pub(crate) fn set_item(
        &self,
        key: VariantKey,
        value: Variant,
        update: bool,
    ) -> Result<(), StoreError> {
        self.check_key(&key)?;
        self.check_value(&value)?;
        let mut w = self.inner.write();
        if !w.full {
            w.touched.insert(key.clone());
        }
        w.map.insert(key, value);
        w.pending |= update;
        collapse_if_large(&mut w);
        Ok(())
    }

    pub(crate) fn get_item(&self, key: &VariantKey) -> Result<Variant, StoreError> {
        self.check_key(key)?;
        self.inner
            .read()
            .map
            .get(key)
            .cloned()
            .ok_or(StoreError::KeyNotFound { id: self.id })
    }

    /// Delete one key; fails with `KeyNotFound` and leaves the dict
    /// unchanged (membership, length, dirty state) when absent
    pub(crate) fn del_item(&self, key: &VariantKey, update: bool) -> Result<(), StoreError> {
        self.check_key(key)?;
        let mut w = self.inner.write();
        if w.map.remove(key).is_none() {
            return Err(StoreError::KeyNotFound { id: self.id });
        }
        if !w.full {
            w.touched.insert(key.clone());
        }
        w.pending |= update;
        collapse_if_large(&mut w);
        Ok(())
    }

    /// Non-mutating size snapshot
    pub(crate) fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub(crate) fn mark_dirty(&self) {
        let mut w = self.inner.write();
        w.full = true;
        w.touched.clear();
        w.pending = true;
    }

    /// Drain the pending dirty record into patch messages
    pub(crate) fn flush(&self) -> Vec<SyncMessage> {
        let mut w = self.inner.write();
        if !w.pending {
            return Vec::new();
        }
        let id = self.id;
        let mut out = Vec::new();
        if w.full {
            out.push(SyncMessage::Dict {
                id,
                patch: DictPatch::Replace(w.map.clone()),
            });
        } else {
            for key in w.touched.iter() {
                let patch = match w.map.get(key) {
                    Some(value) => DictPatch::Set(key.clone(), value.clone()),
                    None => DictPatch::Remove(key.clone()),
                };
                out.push(SyncMessage::Dict { id, patch });
            }
        }
        w.full = false;
        w.touched.clear();
        w.pending = false;
        out
    }
}

fn collapse_if_large(w: &mut Inner) {
    if w.touched.len() > JOURNAL_COLLAPSE {
        w.full = true;
        w.touched.clear();
    }
}
