//! List container cell - ordered items with an incremental patch journal
//!
//! Index operations shift later entries, so per-index last-state resolution
//! (the dict strategy) does not work here. Instead every mutation appends
//! an ordered patch to a journal; replaying the journal on the consumer's
//! previous state reproduces the current one. Whole-replace clears the
//! journal, and an oversized journal collapses into a whole-replace.

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::schema::ValueId;
use crate::transport::{ListPatch, SyncMessage};
use crate::value::{Variant, VariantKind};
use crate::values::JOURNAL_COLLAPSE;

struct Inner {
    items: Vec<Variant>,
    full: bool,
    journal: Vec<ListPatch>,
    pending: bool,
}

pub(crate) struct ListCell {
    id: ValueId,
    item_kind: VariantKind,
    inner: RwLock<Inner>,
}

impl ListCell {
    pub(crate) fn new(id: ValueId, item_kind: VariantKind) -> Self {
        Self {
            id,
            item_kind,
            inner: RwLock::new(Inner {
                items: Vec::new(),
                full: false,
                journal: Vec::new(),
                pending: false,
            }),
        }
    }

    fn check(&self, value: &Variant) -> Result<(), StoreError> {
        if value.kind() != self.item_kind {
            return Err(StoreError::TypeMismatch {
                id: self.id,
                expected: self.item_kind.to_string(),
                got: value.kind().to_string(),
            });
        }
        Ok(())
    }

    /// Replace the whole list; marks the whole id dirty
    pub(crate) fn replace(&self, items: Vec<Variant>, update: bool) -> Result<(), StoreError> {
        for item in &items {
            self.check(item)?;
        }
        let mut w = self.inner.write();
        w.items = items;
        w.full = true;
        w.journal.clear();
        w.pending |= update;
        Ok(())
    }

    /// Snapshot of the whole list
    pub(crate) fn get(&self) -> Vec<Variant> {
        self.inner.read().items.clone()
    }

    pub(crate) fn set_item(
        &self,
        index: usize,
        value: Variant,
        update: bool,
    ) -> Result<(), StoreError> {
        self.check(&value)?;
        let mut w = self.inner.write();
        let len = w.items.len();
        if index >= len {
            return Err(StoreError::IndexOutOfRange {
                id: self.id,
                index,
                len,
            });
        }
        w.items[index] = value.clone();
        if !w.full {
            w.journal.push(ListPatch::Set(index, value));
        }
        w.pending |= update;
        collapse_if_large(&mut w);
        Ok(())
    }

    pub(crate) fn get_item(&self, index: usize) -> Result<Variant, StoreError> {
        let r = self.inner.read();
        r.items
            .get(index)
            .cloned()
            .ok_or(StoreError::IndexOutOfRange {
                id: self.id,
                index,
                len: r.items.len(),
            })
    }

    /// Append one item at the end
    pub(crate) fn add_item(&self, value: Variant, update: bool) -> Result<(), StoreError> {
        self.check(&value)?;
        let mut w = self.inner.write();
        w.items.push(value.clone());
        if !w.full {
            w.journal.push(ListPatch::Add(value));
        }
        w.pending |= update;
        collapse_if_large(&mut w);
        Ok(())
    }

    /// Remove one item; later entries shift down, preserving relative order
    pub(crate) fn del_item(&self, index: usize, update: bool) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        let len = w.items.len();
        if index >= len {
            return Err(StoreError::IndexOutOfRange {
                id: self.id,
                index,
                len,
            });
        }
        w.items.remove(index);
        if !w.full {
            w.journal.push(ListPatch::Remove(index));
        }
        w.pending |= update;
        collapse_if_large(&mut w);
        Ok(())
    }

    /// Non-mutating size snapshot
    pub(crate) fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub(crate) fn mark_dirty(&self) {
        let mut w = self.inner.write();
        w.full = true;
        w.journal.clear();
        w.pending = true;
    }

    /// Drain the pending journal into ordered patch messages
    pub(crate) fn flush(&self) -> Vec<SyncMessage> {
        let mut w = self.inner.write();
        if !w.pending {
            return Vec::new();
        }
        let id = self.id;
        let out = if w.full {
            vec![SyncMessage::List {
                id,
                patch: ListPatch::Replace(w.items.clone()),
            }]
        } else {
            w.journal
                .drain(..)
                .map(|patch| SyncMessage::List { id, patch })
                .collect()
        };
        w.full = false;
        w.journal.clear();
        w.pending = false;
        out
    }
}

fn collapse_if_large(w: &mut Inner) {
    if w.journal.len() > JOURNAL_COLLAPSE {
        w.full = true;
        w.journal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays patches the way a consumer applies an incremental flush
    fn replay(base: &mut Vec<Variant>, msgs: &[SyncMessage]) {
        for msg in msgs {
            let SyncMessage::List { patch, .. } = msg else {
                panic!("unexpected message");
            };
            match patch {
                ListPatch::Replace(items) => *base = items.clone(),
                ListPatch::Set(i, v) => base[*i] = v.clone(),
                ListPatch::Add(v) => base.push(v.clone()),
                ListPatch::Remove(i) => {
                    base.remove(*i);
                }
            }
        }
    }

    #[test]
    fn add_get_delete_preserves_order() {
        let list = ListCell::new(7, VariantKind::Int);
        list.add_item(Variant::Int(3), true).unwrap();
        list.add_item(Variant::Int(5), true).unwrap();
        assert_eq!(list.get(), vec![Variant::Int(3), Variant::Int(5)]);

        list.del_item(0, true).unwrap();
        assert_eq!(list.get(), vec![Variant::Int(5)]);
    }

    #[test]
    fn bounds_are_checked() {
        let list = ListCell::new(7, VariantKind::Int);
        list.add_item(Variant::Int(1), false).unwrap();

        let err = list.set_item(1, Variant::Int(0), false).unwrap_err();
        assert_eq!(
            err,
            StoreError::IndexOutOfRange {
                id: 7,
                index: 1,
                len: 1
            }
        );
        assert!(list.get_item(1).is_err());
        assert!(list.del_item(5, false).is_err());
    }

    #[test]
    fn journal_replay_matches_current_state() {
        let list = ListCell::new(7, VariantKind::Int);
        let mut consumer: Vec<Variant> = Vec::new();

        list.add_item(Variant::Int(1), true).unwrap();
        list.add_item(Variant::Int(2), true).unwrap();
        replay(&mut consumer, &list.flush());
        assert_eq!(consumer, list.get());

        list.set_item(0, Variant::Int(9), true).unwrap();
        list.add_item(Variant::Int(3), true).unwrap();
        list.del_item(1, true).unwrap();
        replay(&mut consumer, &list.flush());
        assert_eq!(consumer, list.get());
        assert_eq!(consumer, vec![Variant::Int(9), Variant::Int(3)]);
    }

    #[test]
    fn replace_collapses_journal() {
        let list = ListCell::new(7, VariantKind::Int);
        list.add_item(Variant::Int(1), true).unwrap();
        list.replace(vec![Variant::Int(8)], true).unwrap();

        let msgs = list.flush();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(
            &msgs[0],
            SyncMessage::List {
                patch: ListPatch::Replace(items),
                ..
            } if items.len() == 1
        ));
    }

    #[test]
    fn long_journal_collapses_to_replace() {
        let list = ListCell::new(7, VariantKind::Int);
        for i in 0..(JOURNAL_COLLAPSE as i64 + 2) {
            list.add_item(Variant::Int(i), true).unwrap();
        }
        let msgs = list.flush();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(
            &msgs[0],
            SyncMessage::List {
                patch: ListPatch::Replace(_),
                ..
            }
        ));
    }

    #[test]
    fn item_type_is_enforced() {
        let list = ListCell::new(7, VariantKind::Int);
        let err = list.add_item(Variant::from("x"), false).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { id: 7, .. }));
        assert_eq!(list.len(), 0);
    }
}
