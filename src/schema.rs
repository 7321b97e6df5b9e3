//! Schema registration - the fixed id/type map supplied before the store starts
//!
//! The schema/codegen step of the wider system assigns every synchronized
//! value an integer id and a bound type. The store trusts this mapping as
//! immutable for its lifetime: ids are never added, removed or re-typed
//! after `Schema::build`.

use std::collections::HashMap;

use crate::error::SchemaError;
use crate::value::{VariantKeyKind, VariantKind};

/// Integer handle identifying one synchronized value
pub type ValueId = u32;

/// Ids below this are reserved for engine/system signals (id 0 is the error
/// signal in the original protocol)
pub const RESERVED_IDS: ValueId = 10;

/// Kind of cell bound to an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Scalar value with signal emission path
    Value(VariantKind),
    /// Scalar value the consumer polls for; exempt from the signal path
    Static(VariantKind),
    /// Consumer-originated event carrier; holds no state
    Signal(VariantKind),
    /// Keyed container with per-key dirty tracking
    Dict {
        key: VariantKeyKind,
        value: VariantKind,
    },
    /// Ordered container with per-index dirty tracking
    List(VariantKind),
    /// Byte buffer with sub-rectangle partial updates
    Image,
    /// Bucket-count buffer with a cheap clear path
    Histogram,
    /// Point-sample buffer with append deltas
    Graph,
}

impl ValueKind {
    /// Short name used in type mismatch errors
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Value(_) => "value",
            ValueKind::Static(_) => "static",
            ValueKind::Signal(_) => "signal",
            ValueKind::Dict { .. } => "dict",
            ValueKind::List(_) => "list",
            ValueKind::Image => "image",
            ValueKind::Histogram => "histogram",
            ValueKind::Graph => "graph",
        }
    }
}

/// Immutable id → kind map handed to the store
#[derive(Debug, Clone)]
pub struct Schema {
    entries: HashMap<ValueId, ValueKind>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            next_id: RESERVED_IDS,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self, id: ValueId) -> Option<ValueKind> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<ValueId> {
        let mut ids: Vec<ValueId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ValueId, &ValueKind)> {
        self.entries.iter()
    }
}

/// Builds a schema, either with explicit ids (codegen boundary) or with
/// counter-assigned ids (the original reserves the first ten)
pub struct SchemaBuilder {
    next_id: ValueId,
    entries: HashMap<ValueId, ValueKind>,
}

impl SchemaBuilder {
    /// Register a kind under an explicit id
    pub fn register(&mut self, id: ValueId, kind: ValueKind) -> Result<ValueId, SchemaError> {
        if id < RESERVED_IDS {
            return Err(SchemaError::ReservedValueId(id));
        }
        if self.entries.contains_key(&id) {
            return Err(SchemaError::DuplicateValueId(id));
        }
        self.entries.insert(id, kind);
        self.next_id = self.next_id.max(id + 1);
        Ok(id)
    }

    /// Register a kind under the next free counter-assigned id
    pub fn add(&mut self, kind: ValueKind) -> ValueId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, kind);
        id
    }

    pub fn build(self) -> Schema {
        Schema {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_past_reserved_range() {
        let mut b = Schema::builder();
        let id = b.add(ValueKind::Value(VariantKind::Int));
        assert_eq!(id, RESERVED_IDS);
        assert_eq!(b.add(ValueKind::Image), RESERVED_IDS + 1);
    }

    #[test]
    fn explicit_registration_rejects_duplicates_and_reserved() {
        let mut b = Schema::builder();
        b.register(42, ValueKind::Graph).unwrap();
        assert_eq!(
            b.register(42, ValueKind::Image),
            Err(SchemaError::DuplicateValueId(42))
        );
        assert_eq!(
            b.register(3, ValueKind::Image),
            Err(SchemaError::ReservedValueId(3))
        );
    }

    #[test]
    fn explicit_ids_advance_the_counter() {
        let mut b = Schema::builder();
        b.register(20, ValueKind::Histogram).unwrap();
        assert_eq!(b.add(ValueKind::Image), 21);
    }
}
