//! ValueStore - id-addressed cell registry and flush collection
//!
//! The store owns every cell. The id → cell map is built once from the
//! schema and never changes, so lookups take no lock; each cell carries its
//! own lock and a write to one cell never blocks another. Callers always
//! receive snapshots, never live references.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::StoreError;
use crate::schema::{Schema, ValueId, ValueKind};
use crate::signal::SignalRouter;
use crate::transport::SyncMessage;
use crate::value::{Variant, VariantKey, VariantKind};
use crate::values::cell::{ScalarCell, StaticCell};
use crate::values::dict::DictCell;
use crate::values::graph::{GraphCell, GraphPoint};
use crate::values::image::{HistogramCell, ImageCell, ImageFrame, Rect};
use crate::values::list::ListCell;

/// Wakes the session pump when a mutation requests a flush
///
/// A plain monotonic counter under a mutex: waiters remember the stamp they
/// last saw and sleep until it advances or their deadline passes.
pub(crate) struct DirtyBell {
    counter: Mutex<u64>,
    cv: Condvar,
}

impl DirtyBell {
    pub(crate) fn new() -> Self {
        Self {
            counter: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn ring(&self) {
        *self.counter.lock() += 1;
        self.cv.notify_all();
    }

    pub(crate) fn stamp(&self) -> u64 {
        *self.counter.lock()
    }

    /// Block until the counter advances past `seen` or `timeout` elapses;
    /// returns the current stamp
    pub(crate) fn wait_past(&self, seen: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut guard = self.counter.lock();
        while *guard == seen {
            if self.cv.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        *guard
    }
}

enum Cell {
    Value(ScalarCell),
    Static(StaticCell),
    /// Event carrier, no stored state
    Signal(VariantKind),
    Dict(DictCell),
    List(ListCell),
    Image(ImageCell),
    Histogram(HistogramCell),
    Graph(GraphCell),
}

impl Cell {
    fn kind_name(&self) -> &'static str {
        match self {
            Cell::Value(_) => "value",
            Cell::Static(_) => "static",
            Cell::Signal(_) => "signal",
            Cell::Dict(_) => "dict",
            Cell::List(_) => "list",
            Cell::Image(_) => "image",
            Cell::Histogram(_) => "histogram",
            Cell::Graph(_) => "graph",
        }
    }
}

/// Concurrent registry of typed, id-addressed cells
pub struct ValueStore {
    cells: HashMap<ValueId, Cell>,
    /// Registered ids in ascending order, for deterministic flush output
    ids: Vec<ValueId>,
    signals: std::sync::Arc<SignalRouter>,
    bell: std::sync::Arc<DirtyBell>,
}

impl ValueStore {
    pub(crate) fn new(
        schema: &Schema,
        signals: std::sync::Arc<SignalRouter>,
        bell: std::sync::Arc<DirtyBell>,
    ) -> Self {
        let mut cells = HashMap::with_capacity(schema.len());
        for (&id, &kind) in schema.iter() {
            let cell = match kind {
                ValueKind::Value(k) => Cell::Value(ScalarCell::new(id, k)),
                ValueKind::Static(k) => Cell::Static(StaticCell::new(id, k)),
                ValueKind::Signal(k) => Cell::Signal(k),
                ValueKind::Dict { key, value } => Cell::Dict(DictCell::new(id, key, value)),
                ValueKind::List(k) => Cell::List(ListCell::new(id, k)),
                ValueKind::Image => Cell::Image(ImageCell::new(id)),
                ValueKind::Histogram => Cell::Histogram(HistogramCell::new(id)),
                ValueKind::Graph => Cell::Graph(GraphCell::new(id)),
            };
            cells.insert(id, cell);
        }
        let ids = schema.ids();
        debug!(values = ids.len(), "value store built");
        Self {
            cells,
            ids,
            signals,
            bell,
        }
    }

    fn cell(&self, id: ValueId) -> Result<&Cell, StoreError> {
        self.cells.get(&id).ok_or(StoreError::UnknownValueId(id))
    }

    fn mismatch(&self, id: ValueId, expected: &str, cell: &Cell) -> StoreError {
        StoreError::TypeMismatch {
            id,
            expected: format!("{expected} cell"),
            got: format!("{} cell", cell.kind_name()),
        }
    }

    pub(crate) fn contains(&self, id: ValueId) -> bool {
        self.cells.contains_key(&id)
    }

    fn ring_if(&self, update: bool) {
        if update {
            self.bell.ring();
        }
    }

    // scalar ----------------------------------------------------------------

    pub fn set_value(
        &self,
        id: ValueId,
        value: Variant,
        set_signal: bool,
        update: bool,
    ) -> Result<(), StoreError> {
        match self.cell(id)? {
            Cell::Value(cell) => cell.set(value, set_signal, update, &self.signals)?,
            other => return Err(self.mismatch(id, "value", other)),
        }
        self.ring_if(update);
        Ok(())
    }

    pub fn get_value(&self, id: ValueId) -> Result<Variant, StoreError> {
        match self.cell(id)? {
            Cell::Value(cell) => Ok(cell.get()),
            other => Err(self.mismatch(id, "value", other)),
        }
    }

    pub fn set_static(&self, id: ValueId, value: Variant, update: bool) -> Result<(), StoreError> {
        match self.cell(id)? {
            Cell::Static(cell) => cell.set(value, update)?,
            other => return Err(self.mismatch(id, "static", other)),
        }
        self.ring_if(update);
        Ok(())
    }

    pub fn get_static(&self, id: ValueId) -> Result<Variant, StoreError> {
        match self.cell(id)? {
            Cell::Static(cell) => Ok(cell.get()),
            other => Err(self.mismatch(id, "static", other)),
        }
    }

    // dict ------------------------------------------------------------------

    fn dict(&self, id: ValueId) -> Result<&DictCell, StoreError> {
        match self.cell(id)? {
            Cell::Dict(cell) => Ok(cell),
            other => Err(self.mismatch(id, "dict", other)),
        }
    }

    pub fn set_dict(
        &self,
        id: ValueId,
        map: HashMap<VariantKey, Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.dict(id)?.replace(map, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn get_dict(&self, id: ValueId) -> Result<HashMap<VariantKey, Variant>, StoreError> {
        Ok(self.dict(id)?.get())
    }

    pub fn set_dict_item(
        &self,
        id: ValueId,
        key: VariantKey,
        value: Variant,
        update: bool,
    ) -> Result<(), StoreError> {
        self.dict(id)?.set_item(key, value, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn get_dict_item(&self, id: ValueId, key: &VariantKey) -> Result<Variant, StoreError> {
        self.dict(id)?.get_item(key)
    }

    pub fn del_dict_item(
        &self,
        id: ValueId,
        key: &VariantKey,
        update: bool,
    ) -> Result<(), StoreError> {
        self.dict(id)?.del_item(key, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn dict_len(&self, id: ValueId) -> Result<usize, StoreError> {
        Ok(self.dict(id)?.len())
    }

    // list ------------------------------------------------------------------

    fn list(&self, id: ValueId) -> Result<&ListCell, StoreError> {
        match self.cell(id)? {
            Cell::List(cell) => Ok(cell),
            other => Err(self.mismatch(id, "list", other)),
        }
    }

    pub fn set_list(&self, id: ValueId, items: Vec<Variant>, update: bool) -> Result<(), StoreError> {
        self.list(id)?.replace(items, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn get_list(&self, id: ValueId) -> Result<Vec<Variant>, StoreError> {
        Ok(self.list(id)?.get())
    }

    pub fn set_list_item(
        &self,
        id: ValueId,
        index: usize,
        value: Variant,
        update: bool,
    ) -> Result<(), StoreError> {
        self.list(id)?.set_item(index, value, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn get_list_item(&self, id: ValueId, index: usize) -> Result<Variant, StoreError> {
        self.list(id)?.get_item(index)
    }

    pub fn add_list_item(&self, id: ValueId, value: Variant, update: bool) -> Result<(), StoreError> {
        self.list(id)?.add_item(value, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn del_list_item(&self, id: ValueId, index: usize, update: bool) -> Result<(), StoreError> {
        self.list(id)?.del_item(index, update)?;
        self.ring_if(update);
        Ok(())
    }

    pub fn list_len(&self, id: ValueId) -> Result<usize, StoreError> {
        Ok(self.list(id)?.len())
    }

    // image / histogram -----------------------------------------------------

    pub fn set_image(
        &self,
        id: ValueId,
        frame: ImageFrame,
        update: bool,
        rect: Option<Rect>,
    ) -> Result<(), StoreError> {
        match self.cell(id)? {
            Cell::Image(cell) => cell.set(frame, update, rect)?,
            other => return Err(self.mismatch(id, "image", other)),
        }
        self.ring_if(update);
        Ok(())
    }

    pub fn get_image(&self, id: ValueId) -> Result<Option<ImageFrame>, StoreError> {
        match self.cell(id)? {
            Cell::Image(cell) => Ok(cell.get()),
            other => Err(self.mismatch(id, "image", other)),
        }
    }

    pub fn set_histogram(
        &self,
        id: ValueId,
        buckets: Option<Vec<f32>>,
        update: bool,
    ) -> Result<(), StoreError> {
        match self.cell(id)? {
            Cell::Histogram(cell) => cell.set(buckets, update),
            other => return Err(self.mismatch(id, "histogram", other)),
        }
        self.ring_if(update);
        Ok(())
    }

    pub fn get_histogram(&self, id: ValueId) -> Result<Vec<f32>, StoreError> {
        match self.cell(id)? {
            Cell::Histogram(cell) => Ok(cell.get()),
            other => Err(self.mismatch(id, "histogram", other)),
        }
    }

    // graph -----------------------------------------------------------------

    fn graph(&self, id: ValueId) -> Result<&GraphCell, StoreError> {
        match self.cell(id)? {
            Cell::Graph(cell) => Ok(cell),
            other => Err(self.mismatch(id, "graph", other)),
        }
    }

    pub fn set_graph(
        &self,
        id: ValueId,
        points: Vec<GraphPoint>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.graph(id)?.replace(points, update);
        self.ring_if(update);
        Ok(())
    }

    pub fn add_graph_points(
        &self,
        id: ValueId,
        points: &[GraphPoint],
        update: bool,
    ) -> Result<(), StoreError> {
        self.graph(id)?.add_points(points, update);
        self.ring_if(update);
        Ok(())
    }

    pub fn clear_graph(&self, id: ValueId, update: bool) -> Result<(), StoreError> {
        self.graph(id)?.clear(update);
        self.ring_if(update);
        Ok(())
    }

    pub fn get_graph(&self, id: ValueId) -> Result<Vec<GraphPoint>, StoreError> {
        Ok(self.graph(id)?.get())
    }

    pub fn graph_len(&self, id: ValueId) -> Result<usize, StoreError> {
        Ok(self.graph(id)?.len())
    }

    // flush / inbound -------------------------------------------------------

    /// Mark every cell fully dirty so the next flush transmits a complete
    /// snapshot (used when a peer attaches)
    pub(crate) fn mark_all_dirty(&self) {
        for cell in self.cells.values() {
            match cell {
                Cell::Value(c) => c.mark_dirty(),
                Cell::Static(c) => c.mark_dirty(),
                Cell::Signal(_) => {}
                Cell::Dict(c) => c.mark_dirty(),
                Cell::List(c) => c.mark_dirty(),
                Cell::Image(c) => c.mark_dirty(),
                Cell::Histogram(c) => c.mark_dirty(),
                Cell::Graph(c) => c.mark_dirty(),
            }
        }
        trace!("all cells marked dirty");
    }

    /// Drain every pending dirty record into patch messages, in id order
    pub(crate) fn collect_dirty(&self) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        for &id in &self.ids {
            match &self.cells[&id] {
                Cell::Value(c) => out.extend(c.flush()),
                Cell::Static(c) => out.extend(c.flush()),
                Cell::Signal(_) => {}
                Cell::Dict(c) => out.extend(c.flush()),
                Cell::List(c) => out.extend(c.flush()),
                Cell::Image(c) => out.extend(c.flush()),
                Cell::Histogram(c) => out.extend(c.flush()),
                Cell::Graph(c) => out.extend(c.flush()),
            }
        }
        out
    }

    /// Apply one inbound mutation request from the peer
    ///
    /// Only scalar writes and signal events arrive from the consumer side;
    /// anything else is rejected without touching the cell.
    pub(crate) fn apply_message(&self, msg: SyncMessage) -> Result<(), StoreError> {
        let id = msg.value_id();
        match (msg, self.cell(id)?) {
            (SyncMessage::Value { value, signal, .. }, Cell::Value(cell)) => {
                cell.apply_remote(value, signal, &self.signals)
            }
            (SyncMessage::Signal { value, .. }, Cell::Signal(kind)) => {
                if value.kind() != *kind {
                    return Err(StoreError::TypeMismatch {
                        id,
                        expected: kind.to_string(),
                        got: value.kind().to_string(),
                    });
                }
                self.signals.emit(id, &value);
                Ok(())
            }
            _ => {
                warn!(id, "rejected inbound patch for incompatible cell");
                Err(StoreError::UnsupportedPatch { id })
            }
        }
    }
}
