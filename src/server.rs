//! StateServer - the public typed operation surface
//!
//! Thin facade over the store, the signal router and the session manager.
//! Application threads hold a clone of [`StateServer`] and call the typed
//! operations; the consumer side talks to the same state through a
//! [`PeerLink`](crate::transport::PeerLink) attached to the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SessionError, StoreError};
use crate::schema::{Schema, ValueId};
use crate::session::SessionManager;
use crate::signal::{ConsumerId, SignalError, SignalEvent, SignalRouter};
use crate::transport::PeerLink;
use crate::value::{Variant, VariantKey};
use crate::values::graph::GraphPoint;
use crate::values::image::{ImageFrame, Rect};
use crate::values::{DirtyBell, ValueStore};

/// Shared-state synchronization engine, cheap to clone across threads
#[derive(Clone)]
pub struct StateServer {
    store: Arc<ValueStore>,
    signals: Arc<SignalRouter>,
    session: Arc<SessionManager>,
}

impl StateServer {
    /// Build the engine from a finished schema. The session starts in the
    /// Stopped state.
    pub fn new(schema: Schema) -> Self {
        let signals = Arc::new(SignalRouter::new());
        let bell = Arc::new(DirtyBell::new());
        let store = Arc::new(ValueStore::new(&schema, signals.clone(), bell.clone()));
        let session = Arc::new(SessionManager::new(store.clone(), bell));
        Self {
            store,
            signals,
            session,
        }
    }

    // scalar ----------------------------------------------------------------

    pub fn set_value(
        &self,
        id: ValueId,
        value: impl Into<Variant>,
        set_signal: bool,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_value(id, value.into(), set_signal, update)
    }

    pub fn get_value(&self, id: ValueId) -> Result<Variant, StoreError> {
        self.store.get_value(id)
    }

    pub fn set_static(
        &self,
        id: ValueId,
        value: impl Into<Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_static(id, value.into(), update)
    }

    pub fn get_static(&self, id: ValueId) -> Result<Variant, StoreError> {
        self.store.get_static(id)
    }

    // dict ------------------------------------------------------------------

    pub fn set_dict(
        &self,
        id: ValueId,
        map: HashMap<VariantKey, Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_dict(id, map, update)
    }

    pub fn get_dict(&self, id: ValueId) -> Result<HashMap<VariantKey, Variant>, StoreError> {
        self.store.get_dict(id)
    }

    pub fn set_dict_item(
        &self,
        id: ValueId,
        key: impl Into<VariantKey>,
        value: impl Into<Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_dict_item(id, key.into(), value.into(), update)
    }

    pub fn get_dict_item(
        &self,
        id: ValueId,
        key: impl Into<VariantKey>,
    ) -> Result<Variant, StoreError> {
        self.store.get_dict_item(id, &key.into())
    }

    pub fn del_dict_item(
        &self,
        id: ValueId,
        key: impl Into<VariantKey>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.del_dict_item(id, &key.into(), update)
    }

    pub fn dict_len(&self, id: ValueId) -> Result<usize, StoreError> {
        self.store.dict_len(id)
    }

    // list ------------------------------------------------------------------

    pub fn set_list(&self, id: ValueId, items: Vec<Variant>, update: bool) -> Result<(), StoreError> {
        self.store.set_list(id, items, update)
    }

    pub fn get_list(&self, id: ValueId) -> Result<Vec<Variant>, StoreError> {
        self.store.get_list(id)
    }

    pub fn set_list_item(
        &self,
        id: ValueId,
        index: usize,
        value: impl Into<Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_list_item(id, index, value.into(), update)
    }

    pub fn get_list_item(&self, id: ValueId, index: usize) -> Result<Variant, StoreError> {
        self.store.get_list_item(id, index)
    }

    pub fn add_list_item(
        &self,
        id: ValueId,
        value: impl Into<Variant>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.add_list_item(id, value.into(), update)
    }

    pub fn del_list_item(&self, id: ValueId, index: usize, update: bool) -> Result<(), StoreError> {
        self.store.del_list_item(id, index, update)
    }

    pub fn list_len(&self, id: ValueId) -> Result<usize, StoreError> {
        self.store.list_len(id)
    }

    // buffers ---------------------------------------------------------------

    pub fn set_image(
        &self,
        id: ValueId,
        frame: ImageFrame,
        update: bool,
        rect: Option<Rect>,
    ) -> Result<(), StoreError> {
        self.store.set_image(id, frame, update, rect)
    }

    pub fn get_image(&self, id: ValueId) -> Result<Option<ImageFrame>, StoreError> {
        self.store.get_image(id)
    }

    pub fn set_histogram(
        &self,
        id: ValueId,
        buckets: Option<Vec<f32>>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_histogram(id, buckets, update)
    }

    pub fn get_histogram(&self, id: ValueId) -> Result<Vec<f32>, StoreError> {
        self.store.get_histogram(id)
    }

    pub fn set_graph(
        &self,
        id: ValueId,
        points: Vec<GraphPoint>,
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.set_graph(id, points, update)
    }

    pub fn add_graph_points(
        &self,
        id: ValueId,
        points: &[GraphPoint],
        update: bool,
    ) -> Result<(), StoreError> {
        self.store.add_graph_points(id, points, update)
    }

    pub fn clear_graph(&self, id: ValueId, update: bool) -> Result<(), StoreError> {
        self.store.clear_graph(id, update)
    }

    pub fn get_graph(&self, id: ValueId) -> Result<Vec<GraphPoint>, StoreError> {
        self.store.get_graph(id)
    }

    pub fn graph_len(&self, id: ValueId) -> Result<usize, StoreError> {
        self.store.graph_len(id)
    }

    // signals ---------------------------------------------------------------

    /// Register a consumer thread for signal delivery
    pub fn add_signal_consumer(&self, consumer: ConsumerId) {
        self.signals.add_consumer(consumer);
    }

    /// Drop a consumer thread and its pending events
    pub fn remove_signal_consumer(&self, consumer: ConsumerId) {
        self.signals.remove_consumer(consumer);
    }

    /// Toggle signal emission for one registered id
    pub fn set_register_value(&self, id: ValueId, register: bool) -> Result<(), StoreError> {
        if !self.store.contains(id) {
            return Err(StoreError::UnknownValueId(id));
        }
        self.signals.set_register(id, register);
        Ok(())
    }

    /// Pop the oldest pending signal event for a consumer; `timeout: None`
    /// is a zero-wait poll
    pub fn get_signal_value(
        &self,
        consumer: ConsumerId,
        timeout: Option<Duration>,
    ) -> Result<SignalEvent, SignalError> {
        self.signals.pop(consumer, timeout)
    }

    // lifecycle -------------------------------------------------------------

    pub fn start(&self) -> Result<(), SessionError> {
        self.session.start()
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.session.stop()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Attach a peer connection; the next flush sends a full snapshot
    pub fn attach_peer(&self, link: Box<dyn PeerLink>) -> Result<(), SessionError> {
        self.session.attach_peer(link)
    }

    /// Drop the attached peer; the session keeps running
    pub fn disconnect_client(&self) -> Result<(), SessionError> {
        self.session.disconnect_peer()
    }

    /// Pump dirty state to the peer for at most `timeout` (`None`: one
    /// immediate flush)
    pub fn update(&self, timeout: Option<Duration>) -> Result<(), SessionError> {
        self.session.update(timeout)
    }
}
