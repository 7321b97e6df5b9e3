//! Transport boundary - patch representation and the peer link seam
//!
//! The session hands the flush step one [`SyncMessage`] per dirty region
//! (full or partial) and receives inbound mutation requests in the same
//! representation. The concrete byte layout is owned by the transport
//! collaborator behind [`PeerLink`]; everything here derives `serde` so a
//! carrier can pick its own encoding. [`ChannelLink`] is the in-process
//! carrier used when both sides live in one process (and by the tests).

use std::collections::HashMap;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ValueId;
use crate::value::{Variant, VariantKey};
use crate::values::graph::GraphPoint;
use crate::values::image::{PixelFormat, Rect};

/// Transport-level failure; the session treats it as a peer drop, not a
/// fatal error
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("peer link closed")]
    Closed,

    #[error("link i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Incremental change to a dict cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DictPatch {
    Replace(HashMap<VariantKey, Variant>),
    Set(VariantKey, Variant),
    Remove(VariantKey),
}

/// Incremental change to a list cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListPatch {
    Replace(Vec<Variant>),
    Set(usize, Variant),
    Add(Variant),
    Remove(usize),
}

/// Image data, either the whole plane (`rect: None`) or one sub-rectangle
///
/// `size` is always the full image size `[height, width]`; for a partial
/// patch `data` holds exactly `rect.h * rect.w` pixels, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePatch {
    pub size: [u32; 2],
    pub format: PixelFormat,
    pub rect: Option<Rect>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Incremental change to a graph cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphPatch {
    Replace(Vec<GraphPoint>),
    Append(Vec<GraphPoint>),
    Clear,
}

/// One serialized dirty region, or one inbound mutation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Scalar write; `signal` is set on inbound messages that should also
    /// fire the consumer signal path
    Value {
        id: ValueId,
        value: Variant,
        signal: bool,
    },
    /// Static scalar write (no signal path)
    Static { id: ValueId, value: Variant },
    /// Consumer-originated event for a signal-only id
    Signal { id: ValueId, value: Variant },
    Dict { id: ValueId, patch: DictPatch },
    List { id: ValueId, patch: ListPatch },
    Image { id: ValueId, patch: ImagePatch },
    /// `buckets: None` means "clear", transmitted without a zero buffer
    Histogram {
        id: ValueId,
        buckets: Option<Vec<f32>>,
    },
    Graph { id: ValueId, patch: GraphPatch },
}

impl SyncMessage {
    /// Id of the value this message touches
    pub fn value_id(&self) -> ValueId {
        match self {
            SyncMessage::Value { id, .. }
            | SyncMessage::Static { id, .. }
            | SyncMessage::Signal { id, .. }
            | SyncMessage::Dict { id, .. }
            | SyncMessage::List { id, .. }
            | SyncMessage::Image { id, .. }
            | SyncMessage::Histogram { id, .. }
            | SyncMessage::Graph { id, .. } => *id,
        }
    }
}

/// Outbound half of a peer connection
pub trait LinkTx: Send {
    fn send(&mut self, msg: SyncMessage) -> Result<(), LinkError>;
}

/// Inbound half of a peer connection
///
/// `Ok(None)` means nothing arrived within the timeout; `Err` means the
/// peer is gone.
pub trait LinkRx: Send {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<SyncMessage>, LinkError>;
}

/// A bidirectional peer connection the session can split into halves
pub trait PeerLink: Send {
    fn split(self: Box<Self>) -> (Box<dyn LinkTx>, Box<dyn LinkRx>);
}

/// In-process link: a pair of crossbeam channels
///
/// `ChannelLink::pair` returns the two endpoints; hand one to
/// `attach_peer` and drive the other from the consumer side.
pub struct ChannelLink {
    tx: Sender<SyncMessage>,
    rx: Receiver<SyncMessage>,
}

impl ChannelLink {
    /// Create both endpoints of an in-process connection
    pub fn pair() -> (ChannelLink, ChannelLink) {
        let (a_tx, a_rx) = channel::unbounded();
        let (b_tx, b_rx) = channel::unbounded();
        (
            ChannelLink { tx: a_tx, rx: b_rx },
            ChannelLink { tx: b_tx, rx: a_rx },
        )
    }

    /// Send one message to the other endpoint
    pub fn send(&self, msg: SyncMessage) -> Result<(), LinkError> {
        self.tx.send(msg).map_err(|_| LinkError::Closed)
    }

    /// Receive one message from the other endpoint
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<SyncMessage>, LinkError> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    /// Drain everything currently pending without waiting
    pub fn drain(&self) -> Vec<SyncMessage> {
        self.rx.try_iter().collect()
    }
}

struct ChannelTx(Sender<SyncMessage>);

impl LinkTx for ChannelTx {
    fn send(&mut self, msg: SyncMessage) -> Result<(), LinkError> {
        self.0.send(msg).map_err(|_| LinkError::Closed)
    }
}

struct ChannelRx(Receiver<SyncMessage>);

impl LinkRx for ChannelRx {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<SyncMessage>, LinkError> {
        match self.0.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

impl PeerLink for ChannelLink {
    fn split(self: Box<Self>) -> (Box<dyn LinkTx>, Box<dyn LinkRx>) {
        (Box::new(ChannelTx(self.tx)), Box::new(ChannelRx(self.rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_pair_round_trip() {
        let (server, client) = ChannelLink::pair();
        server
            .send(SyncMessage::Value {
                id: 10,
                value: Variant::Int(1),
                signal: false,
            })
            .unwrap();

        let msg = client
            .recv_timeout(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(msg.value_id(), 10);
    }

    #[test]
    fn dropped_endpoint_reports_closed() {
        let (server, client) = ChannelLink::pair();
        drop(client);
        let res = server.send(SyncMessage::Signal {
            id: 11,
            value: Variant::Empty,
        });
        assert!(matches!(res, Err(LinkError::Closed)));
    }

    #[test]
    fn recv_timeout_yields_none_when_idle() {
        let (server, _client) = ChannelLink::pair();
        let res = server.recv_timeout(Duration::from_millis(10)).unwrap();
        assert!(res.is_none());
    }
}
