//! Shared-state synchronization engine.
//!
//! One process (typically an application backend) owns a set of typed,
//! id-addressed values; a consumer process (typically a GUI) mirrors them.
//! Mutations mark precise dirty regions, the session pumps those regions to
//! the attached peer as patch messages, and opted-in consumer threads get
//! change notifications through per-consumer signal mailboxes.
//!
//! Entry point is [`StateServer`]: build a [`Schema`], construct the server,
//! `start` the session and `attach_peer` a transport. See `transport` for
//! the link seam and the in-process [`ChannelLink`] carrier.

pub mod error;
pub mod schema;
pub mod server;
pub mod session;
pub mod signal;
pub mod transport;
pub mod value;
pub mod values;

pub use error::{SchemaError, SessionError, StoreError};
pub use schema::{Schema, SchemaBuilder, ValueId, ValueKind, RESERVED_IDS};
pub use server::StateServer;
pub use signal::{ConsumerId, SignalError, SignalEvent};
pub use transport::{ChannelLink, LinkError, LinkRx, LinkTx, PeerLink, SyncMessage};
pub use value::{Variant, VariantKey, VariantKeyKind, VariantKind};
pub use values::graph::GraphPoint;
pub use values::image::{ImageFrame, PixelFormat, Rect};
