//! Value store module - typed cells, containers, buffers and the store itself
//!
//! Each synchronized value lives in one cell addressed by its [`ValueId`].
//! Cells own their content behind an individual lock so unrelated values
//! never contend, track a dirty descriptor scoped to what actually changed
//! (whole value, key, index, rectangle or append run), and turn that
//! descriptor into patch messages when the session flushes.
//!
//! [`ValueId`]: crate::schema::ValueId

pub(crate) mod cell;
pub(crate) mod dict;
pub mod graph;
pub mod image;
pub(crate) mod list;
mod store;

pub use store::ValueStore;

pub(crate) use store::DirtyBell;

/// Container patch journals longer than this collapse into a whole-container
/// dirty mark. Bounds the pending backlog while no peer is attached: pending
/// state never exceeds a constant factor of the live data.
pub(crate) const JOURNAL_COLLAPSE: usize = 256;
