//! Graph buffer cell - growing point sets with append deltas
//!
//! A graph accumulates point samples over time. Appends dominate, so the
//! dirty record is "N points appended since the last flush" and the flush
//! transmits only those points. Append runs coalesce across calls. A clear
//! invalidates any pending run: after a clear the consumer base is rebuilt
//! from scratch, so a flush never interleaves pre-clear points.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::schema::ValueId;
use crate::transport::{GraphPatch, SyncMessage};

/// One point sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub x: f64,
    pub y: f64,
}

impl GraphPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

struct Inner {
    points: Vec<GraphPoint>,
    full: bool,
    cleared: bool,
    /// Points appended since the last flush (only meaningful when neither
    /// `full` nor a fresh replace happened)
    appended: usize,
    pending: bool,
}

pub(crate) struct GraphCell {
    id: ValueId,
    inner: RwLock<Inner>,
}

impl GraphCell {
    pub(crate) fn new(id: ValueId) -> Self {
        Self {
            id,
            inner: RwLock::new(Inner {
                points: Vec::new(),
                full: false,
                cleared: false,
                appended: 0,
                pending: false,
            }),
        }
    }

    /// Replace every point; marks the whole id dirty
    pub(crate) fn replace(&self, points: Vec<GraphPoint>, update: bool) {
        let mut w = self.inner.write();
        w.points = points;
        w.full = true;
        w.cleared = false;
        w.appended = 0;
        w.pending |= update;
    }

    /// Monotonic append; prior points are never retransmitted
    pub(crate) fn add_points(&self, points: &[GraphPoint], update: bool) {
        let mut w = self.inner.write();
        w.points.extend_from_slice(points);
        if !w.full {
            w.appended += points.len();
        }
        w.pending |= update;
    }

    /// Reset to empty and invalidate any pending append run
    pub(crate) fn clear(&self, update: bool) {
        let mut w = self.inner.write();
        w.points.clear();
        w.full = false;
        w.cleared = true;
        w.appended = 0;
        w.pending |= update;
    }

    /// Snapshot of all points
    pub(crate) fn get(&self) -> Vec<GraphPoint> {
        self.inner.read().points.clone()
    }

    /// Non-mutating size snapshot
    pub(crate) fn len(&self) -> usize {
        self.inner.read().points.len()
    }

    pub(crate) fn mark_dirty(&self) {
        let mut w = self.inner.write();
        w.full = true;
        w.cleared = false;
        w.appended = 0;
        w.pending = true;
    }

    /// Take the pending delta as a patch message
    pub(crate) fn flush(&self) -> Option<SyncMessage> {
        let mut w = self.inner.write();
        if !w.pending {
            return None;
        }
        let patch = if w.full {
            Some(GraphPatch::Replace(w.points.clone()))
        } else if w.cleared {
            if w.appended == 0 {
                Some(GraphPatch::Clear)
            } else {
                // post-clear points only; a replace also resets the
                // consumer base so no stale append can survive
                Some(GraphPatch::Replace(w.points.clone()))
            }
        } else if w.appended > 0 {
            let start = w.points.len() - w.appended;
            Some(GraphPatch::Append(w.points[start..].to_vec()))
        } else {
            None
        };

        w.full = false;
        w.cleared = false;
        w.appended = 0;
        w.pending = false;

        patch.map(|patch| SyncMessage::Graph { id: self.id, patch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(range: std::ops::Range<i64>) -> Vec<GraphPoint> {
        range
            .map(|i| GraphPoint::new(i as f64, (i * i) as f64))
            .collect()
    }

    /// Applies patches the way a consumer does
    fn replay(base: &mut Vec<GraphPoint>, msg: Option<SyncMessage>) {
        let Some(SyncMessage::Graph { patch, .. }) = msg else {
            return;
        };
        match patch {
            GraphPatch::Replace(points) => *base = points,
            GraphPatch::Append(points) => base.extend(points),
            GraphPatch::Clear => base.clear(),
        }
    }

    #[test]
    fn appends_flush_only_new_points() {
        let graph = GraphCell::new(40);
        graph.replace(pts(0..3), true);
        let _ = graph.flush();

        graph.add_points(&pts(3..5), true);
        let Some(SyncMessage::Graph {
            patch: GraphPatch::Append(points),
            ..
        }) = graph.flush()
        else {
            panic!("expected append patch");
        };
        assert_eq!(points, pts(3..5));
    }

    #[test]
    fn append_runs_coalesce_between_flushes() {
        let graph = GraphCell::new(40);
        graph.replace(pts(0..2), true);
        let _ = graph.flush();

        graph.add_points(&pts(2..4), false);
        graph.add_points(&pts(4..6), true);
        let Some(SyncMessage::Graph {
            patch: GraphPatch::Append(points),
            ..
        }) = graph.flush()
        else {
            panic!("expected append patch");
        };
        assert_eq!(points, pts(2..6));
    }

    #[test]
    fn interleaved_flushes_reconstruct_concatenation() {
        let graph = GraphCell::new(40);
        let mut consumer = Vec::new();

        graph.replace(pts(0..2), true);
        replay(&mut consumer, graph.flush());

        graph.add_points(&pts(2..4), true);
        replay(&mut consumer, graph.flush());

        graph.add_points(&pts(4..7), true);
        replay(&mut consumer, graph.flush());

        assert_eq!(consumer, pts(0..7));
        assert_eq!(consumer, graph.get());
    }

    #[test]
    fn clear_invalidates_pending_appends() {
        let graph = GraphCell::new(40);
        graph.replace(pts(0..4), true);
        let _ = graph.flush();

        graph.add_points(&pts(4..6), true);
        graph.clear(true);
        graph.add_points(&pts(10..12), true);

        let mut consumer = pts(0..4);
        replay(&mut consumer, graph.flush());
        // nothing from before the clear survives
        assert_eq!(consumer, pts(10..12));
    }

    #[test]
    fn clear_alone_flushes_clear() {
        let graph = GraphCell::new(40);
        graph.replace(pts(0..4), true);
        let _ = graph.flush();

        graph.clear(true);
        assert!(matches!(
            graph.flush(),
            Some(SyncMessage::Graph {
                patch: GraphPatch::Clear,
                ..
            })
        ));
        assert_eq!(graph.len(), 0);
    }
}
