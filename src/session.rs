//! Session lifecycle - peer attachment, the reader thread and the dirty pump
//!
//! One session owns at most one peer at a time. Dirty state accumulates in
//! the store whether or not a peer is attached; `update` drains it to the
//! peer only while one is connected, so a consumer that attaches later
//! starts from a full snapshot and misses nothing. A transport failure
//! demotes the session to disconnected but never stops it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::transport::{LinkRx, LinkTx, PeerLink};
use crate::values::{DirtyBell, ValueStore};

/// How long the reader thread blocks per poll; bounds reaction time to
/// detach and stop
const PEER_POLL: Duration = Duration::from_millis(50);

/// Drives the connect/disconnect lifecycle and the flush pump
pub struct SessionManager {
    store: Arc<ValueStore>,
    bell: Arc<DirtyBell>,
    running: AtomicBool,
    connected: Arc<AtomicBool>,
    /// Bumped on every attach/detach; a reader thread exits as soon as the
    /// generation it was spawned for is stale
    peer_gen: Arc<AtomicU64>,
    /// Shared with the reader thread so a detected drop clears the link
    /// state from either side
    tx: Arc<Mutex<Option<Box<dyn LinkTx>>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub(crate) fn new(store: Arc<ValueStore>, bell: Arc<DirtyBell>) -> Self {
        Self {
            store,
            bell,
            running: AtomicBool::new(false),
            connected: Arc::new(AtomicBool::new(false)),
            peer_gen: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }

    /// Move Stopped → Running
    pub fn start(&self) -> Result<(), SessionError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }
        info!("session started");
        Ok(())
    }

    /// Move Running → Stopped; detaches any peer and wakes pending `update`
    /// calls so they can observe the stop
    pub fn stop(&self) -> Result<(), SessionError> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::NotRunning);
        }
        self.detach();
        self.bell.ring();
        info!("session stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Attach a peer connection; replaces any currently attached peer.
    ///
    /// Every cell is marked fully dirty first, so the very next flush sends
    /// the peer a complete state snapshot.
    pub fn attach_peer(&self, link: Box<dyn PeerLink>) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        // retire the previous peer, if any
        self.detach();

        let gen = self.peer_gen.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, rx) = link.split();
        *self.tx.lock() = Some(tx);

        self.store.mark_all_dirty();
        self.connected.store(true, Ordering::Release);

        let handle = std::thread::Builder::new()
            .name(format!("peer-reader-{gen}"))
            .spawn({
                let store = self.store.clone();
                let connected = self.connected.clone();
                let peer_gen = self.peer_gen.clone();
                let tx = self.tx.clone();
                move || reader_loop(gen, rx, store, connected, peer_gen, tx)
            })
            .map_err(|e| SessionError::Spawn(e.to_string()))?;
        *self.reader.lock() = Some(handle);

        // wake any pump blocked in `update` so the snapshot goes out now
        self.bell.ring();
        info!(gen, "peer attached");
        Ok(())
    }

    /// Drop the attached peer; dirty state keeps accumulating for the next one
    pub fn disconnect_peer(&self) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.detach();
        info!("peer disconnected");
        Ok(())
    }

    fn detach(&self) {
        self.peer_gen.fetch_add(1, Ordering::AcqRel);
        self.connected.store(false, Ordering::Release);
        *self.tx.lock() = None;
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Pump dirty state to the peer for at most `timeout`.
    ///
    /// Flushes immediately, then keeps flushing as new dirty state appears
    /// until the deadline passes. `None` flushes once without waiting.
    /// Returns promptly when the session is stopped mid-wait. Without an
    /// attached peer this only waits; nothing is drained or lost.
    pub fn update(&self, timeout: Option<Duration>) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        // stamp before flushing so a ring racing the flush is not missed
        let mut seen = self.bell.stamp();
        self.flush_once();

        let Some(timeout) = timeout else {
            return Ok(());
        };
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let current = self.bell.wait_past(seen, deadline - now);
            if current != seen {
                seen = current;
                self.flush_once();
            }
        }
    }

    /// Drain every pending dirty record to the peer, if one is attached.
    /// A send failure demotes to disconnected; the session keeps running.
    fn flush_once(&self) {
        if !self.is_connected() {
            return;
        }
        let mut guard = self.tx.lock();
        let Some(tx) = guard.as_mut() else {
            return;
        };
        let msgs = self.store.collect_dirty();
        if msgs.is_empty() {
            return;
        }
        debug!(count = msgs.len(), "flushing dirty state");
        for msg in msgs {
            if let Err(err) = tx.send(msg) {
                warn!(error = %err, "peer link dropped during flush");
                *guard = None;
                self.peer_gen.fetch_add(1, Ordering::AcqRel);
                self.connected.store(false, Ordering::Release);
                return;
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.detach();
    }
}

/// Polls the peer for inbound mutation requests until the generation goes
/// stale or the link drops
fn reader_loop(
    gen: u64,
    mut rx: Box<dyn LinkRx>,
    store: Arc<ValueStore>,
    connected: Arc<AtomicBool>,
    peer_gen: Arc<AtomicU64>,
    tx: Arc<Mutex<Option<Box<dyn LinkTx>>>>,
) {
    loop {
        if peer_gen.load(Ordering::Acquire) != gen {
            return;
        }
        match rx.recv_timeout(PEER_POLL) {
            Ok(Some(msg)) => {
                let id = msg.value_id();
                if let Err(err) = store.apply_message(msg) {
                    // bad peer input is logged and dropped, never fatal
                    warn!(id, error = %err, "rejected inbound message");
                }
            }
            Ok(None) => {}
            Err(err) => {
                // only demote if this reader still owns the session; the
                // generation re-check under the tx lock keeps a racing
                // attach from losing its fresh link
                let mut guard = tx.lock();
                if peer_gen.load(Ordering::Acquire) == gen {
                    warn!(gen, error = %err, "peer link closed");
                    connected.store(false, Ordering::Release);
                    *guard = None;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, ValueKind};
    use crate::signal::SignalRouter;
    use crate::transport::{ChannelLink, SyncMessage};
    use crate::value::{Variant, VariantKind};

    /// Opt-in log output for test runs, driven by RUST_LOG
    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn harness() -> (Arc<ValueStore>, SessionManager) {
        init_logging();
        let mut b = Schema::builder();
        b.add(ValueKind::Value(VariantKind::Int)); // 10
        b.add(ValueKind::Value(VariantKind::Bool)); // 11
        let bell = Arc::new(DirtyBell::new());
        let store = Arc::new(ValueStore::new(
            &b.build(),
            Arc::new(SignalRouter::new()),
            bell.clone(),
        ));
        let session = SessionManager::new(store.clone(), bell);
        (store, session)
    }

    #[test]
    fn lifecycle_transitions_are_checked() {
        let (_, session) = harness();
        assert_eq!(session.stop(), Err(SessionError::NotRunning));
        assert_eq!(session.update(None), Err(SessionError::NotRunning));

        session.start().unwrap();
        assert_eq!(session.start(), Err(SessionError::AlreadyRunning));
        assert!(session.is_running());

        session.stop().unwrap();
        assert!(!session.is_running());
    }

    #[test]
    fn attach_requires_running_session() {
        let (_, session) = harness();
        let (link, _client) = ChannelLink::pair();
        assert_eq!(
            session.attach_peer(Box::new(link)),
            Err(SessionError::NotRunning)
        );
    }

    #[test]
    fn attach_sends_full_snapshot_of_accumulated_state() {
        let (store, session) = harness();
        session.start().unwrap();

        // mutations while disconnected accumulate, nothing is lost
        store.set_value(10, Variant::Int(7), false, true).unwrap();
        store.set_value(11, Variant::Bool(true), false, false).unwrap();

        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        assert!(session.is_connected());

        session.update(None).unwrap();
        let msgs = client.drain();
        // mark_all_dirty on attach covers even the update=false write
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].value_id(), 10);
        assert_eq!(msgs[1].value_id(), 11);
        session.stop().unwrap();
    }

    #[test]
    fn pump_wakes_for_mutations_during_the_wait() {
        let (store, session) = harness();
        session.start().unwrap();
        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        session.update(None).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                store.set_value(10, Variant::Int(42), false, true).unwrap();
            })
        };
        session.update(Some(Duration::from_millis(400))).unwrap();
        writer.join().unwrap();

        let msgs = client.drain();
        assert!(msgs.contains(&SyncMessage::Value {
            id: 10,
            value: Variant::Int(42),
            signal: false,
        }));
        session.stop().unwrap();
    }

    #[test]
    fn update_returns_by_the_deadline() {
        let (_, session) = harness();
        session.start().unwrap();

        let started = Instant::now();
        session.update(Some(Duration::from_millis(50))).unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        session.stop().unwrap();
    }

    #[test]
    fn inbound_write_applies_without_echo() {
        let (store, session) = harness();
        session.start().unwrap();
        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        session.update(None).unwrap();
        let _ = client.drain();

        client
            .send(SyncMessage::Value {
                id: 10,
                value: Variant::Int(99),
                signal: false,
            })
            .unwrap();

        // wait for the reader thread to apply it
        let deadline = Instant::now() + Duration::from_secs(2);
        while store.get_value(10).unwrap() != Variant::Int(99) {
            assert!(Instant::now() < deadline, "inbound write never applied");
            std::thread::sleep(Duration::from_millis(5));
        }

        session.update(None).unwrap();
        assert!(client.drain().is_empty(), "peer write must not echo back");
        session.stop().unwrap();
    }

    #[test]
    fn dropped_peer_demotes_to_disconnected() {
        let (store, session) = harness();
        session.start().unwrap();
        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        session.update(None).unwrap();
        let _ = client.drain();

        drop(client);
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_connected() {
            assert!(Instant::now() < deadline, "drop never detected");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(session.is_running());

        // state written while disconnected reaches the next peer in full
        store.set_value(10, Variant::Int(5), false, true).unwrap();
        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        session.update(None).unwrap();
        assert_eq!(client.drain().len(), 2);
        session.stop().unwrap();
    }

    #[test]
    fn reader_detected_drop_clears_the_link_state() {
        let (_, session) = harness();
        session.start().unwrap();
        let (link, client) = ChannelLink::pair();
        session.attach_peer(Box::new(link)).unwrap();
        session.update(None).unwrap();
        let _ = client.drain();

        drop(client);
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_connected() {
            assert!(Instant::now() < deadline, "drop never detected");
            std::thread::sleep(Duration::from_millis(10));
        }
        // the sender half is released with the demotion, not parked until
        // the next attach
        assert!(session.tx.lock().is_none());
        session.stop().unwrap();
    }

    #[test]
    fn replacing_a_peer_resyncs_the_new_one() {
        let (_, session) = harness();
        session.start().unwrap();

        let (link_a, client_a) = ChannelLink::pair();
        session.attach_peer(Box::new(link_a)).unwrap();
        session.update(None).unwrap();
        assert_eq!(client_a.drain().len(), 2);

        let (link_b, client_b) = ChannelLink::pair();
        session.attach_peer(Box::new(link_b)).unwrap();
        session.update(None).unwrap();
        assert_eq!(client_b.drain().len(), 2);
        session.stop().unwrap();
    }

    #[test]
    fn disconnect_without_peer_is_an_error() {
        let (_, session) = harness();
        session.start().unwrap();
        assert_eq!(session.disconnect_peer(), Err(SessionError::NotConnected));
        session.stop().unwrap();
    }

    #[test]
    fn stop_interrupts_a_long_update() {
        let (_, session) = harness();
        session.start().unwrap();

        let session = Arc::new(session);
        let pump = {
            let session = session.clone();
            std::thread::spawn(move || session.update(Some(Duration::from_secs(30))))
        };
        std::thread::sleep(Duration::from_millis(50));
        session.stop().unwrap();

        let started = Instant::now();
        pump.join().unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
