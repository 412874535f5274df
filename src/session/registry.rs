// src/session/registry.rs
//
// Peer -> running session bookkeeping. Each session runs on its own worker
// thread; the registry only holds lifecycle handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::detection::{DetectionSession, SessionReport};
use super::{PeerId, SessionId};
use crate::config::DetectorConfig;
use crate::core::capture::CaptureDevice;
use crate::error::SessionError;

/// Receives finished-session verdicts (the outbound notification boundary)
pub trait VerdictSink: Send + Sync {
    fn deliver(&self, peer: &PeerId, matched: bool);
}

/// Result of [`SessionRegistry::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A session for this peer is still running; nothing was started
    AlreadyRunning(SessionId),
}

struct SessionHandle {
    id: SessionId,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

struct Shared {
    config: Arc<DetectorConfig>,
    device: Arc<dyn CaptureDevice>,
    sink: Arc<dyn VerdictSink>,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<PeerId, SessionHandle>>,
    changed: Condvar,
    /// Workers whose entries were removed by cancel but may still be tearing down
    retired: Mutex<Vec<JoinHandle<()>>>,
    reports: Mutex<Vec<SessionReport>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn complete(&self, peer: &PeerId, id: SessionId, result: Result<SessionReport, SessionError>) {
        match result {
            Ok(report) => {
                let verdict = report.verdict;
                lock(&self.reports).push(report);
                match verdict {
                    Some(matched) => self.on_verdict(peer, id, matched),
                    None => self.retire(peer, id),
                }
            }
            Err(e) => {
                error!("[{peer}] session {id} failed: {e}");
                self.on_verdict(peer, id, false);
            }
        }
    }

    fn on_verdict(&self, peer: &PeerId, id: SessionId, matched: bool) {
        debug!("[{peer}] session {id} verdict {matched}");
        self.sink.deliver(peer, matched);
        self.retire(peer, id);
    }

    /// Drop the entry only if it still belongs to session `id`
    fn retire(&self, peer: &PeerId, id: SessionId) {
        let mut sessions = lock(&self.sessions);
        if sessions.get(peer).map(|h| h.id) == Some(id) {
            sessions.remove(peer);
        }
        self.changed.notify_all();
    }
}

/// Maps peers to their in-flight detection sessions.
///
/// Safe to call from any thread; `start` and `cancel` never wait on a
/// session.
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<DetectorConfig>,
        device: Arc<dyn CaptureDevice>,
        sink: Arc<dyn VerdictSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                device,
                sink,
                next_id: AtomicU64::new(1),
                sessions: Mutex::new(HashMap::new()),
                changed: Condvar::new(),
                retired: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.shared.config
    }

    /// Start a session for `peer` unless one is already running. A session
    /// that cannot be started is reported to the sink as not detected.
    pub fn start(&self, peer: &PeerId) -> Result<StartOutcome, SessionError> {
        let mut sessions = lock(&self.shared.sessions);

        if let Some(handle) = sessions.get(peer) {
            if !handle.worker.is_finished() {
                debug!("[{peer}] session {} already running", handle.id);
                return Ok(StartOutcome::AlreadyRunning(handle.id));
            }
        }

        match self.spawn(peer, &mut sessions) {
            Ok(id) => {
                info!("[{peer}] session {id} started");
                Ok(StartOutcome::Started(id))
            }
            Err(e) => {
                drop(sessions);
                error!("[{peer}] could not start session: {e}");
                self.shared.sink.deliver(peer, false);
                Err(e)
            }
        }
    }

    fn spawn(
        &self,
        peer: &PeerId,
        sessions: &mut HashMap<PeerId, SessionHandle>,
    ) -> Result<SessionId, SessionError> {
        let id = SessionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let session = DetectionSession::new(peer.clone(), id, Arc::clone(&self.shared.config))?;
        let cancel = CancelToken::new();

        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let worker_peer = peer.clone();
        let worker = thread::Builder::new()
            .name(format!("detect-{peer}"))
            .spawn(move || {
                let result = session.run(shared.device.as_ref(), &token);
                shared.complete(&worker_peer, id, result);
            })
            .map_err(|source| SessionError::Spawn {
                peer: peer.to_string(),
                source,
            })?;

        sessions.insert(peer.clone(), SessionHandle { id, cancel, worker });
        Ok(id)
    }

    /// Signal cancellation and forget the peer's session immediately. The
    /// worker releases its capture stream on its own. Returns whether a
    /// session was registered.
    pub fn cancel(&self, peer: &PeerId) -> bool {
        let handle = lock(&self.shared.sessions).remove(peer);
        self.shared.changed.notify_all();

        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                info!("[{peer}] session {} cancelled", handle.id);
                let mut retired = lock(&self.shared.retired);
                retired.retain(|worker| !worker.is_finished());
                retired.push(handle.worker);
                true
            }
            None => false,
        }
    }

    /// Forward a verdict for `peer` and clear its entry if it still belongs
    /// to `session`.
    pub fn on_verdict(&self, peer: &PeerId, session: SessionId, matched: bool) {
        self.shared.on_verdict(peer, session, matched);
    }

    pub fn is_active(&self, peer: &PeerId) -> bool {
        lock(&self.shared.sessions)
            .get(peer)
            .map(|handle| !handle.worker.is_finished())
            .unwrap_or(false)
    }

    pub fn active_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = lock(&self.shared.sessions).keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn active_count(&self) -> usize {
        lock(&self.shared.sessions).len()
    }

    /// Reports of sessions that ran to an outcome, oldest first
    pub fn take_reports(&self) -> Vec<SessionReport> {
        std::mem::take(&mut *lock(&self.shared.reports))
    }

    /// Block until no session is registered or `timeout` passes. Returns
    /// whether the registry went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut sessions = lock(&self.shared.sessions);
        while !sessions.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sessions = match self.shared.changed.wait_timeout(sessions, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    pub fn cancel_all(&self) {
        let peers: Vec<PeerId> = lock(&self.shared.sessions).keys().cloned().collect();
        for peer in peers {
            self.cancel(&peer);
        }
    }

    /// Cancel every session and wait for all workers to release their
    /// capture streams.
    pub fn shutdown(&self) {
        self.cancel_all();
        let workers = std::mem::take(&mut *lock(&self.shared.retired));
        for worker in workers {
            if worker.join().is_err() {
                warn!("detection worker panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfigBuilder;
    use crate::testgen::{self, ScriptedCaptureDevice};

    #[derive(Default)]
    struct CollectingSink {
        verdicts: Mutex<Vec<(PeerId, bool)>>,
    }

    impl VerdictSink for CollectingSink {
        fn deliver(&self, peer: &PeerId, matched: bool) {
            lock(&self.verdicts).push((peer.clone(), matched));
        }
    }

    fn registry(
        interval: Duration,
        countdown: u32,
    ) -> (SessionRegistry, Arc<ScriptedCaptureDevice>, Arc<CollectingSink>) {
        let config = Arc::new(
            DetectorConfigBuilder::new()
                .iteration_interval(interval)
                .countdown(countdown)
                .build(),
        );
        let device = Arc::new(ScriptedCaptureDevice::new(vec![testgen::silence_frame(&config)]));
        let sink = Arc::new(CollectingSink::default());
        let registry = SessionRegistry::new(config, device.clone(), sink.clone());
        (registry, device, sink)
    }

    #[test]
    fn test_exhausted_session_delivers_false_and_clears_entry() {
        let (registry, device, sink) = registry(Duration::ZERO, 5);
        let peer = PeerId::from("AA:BB");

        assert!(matches!(registry.start(&peer), Ok(StartOutcome::Started(_))));
        assert!(registry.wait_idle(Duration::from_secs(5)));

        assert_eq!(*lock(&sink.verdicts), vec![(peer.clone(), false)]);
        assert!(!registry.is_active(&peer));
        assert_eq!(device.closed(), 1);

        let reports = registry.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].iterations, 6);
    }

    #[test]
    fn test_cancel_unknown_peer_is_noop() {
        let (registry, _, _) = registry(Duration::ZERO, 5);
        assert!(!registry.cancel(&PeerId::from("nobody")));
    }

    #[test]
    fn test_stale_verdict_does_not_clear_newer_session() {
        let (registry, _, sink) = registry(Duration::from_millis(50), 1000);
        let peer = PeerId::from("AA:BB");

        let id = match registry.start(&peer).unwrap() {
            StartOutcome::Started(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        registry.on_verdict(&peer, SessionId(id.0 + 100), true);
        assert!(registry.is_active(&peer));
        assert_eq!(lock(&sink.verdicts).len(), 1);

        registry.shutdown();
    }
}
