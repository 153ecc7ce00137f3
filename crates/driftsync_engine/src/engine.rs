//! The sync engine: an observable status machine over a transport.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::{SyncOutcome, SyncState, SyncStatus};
use crate::transport::SyncTransport;
use chrono::Utc;
use driftsync_core::ChangeTracker;
use driftsync_protocol::{ChangeId, PushChangesRequest, ResolutionChoice, ResolveConflictRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

enum Flight {
    Lead(watch::Sender<Option<SyncOutcome>>),
    Join(watch::Receiver<Option<SyncOutcome>>),
}

// `Stopped` is terminal until `start()`; a sync finishing after `stop()`
// must not resurrect the engine.
fn set_status(state: &mut SyncState, status: SyncStatus) {
    if state.status != SyncStatus::Stopped {
        state.status = status;
    }
}

/// Drives periodic reconciliation against the remote authority.
///
/// The engine pulls pending changes from its [`ChangeTracker`], pushes
/// them over the transport, and on confirmation marks them applied and
/// merges the server's vector clock. Conflicts surface through the
/// observable state and block scheduled syncs until
/// [`SyncEngine::resolve_conflict`] is called; transport failures leave
/// pending changes intact and back off exponentially between retries.
///
/// Overlapping [`SyncEngine::sync`] calls share one outstanding round
/// trip (single-flight); `stop()` cancels the schedule but lets an
/// in-flight round trip finish naturally, bounded by the request
/// timeout.
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    tracker: Arc<ChangeTracker>,
    state_tx: watch::Sender<SyncState>,
    online_tx: watch::Sender<bool>,
    in_flight: Mutex<Option<watch::Receiver<Option<SyncOutcome>>>>,
    consecutive_failures: AtomicU32,
    backoff_until: Mutex<Option<Instant>>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    /// Creates a new engine over a transport and tracker.
    pub fn new(config: SyncConfig, transport: T, tracker: Arc<ChangeTracker>) -> Self {
        let (state_tx, _) = watch::channel(SyncState::default());
        let (online_tx, _) = watch::channel(true);
        Self {
            config,
            transport: Arc::new(transport),
            tracker,
            state_tx,
            online_tx,
            in_flight: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            backoff_until: Mutex::new(None),
            scheduler: Mutex::new(None),
        }
    }

    /// Returns a snapshot of the observable state.
    pub fn state(&self) -> SyncState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to the observable state.
    ///
    /// The receiver holds the current state immediately and observes
    /// every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Updates the online/offline signal.
    ///
    /// While offline, scheduled and manual syncs no-op; a running
    /// schedule reacts to reconnection with an immediate sync.
    pub fn set_online(&self, online: bool) {
        let _ = self.online_tx.send(online);
        self.state_tx.send_modify(|state| state.is_online = online);
    }

    /// Returns whether the engine currently believes it is online.
    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Starts the periodic schedule.
    ///
    /// Captures the current online status, runs an immediate sync, then
    /// syncs every `interval` while online. Calling `start` on a
    /// running engine replaces the schedule; after `stop()` it brings
    /// the engine back to `Idle`.
    pub fn start(self: Arc<Self>, interval: Duration) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let online = self.is_online();
        self.state_tx.send_modify(|state| {
            state.status = SyncStatus::Idle;
            state.is_online = online;
            state.sync_error = None;
        });

        let engine = Arc::clone(&self);
        let mut online_rx = self.online_tx.subscribe();
        let handle = tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "sync schedule started");
            engine.sync().await;

            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if engine.should_auto_sync() {
                            engine.sync().await;
                        }
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow();
                        if online {
                            info!("back online, syncing");
                            engine.sync().await;
                        } else {
                            debug!("offline, pausing sync");
                        }
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            debug!("sync schedule ended");
        });

        let previous = self
            .scheduler
            .lock()
            .replace(Scheduler {
                shutdown: shutdown_tx,
                handle,
            });
        if let Some(previous) = previous {
            let _ = previous.shutdown.send(true);
        }
    }

    /// Stops the periodic schedule and transitions to `Stopped`.
    ///
    /// An in-flight sync finishes naturally; only future scheduled
    /// syncs are cancelled.
    pub fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            let _ = scheduler.shutdown.send(true);
            drop(scheduler.handle);
        }
        self.state_tx
            .send_modify(|state| state.status = SyncStatus::Stopped);
        info!("sync engine stopped");
    }

    /// Runs one sync cycle, sharing any outstanding one.
    ///
    /// Offline or stopped engines no-op. Otherwise, if a round trip is
    /// already outstanding, this call awaits that round trip's outcome
    /// instead of issuing a duplicate request.
    pub async fn sync(&self) -> SyncOutcome {
        if self.state_tx.borrow().status == SyncStatus::Stopped {
            return SyncOutcome::Stopped;
        }
        if !self.is_online() {
            debug!("sync skipped: offline");
            return SyncOutcome::Offline;
        }

        let flight = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                Some(outstanding) => Flight::Join(outstanding.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *in_flight = Some(rx);
                    Flight::Lead(tx)
                }
            }
        };

        match flight {
            Flight::Join(mut rx) => Self::join_outstanding(&mut rx, &self.in_flight).await,
            Flight::Lead(tx) => {
                let outcome = self.perform_sync().await;
                *self.in_flight.lock() = None;
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    async fn join_outstanding(
        rx: &mut watch::Receiver<Option<SyncOutcome>>,
        in_flight: &Mutex<Option<watch::Receiver<Option<SyncOutcome>>>>,
    ) -> SyncOutcome {
        let waited = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| outcome.clone());
        match waited {
            Ok(outcome) => outcome.unwrap_or_else(|| SyncOutcome::Failed {
                message: "sync interrupted".into(),
            }),
            Err(_) => {
                // The leading call was dropped mid-flight; clear the
                // stale guard so the next sync can proceed.
                let mut guard = in_flight.lock();
                if guard.as_ref().is_some_and(|r| r.same_channel(rx)) {
                    *guard = None;
                }
                SyncOutcome::Failed {
                    message: "sync interrupted".into(),
                }
            }
        }
    }

    async fn perform_sync(&self) -> SyncOutcome {
        let pending = match self.tracker.pending_changes() {
            Ok(pending) => pending,
            Err(err) => return self.record_failure(SyncError::from(err)),
        };

        self.state_tx.send_modify(|state| {
            set_status(state, SyncStatus::Syncing);
            state.pending_changes = pending.len();
        });

        if pending.is_empty() {
            self.state_tx.send_modify(|state| {
                set_status(state, SyncStatus::Idle);
                state.sync_count += 1;
                state.sync_error = None;
            });
            self.reset_backoff();
            return SyncOutcome::Applied { changes: 0 };
        }

        debug!(changes = pending.len(), "pushing changes");
        let request = PushChangesRequest::new(pending.clone(), self.tracker.vector_clock());

        let response = match tokio::time::timeout(
            self.config.request_timeout,
            self.transport.push_changes(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return self.record_failure(err),
            Err(_) => return self.record_failure(SyncError::Timeout),
        };

        if !response.is_clean() {
            let conflicts = response.conflicts.len();
            warn!(conflicts, "server reported conflicts");
            self.state_tx.send_modify(|state| {
                set_status(state, SyncStatus::Conflict);
                state.conflict_count = conflicts;
            });
            return SyncOutcome::Conflicted { conflicts };
        }

        for change in &pending {
            if let Err(err) = self.tracker.mark_applied(&change.id) {
                warn!(change = %change.id, error = %err, "failed to mark change applied");
            }
        }
        if let Some(clock) = &response.vector_clock {
            self.tracker.merge_remote_clock(clock);
        }

        let now = Utc::now();
        let remaining = self
            .tracker
            .pending_changes()
            .map(|p| p.len())
            .unwrap_or(0);
        self.state_tx.send_modify(|state| {
            set_status(state, SyncStatus::Idle);
            state.last_sync = Some(now);
            state.sync_count += 1;
            state.conflict_count = 0;
            state.pending_changes = remaining;
            state.sync_error = None;
        });
        self.reset_backoff();

        info!(changes = pending.len(), "sync complete");
        SyncOutcome::Applied {
            changes: pending.len(),
        }
    }

    /// Posts a conflict resolution choice, then re-syncs.
    pub async fn resolve_conflict(
        &self,
        change_id: ChangeId,
        resolution: ResolutionChoice,
    ) -> SyncResult<SyncOutcome> {
        let request = ResolveConflictRequest {
            change_id,
            resolution,
        };

        let response = tokio::time::timeout(
            self.config.request_timeout,
            self.transport.resolve_conflict(&request),
        )
        .await
        .map_err(|_| SyncError::Timeout)??;

        if !response.acknowledged {
            return Err(SyncError::ServerError(
                "conflict resolution not acknowledged".into(),
            ));
        }

        info!(change = %change_id, %resolution, "conflict resolved");
        self.state_tx.send_modify(|state| {
            state.conflict_count = state.conflict_count.saturating_sub(1);
            if state.conflict_count == 0 && state.status == SyncStatus::Conflict {
                state.status = SyncStatus::Idle;
            }
        });

        Ok(self.sync().await)
    }

    fn should_auto_sync(&self) -> bool {
        let state = self.state_tx.borrow();
        if state.status.is_blocked() {
            return false;
        }
        drop(state);

        if !self.is_online() {
            return false;
        }
        let backoff_until = *self.backoff_until.lock();
        backoff_until.map_or(true, |until| Instant::now() >= until)
    }

    fn record_failure(&self, err: SyncError) -> SyncOutcome {
        let message = err.to_string();
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.config.retry.delay_for_attempt(failures);
        *self.backoff_until.lock() = Some(Instant::now() + delay);

        error!(
            error = %message,
            failures,
            backoff_ms = delay.as_millis() as u64,
            "sync failed"
        );

        self.state_tx.send_modify(|state| {
            set_status(state, SyncStatus::Error);
            state.sync_error = Some(message.clone());
        });
        SyncOutcome::Failed { message }
    }

    fn reset_backoff(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.backoff_until.lock() = None;
    }

    /// Returns the engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the tracker this engine syncs for.
    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }
}
