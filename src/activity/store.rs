//! Debounced per-task busy state.
//!
//! State is keyed by task key: the suffix of a [`PtyId`], which is also how
//! events from the PTY broadcast are correlated to a tracked task.
//!
//! Timing is driven by explicit [`Instant`]s. [`ActivityStore::tick`]
//! applies every clear whose deadline has passed; [`ActivityStore::run_timers`]
//! calls it from a tokio task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

use super::classifier::classify;
use crate::domain::{ActivitySignal, Classification, PtyId, PtyIdKind};
use crate::pty::PtyEvent;

pub const DEFAULT_HOLD: Duration = Duration::from_millis(1200);
pub const DEFAULT_SOFT_CLEAR: Duration = Duration::from_millis(8000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityConfig {
    /// Minimum time a task stays busy once it became busy
    pub hold: Duration,
    /// Quiet period after which a busy task without signals reverts to idle
    pub soft_clear: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            hold: DEFAULT_HOLD,
            soft_clear: DEFAULT_SOFT_CLEAR,
        }
    }
}

/// Task key for a PTY id: its suffix, or the whole id if it does not parse.
pub fn task_key(pty_id: &str) -> String {
    PtyId::parse(pty_id)
        .map(|id| id.suffix)
        .unwrap_or_else(|| pty_id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyUpdate {
    pub key: String,
    pub busy: bool,
    pub signal: ActivitySignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionUpdate {
    pub key: String,
    pub action: Option<String>,
}

/// Externally visible state of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySnapshot {
    pub busy: bool,
    pub last_signal: ActivitySignal,
    pub last_action: Option<String>,
    pub busy_for_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClearKind {
    /// Not-busy arrived inside the hold window
    HoldRelease,
    /// No recognizable signal for a while
    SoftClear,
}

#[derive(Debug, Clone, Copy)]
struct PendingClear {
    kind: ClearKind,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct TaskState {
    busy: bool,
    last_signal: ActivitySignal,
    last_action: Option<String>,
    busy_since: Option<Instant>,
    /// At most one clear is armed per task; arming replaces it
    pending: Option<PendingClear>,
}

struct Attachment {
    kinds: HashSet<PtyIdKind>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Listeners {
    busy: Vec<(u64, mpsc::UnboundedSender<BusyUpdate>)>,
    actions: Vec<(u64, mpsc::UnboundedSender<ActionUpdate>)>,
    attachments: Vec<Attachment>,
}

impl Listeners {
    fn is_empty(&self) -> bool {
        self.busy.is_empty() && self.actions.is_empty()
    }

    fn attached_kinds(&self) -> HashSet<PtyIdKind> {
        self.attachments
            .iter()
            .flat_map(|a| a.kinds.iter().copied())
            .collect()
    }

    fn detach_all(&mut self) {
        for attachment in self.attachments.drain(..) {
            attachment.handle.abort();
        }
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskState>,
    listeners: HashMap<String, Listeners>,
}

impl Inner {
    fn emit_busy(&mut self, key: &str) {
        let Some(state) = self.tasks.get(key) else {
            return;
        };
        let update = BusyUpdate {
            key: key.to_string(),
            busy: state.busy,
            signal: state.last_signal,
        };
        tracing::debug!(task = key, busy = update.busy, signal = %update.signal, "Busy state changed");
        if let Some(listeners) = self.listeners.get_mut(key) {
            listeners.busy.retain(|(_, tx)| tx.send(update.clone()).is_ok());
        }
    }

    fn emit_action(&mut self, key: &str, action: Option<String>) {
        if let Some(listeners) = self.listeners.get_mut(key) {
            let update = ActionUpdate {
                key: key.to_string(),
                action,
            };
            listeners.actions.retain(|(_, tx)| tx.send(update.clone()).is_ok());
        }
    }

    fn release(&mut self, key: &str) {
        let Some(state) = self.tasks.get_mut(key) else {
            return;
        };
        state.pending = None;
        if !state.busy {
            return;
        }
        state.busy = false;
        state.busy_since = None;
        self.emit_busy(key);
    }
}

/// Busy/awaiting-input tracking for every task with a terminal.
pub struct ActivityStore {
    config: ActivityConfig,
    inner: Mutex<Inner>,
    timers_changed: Notify,
    next_listener: AtomicU64,
}

impl Default for ActivityStore {
    fn default() -> Self {
        Self::new(ActivityConfig::default())
    }
}

impl ActivityStore {
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            timers_changed: Notify::new(),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> ActivityConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify an output chunk of `pty_id` and apply the result.
    pub fn ingest(&self, pty_id: &str, chunk: &[u8], now: Instant) -> Classification {
        let parsed = PtyId::parse(pty_id);
        let provider = parsed.as_ref().map(|id| id.provider.as_str());
        let classification = classify(provider, chunk);
        let key = task_key(pty_id);

        if let Some(action) = &classification.action {
            self.set_action(&key, Some(action.clone()));
        }
        self.apply_signal(&key, classification.signal, now);
        classification
    }

    /// Apply one signal to `key`.
    pub fn apply_signal(&self, key: &str, signal: ActivitySignal, now: Instant) {
        let hold = self.config.hold;
        let soft_clear = self.config.soft_clear;
        let mut inner = self.lock();
        let state = inner.tasks.entry(key.to_string()).or_default();

        match signal {
            ActivitySignal::Busy => {
                state.last_signal = ActivitySignal::Busy;
                // Replaces a pending hold release; silence from here on clears
                state.pending = Some(PendingClear {
                    kind: ClearKind::SoftClear,
                    deadline: now + soft_clear,
                });
                if !state.busy {
                    state.busy = true;
                    state.busy_since = Some(now);
                    inner.emit_busy(key);
                }
            }
            ActivitySignal::AwaitingInput | ActivitySignal::Idle => {
                let changed = state.last_signal != signal;
                state.last_signal = signal;
                let hold_until = state
                    .busy_since
                    .map(|since| since + hold)
                    .filter(|until| state.busy && now < *until);

                if let Some(deadline) = hold_until {
                    state.pending = Some(PendingClear {
                        kind: ClearKind::HoldRelease,
                        deadline,
                    });
                } else if state.busy {
                    inner.release(key);
                } else {
                    state.pending = None;
                    if changed {
                        inner.emit_busy(key);
                    }
                }
            }
            ActivitySignal::Neutral => {
                let hold_pending = state
                    .pending
                    .is_some_and(|p| p.kind == ClearKind::HoldRelease);
                if state.busy && !hold_pending {
                    state.pending = Some(PendingClear {
                        kind: ClearKind::SoftClear,
                        deadline: now + soft_clear,
                    });
                }
            }
        }

        drop(inner);
        self.timers_changed.notify_one();
    }

    /// The process behind `pty_id` exited: the task is idle, whatever came
    /// before. Listeners are told, then the task's state is dropped.
    pub fn process_exited(&self, pty_id: &str) {
        let key = task_key(pty_id);
        let mut inner = self.lock();
        let state = inner.tasks.entry(key.clone()).or_default();
        let changed = state.busy || state.last_signal != ActivitySignal::Idle;
        state.busy = false;
        state.busy_since = None;
        state.pending = None;
        state.last_signal = ActivitySignal::Idle;
        let had_action = state.last_action.take().is_some();

        if changed {
            inner.emit_busy(&key);
        }
        if had_action {
            inner.emit_action(&key, None);
        }
        inner.tasks.remove(&key);
    }

    /// Apply every clear due at `now`. Returns how many fired.
    pub fn tick(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let due: Vec<(String, ClearKind)> = inner
            .tasks
            .iter()
            .filter_map(|(key, state)| {
                let pending = state.pending?;
                (pending.deadline <= now).then(|| (key.clone(), pending.kind))
            })
            .collect();

        for (key, kind) in &due {
            if *kind == ClearKind::SoftClear {
                tracing::debug!(task = %key, "No activity signal, clearing busy state");
                if let Some(state) = inner.tasks.get_mut(key) {
                    state.last_signal = ActivitySignal::Idle;
                }
            }
            inner.release(key);
        }
        due.len()
    }

    /// Earliest armed clear.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock()
            .tasks
            .values()
            .filter_map(|s| s.pending.map(|p| p.deadline))
            .min()
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.lock().tasks.get(key).is_some_and(|s| s.busy)
    }

    pub fn snapshot(&self, key: &str, now: Instant) -> Option<ActivitySnapshot> {
        let inner = self.lock();
        let state = inner.tasks.get(key)?;
        Some(ActivitySnapshot {
            busy: state.busy,
            last_signal: state.last_signal,
            last_action: state.last_action.clone(),
            busy_for_ms: state
                .busy_since
                .map(|since| now.saturating_duration_since(since).as_millis() as u64),
        })
    }

    /// Set or clear what `key` is doing. Unchanged values are not re-sent.
    pub fn set_action(&self, key: &str, action: Option<String>) {
        let mut inner = self.lock();
        let state = inner.tasks.entry(key.to_string()).or_default();
        if state.last_action == action {
            return;
        }
        state.last_action = action.clone();
        inner.emit_action(key, action);
    }

    pub fn subscribe_busy(self: &Arc<Self>, key: &str) -> Subscription<BusyUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .listeners
            .entry(key.to_string())
            .or_default()
            .busy
            .push((id, tx));
        Subscription::new(self, key, id, rx)
    }

    pub fn subscribe_actions(self: &Arc<Self>, key: &str) -> Subscription<ActionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .listeners
            .entry(key.to_string())
            .or_default()
            .actions
            .push((id, tx));
        Subscription::new(self, key, id, rx)
    }

    /// Feed `key` from a raw PTY event stream, limited to terminals of
    /// `kinds`. Kinds already attached for `key` are skipped; returns
    /// whether a new attachment was made.
    ///
    /// Attachments live until the last listener of `key` unsubscribes.
    /// Requires a tokio runtime.
    pub fn attach_source(
        self: &Arc<Self>,
        key: &str,
        events: broadcast::Receiver<PtyEvent>,
        kinds: &[PtyIdKind],
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(task = key, "No async runtime, cannot attach PTY stream");
            return false;
        };

        let mut inner = self.lock();
        let listeners = inner.listeners.entry(key.to_string()).or_default();
        let attached = listeners.attached_kinds();
        let kinds: HashSet<PtyIdKind> = kinds
            .iter()
            .copied()
            .filter(|k| !attached.contains(k))
            .collect();
        if kinds.is_empty() {
            return false;
        }

        let handle = runtime.spawn(pump_events(
            Arc::downgrade(self),
            key.to_string(),
            kinds.clone(),
            events,
        ));
        listeners.attachments.push(Attachment { kinds, handle });
        true
    }

    fn unsubscribe(&self, key: &str, id: u64) {
        let mut inner = self.lock();
        let Some(listeners) = inner.listeners.get_mut(key) else {
            return;
        };
        listeners.busy.retain(|(lid, _)| *lid != id);
        listeners.actions.retain(|(lid, _)| *lid != id);
        if listeners.is_empty() {
            listeners.detach_all();
            inner.listeners.remove(key);
            tracing::debug!(task = key, "Last listener gone, detached PTY streams");
        }
    }

    /// Drive hold and soft-clear timers. Runs until the task is aborted.
    pub async fn run_timers(self: Arc<Self>) {
        loop {
            let changed = self.timers_changed.notified();
            match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                            // The sleep ended, so the deadline has been reached
                            self.tick(Instant::now().max(deadline));
                        }
                        _ = changed => {}
                    }
                }
                None => changed.await,
            }
        }
    }
}

async fn pump_events(
    store: Weak<ActivityStore>,
    key: String,
    kinds: HashSet<PtyIdKind>,
    mut events: broadcast::Receiver<PtyEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(task = %key, skipped, "Activity stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(id) = PtyId::parse(event.id()) else {
            continue;
        };
        if id.suffix != key || !kinds.contains(&id.kind) {
            continue;
        }
        let Some(store) = store.upgrade() else {
            break;
        };

        match &event {
            PtyEvent::Data { id, bytes, .. } => {
                store.ingest(id, bytes, Instant::now());
            }
            PtyEvent::Exit { id, .. } => store.process_exited(id),
        }
    }
}

/// Listener handle. Dropping it unsubscribes.
pub struct Subscription<T> {
    store: Weak<ActivityStore>,
    key: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    fn new(
        store: &Arc<ActivityStore>,
        key: &str,
        id: u64,
        rx: mpsc::UnboundedReceiver<T>,
    ) -> Self {
        Self {
            store: Arc::downgrade(store),
            key: key.to_string(),
            id,
            rx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Attach a raw PTY stream for this subscription's task.
    pub fn attach_source(&self, events: broadcast::Receiver<PtyEvent>, kinds: &[PtyIdKind]) -> bool {
        match self.store.upgrade() {
            Some(store) => store.attach_source(&self.key, events, kinds),
            None => false,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.key, self.id);
        }
    }
}
