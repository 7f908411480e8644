// Cursor state machine for the state stream
//
// A cursor materializes the document state at a desired timestamp and moves
// that state along the timeline by replaying stored entries: forward by
// applying mutations and adopting snapshots, backward by applying the
// inverse deltas it remembered on the way in. The write cursor runs the
// same machine and additionally decides the storage shape of each incoming
// change (snapshot, mutation, or amendment of the last mutation).

pub mod subscription;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::Sender;
use log::{debug, warn};

use crate::config::RecordRate;
use crate::delta::Delta;
use crate::entry::{EntryData, EntryFilter, EntryKind, StreamEntry};
use crate::error::{Error, Result};
use crate::state::StateData;
use crate::storage::StorageBackend;
use crate::types::Timestamp;

pub use subscription::EntrySubscription;
use subscription::SubscriberMap;

/// Cursor operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorMode {
    /// Tracks the stream tail and accepts writes
    Write = 0,
    /// Replays forward only; moving backward recomputes from a snapshot
    ReadForward = 1,
    /// Replays in both directions using remembered inverse deltas
    ReadBidirectional = 2,
}

impl CursorMode {
    /// Whether this mode accepts writes
    pub fn is_writer(&self) -> bool {
        matches!(self, CursorMode::Write)
    }

    /// Whether this mode serves reads
    pub fn is_reader(&self) -> bool {
        !self.is_writer()
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorMode::Write => write!(f, "write"),
            CursorMode::ReadForward => write!(f, "read-forward"),
            CursorMode::ReadBidirectional => write!(f, "read-bidirectional"),
        }
    }
}

/// Mode-specific cursor state
///
/// Each mode carries only the fields it needs: a forward reader keeps no
/// history, a bidirectional reader keeps inverse deltas for rewinding, and
/// a writer keeps the last mutation plus the state immediately before it.
#[derive(Debug)]
enum ModeState {
    Forward,
    Bidirectional {
        /// Inverse-delta entries spanning `[last_snapshot, computed_at]`,
        /// ascending by timestamp
        history: Vec<StreamEntry>,
    },
    Write {
        /// The most recently applied or persisted mutation
        last_mutation: Option<StreamEntry>,
        /// The state immediately before `last_mutation`; the base for
        /// amendment deltas and the equal-write short-circuit
        last_state: Option<StateData>,
    },
}

impl ModeState {
    fn for_mode(mode: CursorMode) -> Self {
        match mode {
            CursorMode::Write => ModeState::Write {
                last_mutation: None,
                last_state: None,
            },
            CursorMode::ReadForward => ModeState::Forward,
            CursorMode::ReadBidirectional => ModeState::Bidirectional {
                history: Vec::new(),
            },
        }
    }
}

#[derive(Debug)]
struct CursorInner {
    inited: bool,
    /// Whether `computed_state` matches the state at `desired`
    ready: bool,
    last_error: Option<Error>,
    /// The timestamp the caller asked for
    desired: Timestamp,
    /// The materialized state, when one exists
    computed_state: Option<StateData>,
    /// The timestamp `computed_state` corresponds to
    computed_at: Timestamp,
    /// Last snapshot at or before `desired`
    last_snapshot: Option<StreamEntry>,
    /// Prefetched first snapshot after `last_snapshot`
    next_snapshot: Option<StreamEntry>,
    /// Known rate config, used to skip pointless next-snapshot lookups
    rate: Option<RecordRate>,
    mode: ModeState,
}

/// A cursor at a given point on the stream timeline
///
/// Obtain one from [`Stream::build_cursor`](crate::stream::Stream::build_cursor),
/// then `init` it at a timestamp and read `state()`. All operations
/// serialize on an internal compute mutex, so a cursor can be shared
/// between threads; distinct cursors never block each other.
pub struct Cursor {
    storage: Arc<dyn StorageBackend>,
    kind: CursorMode,
    inner: Mutex<CursorInner>,
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_subscriber_id: AtomicU64,
}

impl Cursor {
    /// Create a cursor against a storage backend
    pub fn new(storage: Arc<dyn StorageBackend>, mode: CursorMode) -> Self {
        Self {
            storage,
            kind: mode,
            inner: Mutex::new(CursorInner {
                inited: false,
                ready: false,
                last_error: None,
                desired: Timestamp::EPOCH,
                computed_state: None,
                computed_at: Timestamp::EPOCH,
                last_snapshot: None,
                next_snapshot: None,
                rate: None,
                mode: ModeState::for_mode(mode),
            }),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CursorInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Lock("cursor state lock poisoned".to_string()))
    }

    /// Initialize the cursor at a timestamp and compute its state
    ///
    /// A write cursor ignores the timestamp and initializes at the current
    /// wall-clock time; an empty stream is not an error for it. Calling
    /// `init` twice is an error.
    pub fn init(&self, timestamp: Timestamp) -> Result<()> {
        {
            let mut inner = self.lock()?;
            if inner.inited {
                return Err(Error::AlreadyInitialized);
            }
            inner.inited = true;
            if self.kind.is_writer() {
                inner.ready = false;
                inner.desired = Timestamp::now();
            } else {
                Self::set_timestamp_locked(&mut inner, timestamp);
            }
        }
        self.compute_state()
    }

    /// Initialize a reader directly from a caller-provided snapshot entry
    ///
    /// No backend read is needed for the state itself; only the
    /// next-snapshot prefetch touches storage.
    pub fn init_with_snapshot(&self, snapshot: StreamEntry) -> Result<()> {
        if self.kind.is_writer() {
            return Err(Error::WrongMode(self.kind));
        }
        if snapshot.kind() != EntryKind::Snapshot {
            return Err(Error::InvalidState(
                "cannot initialize a cursor from a mutation entry".to_string(),
            ));
        }
        let mut inner = self.lock()?;
        if inner.inited {
            return Err(Error::AlreadyInitialized);
        }
        inner.inited = true;
        inner.desired = snapshot.timestamp;
        inner.last_snapshot = Some(snapshot);
        Self::copy_snapshot_state(&mut inner)?;
        self.fill_next_snapshot(&mut inner)?;
        inner.ready = true;
        inner.last_error = None;
        Ok(())
    }

    /// Let the cursor skip next-snapshot lookups that cannot succeed yet
    ///
    /// An invalid rate config clears the stored one instead of failing.
    pub fn set_rate(&self, rate: RecordRate) -> Result<()> {
        let mut inner = self.lock()?;
        inner.rate = rate.validate().ok().map(|_| rate);
        Ok(())
    }

    /// The computed state
    ///
    /// Errors with [`Error::NotReady`] until a successful `compute_state`.
    pub fn state(&self) -> Result<StateData> {
        let inner = self.lock()?;
        if !inner.ready {
            return Err(Error::NotReady);
        }
        inner.computed_state.clone().ok_or(Error::NotReady)
    }

    /// The timestamp the caller requested
    pub fn timestamp(&self) -> Result<Timestamp> {
        Ok(self.lock()?.desired)
    }

    /// The timestamp the computed state corresponds to
    pub fn computed_timestamp(&self) -> Result<Timestamp> {
        Ok(self.lock()?.computed_at)
    }

    /// The cursor's operating mode
    pub fn mode(&self) -> CursorMode {
        self.kind
    }

    /// Whether the computed state matches the desired timestamp
    ///
    /// Waits for any in-flight computation to finish.
    pub fn ready(&self) -> Result<bool> {
        Ok(self.lock()?.ready)
    }

    /// The error recorded by the last failed computation, if any
    pub fn last_error(&self) -> Result<Option<Error>> {
        Ok(self.lock()?.last_error.clone())
    }

    /// Force a recomputation on the next `compute_state`
    pub fn invalidate(&self) -> Result<()> {
        self.lock()?.ready = false;
        Ok(())
    }

    /// Move the desired timestamp of a reader
    ///
    /// A no-op on a write cursor, and on a ready cursor already at the
    /// requested timestamp. Otherwise clears `ready` and drops whichever
    /// caches the move invalidates: moving before the cached snapshot drops
    /// everything, and moving backward on a forward cursor drops the
    /// computed state (forward replay cannot reverse).
    pub fn set_timestamp(&self, timestamp: Timestamp) -> Result<()> {
        if self.kind.is_writer() {
            return Ok(());
        }
        let mut inner = self.lock()?;
        Self::set_timestamp_locked(&mut inner, timestamp);
        Ok(())
    }

    fn set_timestamp_locked(inner: &mut CursorInner, timestamp: Timestamp) {
        if inner.ready && inner.desired == timestamp {
            return;
        }
        inner.ready = false;
        inner.desired = timestamp;

        let snapshot_after_target = inner
            .last_snapshot
            .as_ref()
            .map_or(false, |snap| snap.timestamp > timestamp);
        if snapshot_after_target {
            // We moved before the cached enclosing snapshot; everything
            // derived from it must be refetched.
            inner.last_snapshot = None;
            inner.computed_state = None;
            if let ModeState::Bidirectional { history } = &mut inner.mode {
                history.clear();
            }
            return;
        }

        if inner.computed_state.is_some()
            && inner.computed_at > timestamp
            && matches!(inner.mode, ModeState::Forward)
        {
            // A forward cursor cannot rewind.
            inner.computed_state = None;
        }
    }

    /// Bring the cursor to `ready`, reading from storage as needed
    ///
    /// Idempotent when already ready. On failure the error is recorded and
    /// returned; retrying drives recovery.
    pub fn compute_state(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.ready {
            return Ok(());
        }

        match self.do_compute(&mut inner) {
            Ok(()) => {
                inner.ready = true;
                inner.last_error = None;
                inner.computed_at = inner.desired;
                Ok(())
            }
            Err(Error::NoData) if self.kind.is_writer() => {
                // An empty stream is where a writer starts, not an error.
                inner.ready = true;
                inner.last_error = None;
                inner.computed_state = Some(StateData::new());
                inner.computed_at = inner.desired;
                if let ModeState::Write {
                    last_mutation,
                    last_state,
                } = &mut inner.mode
                {
                    *last_mutation = None;
                    *last_state = None;
                }
                Ok(())
            }
            Err(err) => {
                inner.ready = false;
                inner.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn do_compute(&self, inner: &mut CursorInner) -> Result<()> {
        if inner.last_snapshot.is_none() {
            self.fill_last_snapshot(inner)?;
            self.fill_next_snapshot(inner)?;
        }
        let snapshot_ts = match inner.last_snapshot.as_ref() {
            Some(snapshot) => snapshot.timestamp,
            None => return Err(Error::InvalidState("snapshot missing after fetch".to_string())),
        };

        if inner.desired == snapshot_ts {
            Self::copy_snapshot_state(inner)?;
            inner.next_snapshot = None;
            return Ok(());
        }

        if inner.computed_state.is_some() {
            if inner.computed_at > inner.desired {
                return self.rewind(inner);
            }
            // Skip ahead through prefetched snapshots before replaying.
            let promotable = inner
                .next_snapshot
                .as_ref()
                .map_or(false, |next| next.timestamp <= inner.desired);
            if promotable {
                inner.last_snapshot = inner.next_snapshot.take();
                Self::copy_snapshot_state(inner)?;
                self.fill_next_snapshot(inner)?;
                let still_behind = inner
                    .next_snapshot
                    .as_ref()
                    .map_or(false, |next| next.timestamp <= inner.desired);
                if still_behind {
                    // More than one snapshot away; refetch around the
                    // target instead of walking there.
                    inner.last_snapshot = None;
                    inner.next_snapshot = None;
                    self.fill_last_snapshot(inner)?;
                    Self::copy_snapshot_state(inner)?;
                    self.fill_next_snapshot(inner)?;
                }
            }
            return self.fast_forward(inner);
        }

        Self::copy_snapshot_state(inner)?;
        self.fast_forward(inner)
    }

    /// Fetch the enclosing snapshot for the desired timestamp
    fn fill_last_snapshot(&self, inner: &mut CursorInner) -> Result<()> {
        let entry = self.storage.get_snapshot_before(inner.desired)?;
        let Some(entry) = entry else {
            return Err(Error::NoData);
        };
        if entry.kind() != EntryKind::Snapshot {
            warn!("storage returned a {} from a snapshot lookup", entry.kind());
            return Err(Error::BackendViolation(
                "get_snapshot_before returned a non-snapshot entry".to_string(),
            ));
        }
        if entry.timestamp > inner.desired {
            return Err(Error::BackendViolation(
                "get_snapshot_before returned an entry after the requested timestamp".to_string(),
            ));
        }
        inner.last_snapshot = Some(entry);
        Ok(())
    }

    /// Prefetch the first snapshot after the enclosing one
    ///
    /// Skipped when a known rate config proves no newer keyframe can exist
    /// yet.
    fn fill_next_snapshot(&self, inner: &mut CursorInner) -> Result<()> {
        let Some(last) = inner.last_snapshot.as_ref() else {
            inner.next_snapshot = None;
            return Ok(());
        };
        if let Some(rate) = inner.rate {
            let expected_next = last.timestamp.add_millis(rate.keyframe_frequency as i64);
            if expected_next > Timestamp::now() {
                inner.next_snapshot = None;
                return Ok(());
            }
        }
        let snapshot = self
            .storage
            .get_entry_after(last.timestamp, EntryFilter::Snapshot)?;
        if let Some(snapshot) = &snapshot {
            if snapshot.kind() != EntryKind::Snapshot {
                return Err(Error::BackendViolation(
                    "get_entry_after returned the wrong entry kind".to_string(),
                ));
            }
        }
        inner.next_snapshot = snapshot;
        Ok(())
    }

    /// Reset the computed state to the enclosing snapshot's state
    fn copy_snapshot_state(inner: &mut CursorInner) -> Result<()> {
        let Some(snapshot) = inner.last_snapshot.as_ref() else {
            return Err(Error::InvalidState(
                "no snapshot available to copy state from".to_string(),
            ));
        };
        let EntryData::Snapshot(state) = &snapshot.data else {
            return Err(Error::BackendViolation(
                "snapshot entry is missing a snapshot payload".to_string(),
            ));
        };
        let state = state.clone();
        inner.computed_at = snapshot.timestamp;
        match &mut inner.mode {
            ModeState::Forward => {}
            ModeState::Bidirectional { history } => history.clear(),
            ModeState::Write {
                last_mutation,
                last_state,
            } => {
                *last_mutation = None;
                *last_state = Some(state.clone());
            }
        }
        inner.computed_state = Some(state);
        Ok(())
    }

    /// Apply a mutation entry to the computed state
    ///
    /// A bidirectional reader records the inverse delta for later rewinds;
    /// a writer remembers the mutation and its pre-state for amendments.
    fn apply_mutation(&self, inner: &mut CursorInner, entry: &StreamEntry) -> Result<()> {
        let EntryData::Mutation(delta) = &entry.data else {
            return Err(Error::InvalidState(
                "cannot apply a snapshot entry as a mutation".to_string(),
            ));
        };
        let Some(before) = inner.computed_state.as_ref() else {
            return Err(Error::InvalidState(
                "no computed state to apply a mutation to".to_string(),
            ));
        };
        let after = delta.apply(before)?;
        match &mut inner.mode {
            ModeState::Forward => {}
            ModeState::Bidirectional { history } => {
                let inverse = Delta::build(&after, before);
                history.push(StreamEntry::mutation(entry.timestamp, inverse));
            }
            ModeState::Write {
                last_mutation,
                last_state,
            } => {
                *last_state = Some(before.clone());
                *last_mutation = Some(entry.clone());
            }
        }
        inner.computed_at = entry.timestamp;
        inner.computed_state = Some(after);
        Ok(())
    }

    /// Replay entries forward until the desired timestamp or stream end
    fn fast_forward(&self, inner: &mut CursorInner) -> Result<()> {
        let result = self.fast_forward_inner(inner);
        if result.is_err() {
            // The state may be mid-transition; recompute from scratch next
            // time.
            inner.computed_state = None;
        }
        result
    }

    fn fast_forward_inner(&self, inner: &mut CursorInner) -> Result<()> {
        while inner.computed_at < inner.desired {
            let Some(entry) = self
                .storage
                .get_entry_after(inner.computed_at, EntryFilter::Any)?
            else {
                // Caught up with the stream end.
                break;
            };
            if entry.timestamp <= inner.computed_at {
                return Err(Error::BackendViolation(
                    "get_entry_after returned an entry at or before the requested timestamp"
                        .to_string(),
                ));
            }
            if entry.timestamp > inner.desired {
                if entry.kind() == EntryKind::Snapshot {
                    inner.next_snapshot = Some(entry);
                }
                break;
            }
            self.emit_entry(&entry);
            match entry.kind() {
                EntryKind::Mutation => self.apply_mutation(inner, &entry)?,
                EntryKind::Snapshot => {
                    debug!("fast-forward adopting snapshot at {}", entry.timestamp);
                    inner.last_snapshot = Some(entry);
                    inner.next_snapshot = None;
                    Self::copy_snapshot_state(inner)?;
                    self.fill_next_snapshot(inner)?;
                }
            }
        }
        Ok(())
    }

    /// Replay inverse deltas backward until the desired timestamp
    fn rewind(&self, inner: &mut CursorInner) -> Result<()> {
        let result = Self::rewind_inner(inner);
        if result.is_err() {
            inner.computed_state = None;
        }
        result
    }

    fn rewind_inner(inner: &mut CursorInner) -> Result<()> {
        let desired = inner.desired;

        let (history_empty, first_ts, last_ts) = match &inner.mode {
            ModeState::Bidirectional { history } => (
                history.is_empty(),
                history.first().map(|entry| entry.timestamp),
                history.last().map(|entry| entry.timestamp),
            ),
            // Modes without history can only fall back to the snapshot.
            _ => (true, None, None),
        };

        if history_empty || first_ts.map_or(false, |ts| ts > desired) {
            return Self::copy_snapshot_state(inner);
        }
        if last_ts.map_or(false, |ts| ts < desired) {
            // Already strictly before the target; nothing to undo.
            return Ok(());
        }

        loop {
            // The history and the computed state live in different fields,
            // so both can be borrowed at once.
            let CursorInner {
                mode,
                computed_state,
                ..
            } = inner;
            let ModeState::Bidirectional { history } = mode else {
                break;
            };
            let Some(entry) = history.last() else {
                break;
            };
            if entry.timestamp < desired {
                return Ok(());
            }
            let EntryData::Mutation(inverse) = &entry.data else {
                return Err(Error::InvalidState(
                    "rewind history holds a non-mutation entry".to_string(),
                ));
            };
            let Some(state) = computed_state.as_ref() else {
                return Err(Error::InvalidState(
                    "no computed state to rewind".to_string(),
                ));
            };
            let rewound = inverse.apply(state)?;
            *computed_state = Some(rewound);
            history.pop();
        }

        // Every recorded mutation was undone; re-seed from the snapshot for
        // a clean baseline.
        Self::copy_snapshot_state(inner)
    }

    // -------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------

    fn check_writer_ready(&self, inner: &CursorInner) -> Result<()> {
        if !self.kind.is_writer() {
            return Err(Error::WrongMode(self.kind));
        }
        if !inner.ready {
            return Err(Error::NotReady);
        }
        Ok(())
    }

    /// Incorporate an already-persisted entry into writer state
    ///
    /// Keeps a writer current when some other component stored the entry.
    /// Nothing is persisted here.
    pub fn handle_entry(&self, entry: StreamEntry) -> Result<()> {
        let mut inner = self.lock()?;
        self.check_writer_ready(&inner)?;
        if entry.timestamp < inner.computed_at {
            return Err(Error::OutOfOrder);
        }
        match entry.kind() {
            EntryKind::Snapshot => {
                inner.last_snapshot = Some(entry.clone());
                Self::copy_snapshot_state(&mut inner)?;
            }
            EntryKind::Mutation => self.apply_mutation(&mut inner, &entry)?,
        }
        self.emit_entry(&entry);
        Ok(())
    }

    /// Record a new document state at `timestamp`
    ///
    /// Decides the storage shape: an amendment of the last mutation when
    /// the change arrives faster than `rate.change_frequency`, a fresh
    /// snapshot when there is no prior state or the last keyframe is older
    /// than `rate.keyframe_frequency`, and a new mutation otherwise.
    /// Writing a state structurally equal to the last recorded one touches
    /// nothing.
    pub fn write_state(
        &self,
        timestamp: Timestamp,
        state: StateData,
        rate: &RecordRate,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        self.check_writer_ready(&inner)?;

        {
            let ModeState::Write { last_state, .. } = &inner.mode else {
                return Err(Error::WrongMode(self.kind));
            };
            if last_state.as_ref() == Some(&state) {
                debug!("skipping write of unchanged state at {}", timestamp);
                return Ok(());
            }
        }

        let last_mutation_ts = match &inner.mode {
            ModeState::Write { last_mutation, .. } => {
                last_mutation.as_ref().map(|entry| entry.timestamp)
            }
            _ => None,
        };
        let last_change =
            last_mutation_ts.or_else(|| inner.last_snapshot.as_ref().map(|snap| snap.timestamp));
        if let Some(change_ts) = last_change {
            if timestamp < change_ts {
                return Err(Error::OutOfOrder);
            }
        }

        // Amend: the change is too close to the last mutation, so rewrite
        // that mutation in place instead of appending.
        if let Some(mutation_ts) = last_mutation_ts {
            if timestamp.millis_since(mutation_ts) < rate.change_frequency as i64 {
                let delta = {
                    let ModeState::Write {
                        last_state: Some(base),
                        ..
                    } = &inner.mode
                    else {
                        return Err(Error::InvalidState(
                            "amendment without a recorded pre-state".to_string(),
                        ));
                    };
                    Delta::build(base, &state)
                };
                let amended = StreamEntry::mutation(mutation_ts, delta.clone());
                self.storage.amend_entry(amended.clone(), mutation_ts)?;
                if let ModeState::Write { last_mutation, .. } = &mut inner.mode {
                    *last_mutation = Some(amended);
                }
                inner.computed_state = Some(state);
                inner.computed_at = timestamp;
                debug!("amended mutation at {} with change at {}", mutation_ts, timestamp);
                self.emit_entry(&StreamEntry::mutation(timestamp, delta));
                return Ok(());
            }
        }

        // Snapshot: first write ever, or the last keyframe is stale.
        let no_prior_state = match &inner.mode {
            ModeState::Write { last_state, .. } => last_state.is_none(),
            _ => false,
        };
        let keyframe_due = inner.last_snapshot.as_ref().map_or(true, |snap| {
            timestamp.millis_since(snap.timestamp) >= rate.keyframe_frequency as i64
        });
        if no_prior_state || keyframe_due {
            let entry = StreamEntry::snapshot(timestamp, state);
            self.storage.save_entry(entry.clone())?;
            inner.last_snapshot = Some(entry.clone());
            if let Err(err) = Self::copy_snapshot_state(&mut inner) {
                inner.ready = false;
                inner.computed_state = None;
                return Err(err);
            }
            debug!("wrote snapshot at {}", timestamp);
            self.emit_entry(&entry);
            return Ok(());
        }

        // Mutation: append a delta from the last recorded state.
        let pre_state = inner.computed_state.clone().ok_or_else(|| {
            Error::InvalidState("no computed state to build a mutation from".to_string())
        })?;
        let delta = {
            let ModeState::Write {
                last_state: Some(base),
                ..
            } = &inner.mode
            else {
                return Err(Error::InvalidState(
                    "mutation write without a recorded pre-state".to_string(),
                ));
            };
            Delta::build(base, &state)
        };
        let entry = StreamEntry::mutation(timestamp, delta);
        self.storage.save_entry(entry.clone())?;
        if let ModeState::Write {
            last_mutation,
            last_state,
        } = &mut inner.mode
        {
            *last_mutation = Some(entry.clone());
            *last_state = Some(pre_state);
        }
        inner.computed_state = Some(state);
        inner.computed_at = timestamp;
        debug!("wrote mutation at {}", timestamp);
        self.emit_entry(&entry);
        Ok(())
    }

    /// Record a pre-formed entry
    ///
    /// A snapshot is written as the new state wholesale; a mutation's delta
    /// is applied to the current state first, so the decision tree of
    /// [`write_state`](Cursor::write_state) still chooses the persisted
    /// shape.
    pub fn write_entry(&self, entry: StreamEntry, rate: &RecordRate) -> Result<()> {
        match entry.data {
            EntryData::Snapshot(state) => self.write_state(entry.timestamp, state, rate),
            EntryData::Mutation(delta) => {
                let current = self.state()?;
                let next = delta.apply(&current)?;
                self.write_state(entry.timestamp, next, rate)
            }
        }
    }

    // -------------------------------------------------------------------
    // Entry subscriptions
    // -------------------------------------------------------------------

    /// Observe the entries that flow through this cursor
    ///
    /// Fast-forward replay, writes and handled entries are all reported.
    /// Delivery is send-if-space; a full channel misses entries rather than
    /// blocking the cursor.
    pub fn subscribe_entries(&self, sender: Sender<StreamEntry>) -> Result<EntrySubscription> {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| Error::Lock("cursor subscribers lock poisoned".to_string()))?;
        subscribers.insert(id, sender);
        Ok(EntrySubscription::new(id, Arc::downgrade(&self.subscribers)))
    }

    fn emit_entry(&self, entry: &StreamEntry) {
        let Ok(subscribers) = self.subscribers.lock() else {
            return;
        };
        for (id, sender) in subscribers.iter() {
            if sender.try_send(entry.clone()).is_err() {
                debug!("dropping entry at {} for subscriber {}", entry.timestamp, id);
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("mode", &self.kind).finish()
    }
}
