//! Undo/redo history over immutable session snapshots.
//!
//! Every edit produces a new [`SessionSnapshot`]; nothing already pushed is
//! ever modified. Snapshots live in an arena keyed by [`SnapshotId`], and the
//! undo deque and redo stack hold ids into it. The arena contains exactly the
//! current snapshot plus everything reachable through undo or redo.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::compose::Styling;
use crate::layout::LayoutSpec;
use crate::planner::ExtractionPlan;

/// Default number of undo steps kept.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Identity of a snapshot. Ids increase monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// Raw id value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "#{}", self.0)
    }
}

/// One complete, immutable session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Identity of this snapshot.
    pub id: SnapshotId,
    /// Frame selection.
    pub plan: Arc<ExtractionPlan>,
    /// Geometry parameters.
    pub layout: Arc<LayoutSpec>,
    /// Visual parameters.
    pub styling: Arc<Styling>,
    /// Per-slot timestamps chosen by scrubbing.
    pub overrides: Arc<BTreeMap<usize, Duration>>,
}

impl SessionSnapshot {
    /// Timestamp override for `slot`, if it was scrubbed.
    pub fn override_for(&self, slot: usize) -> Option<Duration> {
        self.overrides.get(&slot).copied()
    }
}

/// An edit that replaces one part of the session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    /// New frame selection. Drops all scrub overrides, since slot numbers
    /// no longer refer to the same frames.
    Plan(ExtractionPlan),
    /// New geometry parameters.
    Layout(LayoutSpec),
    /// New visual parameters.
    Styling(Styling),
}

impl SessionChange {
    /// `true` when the change invalidates extracted frames.
    pub fn requires_extraction(&self) -> bool {
        matches!(self, SessionChange::Plan(_))
    }
}

/// Snapshot arena with bounded undo and redo.
#[derive(Debug)]
pub struct StateManager {
    arena: BTreeMap<SnapshotId, Arc<SessionSnapshot>>,
    undo: VecDeque<SnapshotId>,
    redo: Vec<SnapshotId>,
    current: SnapshotId,
    next_id: u64,
    max_history: usize,
}

impl StateManager {
    /// Start a history whose first snapshot holds the given state.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use movieprint::{
    ///     ExtractionPlan, GridShape, IntervalStep, LayoutSpec, StateManager, Styling,
    /// };
    ///
    /// let plan = ExtractionPlan::interval(IntervalStep::Seconds(Duration::from_secs(5)));
    /// let mut history = StateManager::new(
    ///     plan,
    ///     LayoutSpec::grid(GridShape::Columns(4)),
    ///     Styling::default(),
    /// );
    /// history.scrub(2, Duration::from_secs(7));
    /// assert_eq!(history.current().override_for(2), Some(Duration::from_secs(7)));
    ///
    /// history.undo();
    /// assert!(history.current().overrides.is_empty());
    /// ```
    pub fn new(plan: ExtractionPlan, layout: LayoutSpec, styling: Styling) -> Self {
        let initial = SessionSnapshot {
            id: SnapshotId(0),
            plan: Arc::new(plan),
            layout: Arc::new(layout),
            styling: Arc::new(styling),
            overrides: Arc::new(BTreeMap::new()),
        };
        let mut arena = BTreeMap::new();
        arena.insert(initial.id, Arc::new(initial));
        Self {
            arena,
            undo: VecDeque::new(),
            redo: Vec::new(),
            current: SnapshotId(0),
            next_id: 1,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Limit the undo depth. Clamped to at least 1; excess entries are
    /// evicted oldest first.
    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history.max(1);
        self.evict();
        self
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<SessionSnapshot> {
        // The arena always holds the current id.
        Arc::clone(&self.arena[&self.current])
    }

    /// Id of the current snapshot.
    pub fn current_id(&self) -> SnapshotId {
        self.current
    }

    /// `true` when `id` is the current snapshot.
    pub fn is_current(&self, id: SnapshotId) -> bool {
        self.current == id
    }

    /// Look up a snapshot still held by the history.
    pub fn snapshot(&self, id: SnapshotId) -> Option<Arc<SessionSnapshot>> {
        self.arena.get(&id).cloned()
    }

    /// Replace one part of the state. Clears the redo stack.
    pub fn apply(&mut self, change: SessionChange) -> SnapshotId {
        let current = self.current();
        let mut next = SessionSnapshot {
            id: current.id,
            plan: Arc::clone(&current.plan),
            layout: Arc::clone(&current.layout),
            styling: Arc::clone(&current.styling),
            overrides: Arc::clone(&current.overrides),
        };
        match change {
            SessionChange::Plan(plan) => {
                next.plan = Arc::new(plan);
                next.overrides = Arc::new(BTreeMap::new());
            }
            SessionChange::Layout(layout) => next.layout = Arc::new(layout),
            SessionChange::Styling(styling) => next.styling = Arc::new(styling),
        }
        self.push(next)
    }

    /// Record that `slot` now shows the frame at `timestamp`.
    ///
    /// Slot validity is the caller's concern; the history stores any index.
    pub fn scrub(&mut self, slot: usize, timestamp: Duration) -> SnapshotId {
        let current = self.current();
        let mut overrides = (*current.overrides).clone();
        overrides.insert(slot, timestamp);
        let next = SessionSnapshot {
            id: current.id,
            plan: Arc::clone(&current.plan),
            layout: Arc::clone(&current.layout),
            styling: Arc::clone(&current.styling),
            overrides: Arc::new(overrides),
        };
        self.push(next)
    }

    /// Step back one snapshot. Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Arc<SessionSnapshot>> {
        let previous = self.undo.pop_back()?;
        self.redo.push(self.current);
        self.current = previous;
        log::debug!("Undo to snapshot {previous}");
        Some(self.current())
    }

    /// Re-apply the most recently undone snapshot.
    pub fn redo(&mut self) -> Option<Arc<SessionSnapshot>> {
        let next = self.redo.pop()?;
        self.undo.push_back(self.current);
        self.current = next;
        log::debug!("Redo to snapshot {next}");
        Some(self.current())
    }

    /// `true` when [`undo`](StateManager::undo) would succeed.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// `true` when [`redo`](StateManager::redo) would succeed.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of snapshots reachable through undo.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of snapshots reachable through redo.
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    fn push(&mut self, mut snapshot: SessionSnapshot) -> SnapshotId {
        let id = SnapshotId(self.next_id);
        self.next_id += 1;
        snapshot.id = id;

        for discarded in self.redo.drain(..) {
            self.arena.remove(&discarded);
        }
        self.undo.push_back(self.current);
        self.arena.insert(id, Arc::new(snapshot));
        self.current = id;
        self.evict();
        id
    }

    fn evict(&mut self) {
        while self.undo.len() > self.max_history {
            if let Some(oldest) = self.undo.pop_front() {
                self.arena.remove(&oldest);
            }
        }
    }
}
