//! Flat-array index bookkeeping.
//!
//! Every repeated child kind (tracks, secondary vertices, subjets, ...) is
//! stored as one contiguous column per jet collection. [`FlatLayout`] owns
//! the running counter for each kind and hands out `(first, last)` ranges so
//! a parent's children can be recovered as `column[first..last]`.
//!
//! # Invariants
//!
//! - counters start at zero after [`FlatLayout::reset`] and never decrease
//! - every [`FlatLayout::append`] lands on exactly the slot the counter names
//! - `last` of one parent equals `first` of the next parent of the same kind
//!
//! # Example
//!
//! ```
//! use jet_ntuplizer::layout::{ChildKind, FlatLayout};
//!
//! let mut layout = FlatLayout::new();
//! let mut tracks: Vec<f32> = Vec::new();
//!
//! layout.begin_range(ChildKind::Track);
//! layout.append(ChildKind::Track, &mut tracks, 1.0).unwrap();
//! layout.append(ChildKind::Track, &mut tracks, 2.0).unwrap();
//! let first_jet = layout.close_range(ChildKind::Track);
//!
//! layout.begin_range(ChildKind::Track);
//! layout.append(ChildKind::Track, &mut tracks, 3.0).unwrap();
//! let second_jet = layout.close_range(ChildKind::Track);
//!
//! assert_eq!((first_jet.first, first_jet.last), (0, 2));
//! assert_eq!((second_jet.first, second_jet.last), (2, 3));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NtupleError, Result};

/// The closed set of flattened child kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKind {
    Track,
    SecondaryVertex,
    SubJet,
    PfMuon,
    PfElectron,
    TrackTagVar,
    SvTagVar,
    CsvTrackTagVar,
    CsvTrackEtaRelTagVar,
}

impl ChildKind {
    /// Number of child kinds.
    pub const COUNT: usize = 9;

    /// All kinds in storage order.
    pub const ALL: [ChildKind; Self::COUNT] = [
        ChildKind::Track,
        ChildKind::SecondaryVertex,
        ChildKind::SubJet,
        ChildKind::PfMuon,
        ChildKind::PfElectron,
        ChildKind::TrackTagVar,
        ChildKind::SvTagVar,
        ChildKind::CsvTrackTagVar,
        ChildKind::CsvTrackEtaRelTagVar,
    ];

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }

    /// Column-name stem used in the output schema.
    pub fn name(&self) -> &'static str {
        match self {
            ChildKind::Track => "Track",
            ChildKind::SecondaryVertex => "SV",
            ChildKind::SubJet => "SubJet",
            ChildKind::PfMuon => "PFMuon",
            ChildKind::PfElectron => "PFElectron",
            ChildKind::TrackTagVar => "TrkTagVar",
            ChildKind::SvTagVar => "SVTagVar",
            ChildKind::CsvTrackTagVar => "TrkTagVarCSV",
            ChildKind::CsvTrackEtaRelTagVar => "TrkEtaRelTagVarCSV",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Half-open index range `[first, last)` into a flat column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexRange {
    pub first: u32,
    pub last: u32,
}

impl IndexRange {
    pub const fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// An empty range positioned at `at`.
    pub const fn empty_at(at: u32) -> Self {
        Self::new(at, at)
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.last - self.first) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// As a `usize` range for slicing a column.
    #[inline]
    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.first as usize..self.last as usize
    }
}

/// Per-kind running counters for one jet collection in one event.
#[derive(Debug, Clone)]
pub struct FlatLayout {
    counters: [u32; ChildKind::COUNT],
    open: [Option<u32>; ChildKind::COUNT],
    capacity: Option<usize>,
}

impl FlatLayout {
    /// A layout backed by growable columns.
    pub fn new() -> Self {
        Self {
            counters: [0; ChildKind::COUNT],
            open: [None; ChildKind::COUNT],
            capacity: None,
        }
    }

    /// A layout whose columns may hold at most `capacity` entries per kind.
    ///
    /// Exceeding it is fatal: [`append`](Self::append) returns
    /// [`NtupleError::CapacityExceeded`] instead of truncating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Fixed capacity per kind, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Zero all counters. Called at the start of every collection pass.
    pub fn reset(&mut self) {
        self.counters = [0; ChildKind::COUNT];
        self.open = [None; ChildKind::COUNT];
    }

    /// Current counter value for `kind`.
    #[inline]
    pub fn count(&self, kind: ChildKind) -> u32 {
        self.counters[kind.slot()]
    }

    /// Open a parent's range and return its first index.
    pub fn begin_range(&mut self, kind: ChildKind) -> u32 {
        let first = self.counters[kind.slot()];
        self.open[kind.slot()] = Some(first);
        first
    }

    /// Store `value` at the next slot of `column` and advance the counter.
    ///
    /// Returns the slot index the value was written to.
    pub fn append<T>(&mut self, kind: ChildKind, column: &mut Vec<T>, value: T) -> Result<u32> {
        let slot = self.counters[kind.slot()];
        debug_assert_eq!(
            column.len(),
            slot as usize,
            "{kind} column out of step with its counter"
        );

        if let Some(capacity) = self.capacity {
            if slot as usize >= capacity {
                log::error!("{kind} capacity of {capacity} exhausted");
                return Err(NtupleError::CapacityExceeded { kind, capacity });
            }
        }

        column.push(value);
        self.counters[kind.slot()] = slot + 1;
        Ok(slot)
    }

    /// Return the counter value that closes the open range.
    pub fn end_range(&mut self, kind: ChildKind) -> u32 {
        self.open[kind.slot()] = None;
        self.counters[kind.slot()]
    }

    /// Close the open range and return it.
    ///
    /// A range that was never opened comes back empty at the current counter.
    pub fn close_range(&mut self, kind: ChildKind) -> IndexRange {
        let first = self.open[kind.slot()].unwrap_or(self.counters[kind.slot()]);
        let last = self.end_range(kind);
        IndexRange::new(first, last)
    }

    /// An empty range at the current counter, for parents with no children.
    pub fn empty_range(&self, kind: ChildKind) -> IndexRange {
        IndexRange::empty_at(self.counters[kind.slot()])
    }
}

impl Default for FlatLayout {
    fn default() -> Self {
        Self::new()
    }
}
