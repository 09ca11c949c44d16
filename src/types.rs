//! Typed handles into the flat tree store.
//!
//! Leaves, external leaves and cells are all addressed by plain `u32`
//! indices wrapped in newtypes so they cannot be mixed up. The maximum
//! value of the underlying integer is reserved as the invalid sentinel.

use std::fmt;

use bitflags::bitflags;

/// Application-side particle identifier carried through sorting.
///
/// Keys are opaque to the tree; they are handed in by the
/// [`Initialiser`](crate::init::Initialiser) and handed back unchanged.
pub type ParticleKey = u32;

/// Sentinel key for slots that do not refer to a particle.
pub const INVALID_KEY: ParticleKey = u32::MAX;

bitflags! {
  /// Which per-particle properties a build (or interaction layer) loads.
  #[derive(Clone, Copy, Debug, PartialEq, Eq)]
  pub struct Props: u32 {
    /// Per-leaf time-step rungs and activity flags
    const RUNG = 1 << 0;
    /// Per-leaf masses
    const MASS = 1 << 1;
    /// Per-leaf squared interaction sizes
    const SIZE_SQ = 1 << 2;
  }
}

/// Handle to an internal leaf (a particle inside the tree).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Leaf(pub u32);

/// Handle to an external leaf (a particle outside the tree proper,
/// e.g. belonging to a coupled second species).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ExtLeaf(pub u32);

/// Handle to a cell of the finished tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CellId(pub u32);

impl Leaf {
  /// Sentinel for "no leaf".
  pub const INVALID: Leaf = Leaf(u32::MAX);

  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }

  #[inline]
  pub fn is_invalid(self) -> bool {
    self.0 == u32::MAX
  }
}

impl ExtLeaf {
  /// Sentinel for "no external leaf".
  pub const INVALID: ExtLeaf = ExtLeaf(u32::MAX);

  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }

  #[inline]
  pub fn is_invalid(self) -> bool {
    self.0 == u32::MAX
  }
}

impl CellId {
  /// Sentinel for "no cell".
  pub const INVALID: CellId = CellId(u32::MAX);

  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }

  #[inline]
  pub fn is_invalid(self) -> bool {
    self.0 == u32::MAX
  }
}

impl fmt::Display for Leaf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_invalid() {
      write!(f, "L.invalid")
    } else {
      write!(f, "L.{:07}", self.0)
    }
  }
}

impl fmt::Display for ExtLeaf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_invalid() {
      write!(f, "E.invalid")
    } else {
      write!(f, "E.{:03}", self.0)
    }
  }
}

impl fmt::Display for CellId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_invalid() {
      write!(f, "C.invalid")
    } else {
      write!(f, "C.{:07}", self.0)
    }
  }
}

/// Half-open range of leaf indices `[begin, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LeafRange {
  pub begin: u32,
  pub end: u32,
}

impl LeafRange {
  pub fn new(begin: u32, end: u32) -> Self {
    debug_assert!(begin <= end);
    Self { begin, end }
  }

  #[inline]
  pub fn len(&self) -> u32 {
    self.end - self.begin
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.begin == self.end
  }

  #[inline]
  pub fn contains(&self, l: Leaf) -> bool {
    self.begin <= l.0 && l.0 < self.end
  }

  /// Iterate leaves in index order.
  pub fn iter(&self) -> impl DoubleEndedIterator<Item = Leaf> {
    (self.begin..self.end).map(Leaf)
  }
}

/// Half-open range of cell indices `[begin, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CellRange {
  pub begin: u32,
  pub end: u32,
}

impl CellRange {
  pub fn new(begin: u32, end: u32) -> Self {
    debug_assert!(begin <= end);
    Self { begin, end }
  }

  #[inline]
  pub fn len(&self) -> u32 {
    self.end - self.begin
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.begin == self.end
  }

  #[inline]
  pub fn contains(&self, c: CellId) -> bool {
    self.begin <= c.0 && c.0 < self.end
  }

  /// Iterate cells in index order, i.e. parents before daughters.
  pub fn iter(&self) -> impl DoubleEndedIterator<Item = CellId> {
    (self.begin..self.end).map(CellId)
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
