//! Per-leaf interaction data layered over a finished tree.
//!
//! Masses and squared interaction sizes are stored in arrays padded to
//! the tree's block size, so interaction kernels can always read a full
//! aligned block around any leaf; padding slots are zero.

use tracing::debug;

use crate::geometry::Point;
use crate::init::PropertyInitialiser;
use crate::tree::OctTree;
use crate::types::{ExtLeaf, Leaf, Props};

/// Leaf-indexed interaction properties, allocated per [`Props`] flag.
pub struct InteractionData {
  block_size: u32,
  loaded: Props,
  mass: Vec<f64>,
  size_sq: Vec<f64>,
  ext_mass: Vec<f64>,
  ext_size_sq: Vec<f64>,
}

/// Length of `n` slots padded up to whole blocks of `bs`.
fn padded(n: u32, bs: u32) -> usize {
  (n as usize).next_multiple_of(bs as usize)
}

impl InteractionData {
  /// Pull the properties selected by `load` through the initialiser,
  /// keyed by the tree's leaf order.
  pub fn build<P: Point>(
    tree: &OctTree<P>,
    init: &dyn PropertyInitialiser,
    load: Props,
  ) -> Self {
    let bs = tree.block_size();
    let n = tree.n_leaf();
    let n_ext = tree.n_ext();
    let mut data = Self {
      block_size: bs,
      loaded: load & (Props::MASS | Props::SIZE_SQ),
      mass: Vec::new(),
      size_sq: Vec::new(),
      ext_mass: Vec::new(),
      ext_size_sq: Vec::new(),
    };
    if load.contains(Props::MASS) {
      data.mass = vec![0.0; padded(n, bs)];
      init.init_mass(tree.leaf_keys(), &mut data.mass[..n as usize]);
      data.ext_mass = vec![0.0; padded(n_ext, bs)];
      if n_ext > 0 {
        init.init_mass(tree.ext_keys(), &mut data.ext_mass[..n_ext as usize]);
      }
    }
    if load.contains(Props::SIZE_SQ) {
      data.size_sq = vec![0.0; padded(n, bs)];
      init.init_size_sq(tree.leaf_keys(), &mut data.size_sq[..n as usize]);
      data.ext_size_sq = vec![0.0; padded(n_ext, bs)];
      if n_ext > 0 {
        init.init_size_sq(tree.ext_keys(), &mut data.ext_size_sq[..n_ext as usize]);
      }
    }
    debug!(
      n,
      n_ext,
      mass = data.have_mass(),
      size_sq = data.have_size_sq(),
      "interaction data loaded"
    );
    data
  }

  pub fn have_mass(&self) -> bool {
    self.loaded.contains(Props::MASS)
  }

  pub fn have_size_sq(&self) -> bool {
    self.loaded.contains(Props::SIZE_SQ)
  }

  pub fn block_size(&self) -> u32 {
    self.block_size
  }

  pub fn mass(&self, l: Leaf) -> f64 {
    self.mass[l.index()]
  }

  pub fn size_sq(&self, l: Leaf) -> f64 {
    self.size_sq[l.index()]
  }

  pub fn ext_mass(&self, e: ExtLeaf) -> f64 {
    self.ext_mass[e.index()]
  }

  pub fn ext_size_sq(&self, e: ExtLeaf) -> f64 {
    self.ext_size_sq[e.index()]
  }

  /// The aligned block of masses containing leaf `l`; padding slots at
  /// the tail are zero.
  pub fn mass_block(&self, l: Leaf) -> &[f64] {
    debug_assert!(self.have_mass(), "masses were not loaded");
    let bs = self.block_size as usize;
    let start = l.index() & !(bs - 1);
    &self.mass[start..start + bs]
  }

  /// The aligned block of squared sizes containing leaf `l`.
  pub fn size_sq_block(&self, l: Leaf) -> &[f64] {
    debug_assert!(self.have_size_sq(), "squared sizes were not loaded");
    let bs = self.block_size as usize;
    let start = l.index() & !(bs - 1);
    &self.size_sq[start..start + bs]
  }
}

#[cfg(test)]
#[path = "interact_test.rs"]
mod interact_test;
