//! Traversal engine: upward passes, downward loops and pruned walks.
//!
//! Cell indices order parents before daughters globally, in both the
//! serial and the domain-parallel layout. Upward passes therefore sweep
//! the cell range in reverse; downward loops sweep it forward.
//!
//! [`pass_up_par`] runs the per-domain cell blocks on the rayon pool,
//! with each task confined to its own disjoint slice of the value
//! array, and finishes with a single-threaded pass over the shared top
//! cells, mirroring how the tree itself is linked.

use rayon::prelude::*;

use crate::geometry::Point;
use crate::tree::OctTree;
use crate::types::{CellId, ExtLeaf, Leaf, LeafRange};

/// Combiner for an upward pass: computes one `Value` per cell from the
/// cell's leaf kids and its daughters' values.
pub trait PassUp<P: Point>: Sync {
  type Value: Default + Send;

  /// Seed a cell value from its first leaf kid.
  fn from_leaf(&self, tree: &OctTree<P>, l: Leaf) -> Self::Value;

  /// Merge a further leaf kid into the running value.
  fn merge_leaf(&self, tree: &OctTree<P>, v: &mut Self::Value, l: Leaf);

  /// Seed a cell value from its first daughter when there are no leaf
  /// kids.
  fn from_cell(&self, tree: &OctTree<P>, d: CellId, dv: &Self::Value) -> Self::Value;

  /// Merge a further daughter into the running value.
  fn merge_cell(&self, tree: &OctTree<P>, v: &mut Self::Value, d: CellId, dv: &Self::Value);

  /// Called once after every cell value is in place.
  fn finish(&self, _tree: &OctTree<P>, _values: &mut [Self::Value]) {}
}

/// Compute the value of one cell from values already present for its
/// daughters. `base` is the cell index of `vals[0]`.
fn pass_one<P: Point, U: PassUp<P>>(
  tree: &OctTree<P>,
  pu: &U,
  vals: &mut [U::Value],
  base: u32,
  c: CellId,
) {
  let kids = tree.leaf_kids(c);
  let ds = tree.daughters(c);

  let mut it = kids.iter();
  let seeded_by_cell = kids.is_empty() && !ds.is_empty();
  let mut v = match it.next() {
    Some(first) => {
      let mut v = pu.from_leaf(tree, first);
      for l in it {
        pu.merge_leaf(tree, &mut v, l);
      }
      v
    }
    None => match ds.iter().next() {
      Some(d0) => pu.from_cell(tree, d0, &vals[(d0.0 - base) as usize]),
      // an empty tree's bare root
      None => U::Value::default(),
    },
  };
  for d in ds.iter().skip(seeded_by_cell as usize) {
    let dv = &vals[(d.0 - base) as usize];
    pu.merge_cell(tree, &mut v, d, dv);
  }
  vals[(c.0 - base) as usize] = v;
}

/// Serial upward pass over all cells. `values` must hold one slot per
/// cell; slots are overwritten in children-before-parents order.
pub fn pass_up<P: Point, U: PassUp<P>>(tree: &OctTree<P>, pu: &U, values: &mut [U::Value]) {
  assert_eq!(values.len(), tree.n_cell() as usize);
  for c in tree.cells().iter().rev() {
    pass_one(tree, pu, values, 0, c);
  }
  pu.finish(tree, values);
}

/// Parallel upward pass: domain blocks on the pool, then the shared top
/// cells on the calling thread. Results are identical to [`pass_up`].
pub fn pass_up_par<P: Point, U: PassUp<P>>(tree: &OctTree<P>, pu: &U, values: &mut [U::Value]) {
  assert_eq!(values.len(), tree.n_cell() as usize);
  let n_top = tree.n_top_cell();
  if n_top == 0 {
    return pass_up(tree, pu, values);
  }

  {
    let (_, mut rest) = values.split_at_mut(n_top as usize);
    rayon::scope(|s| {
      for d in tree.domains() {
        let cells = d.cells();
        let (block, tail) = rest.split_at_mut(cells.len() as usize);
        rest = tail;
        s.spawn(move |_| {
          for c in cells.iter().rev() {
            pass_one(tree, pu, block, cells.begin, c);
          }
        });
      }
    });
  }

  // branch values are in place now; top daughters always carry larger
  // indices, so reverse order sees them first
  for c in (0..n_top).rev() {
    pass_one(tree, pu, values, 0, CellId(c));
  }
  pu.finish(tree, values);
}

/// Call `f` for every cell, parents before daughters.
pub fn loop_cells_down<P: Point>(tree: &OctTree<P>, mut f: impl FnMut(CellId)) {
  for c in tree.cells().iter() {
    f(c);
  }
}

/// Call `f` for every cell, daughters before parents.
pub fn loop_cells_up<P: Point>(tree: &OctTree<P>, mut f: impl FnMut(CellId)) {
  for c in tree.cells().iter().rev() {
    f(c);
  }
}

/// Parallel downward loop: the shared top cells on the calling thread,
/// then every domain block as one pool task. Within a domain, and from
/// the top into any domain, parents still come before daughters; cells
/// of different domains run in no particular order.
pub fn loop_cells_down_par<P: Point>(tree: &OctTree<P>, f: impl Fn(CellId) + Sync) {
  for c in tree.top_cells().iter() {
    f(c);
  }
  tree.domains().par_iter().for_each(|d| {
    for c in d.cells().iter() {
      f(c);
    }
  });
}

/// Consumer for a pruned depth-first walk.
pub trait WalkProcessor<P: Point> {
  /// Visit a cell; return true to prune its subtree (neither its leaf
  /// kids nor its daughters are visited).
  fn visit_cell(&mut self, tree: &OctTree<P>, c: CellId) -> bool;

  fn visit_leaf(&mut self, tree: &OctTree<P>, l: Leaf);

  /// Visit the leaf kids of an unpruned cell. The default forwards to
  /// `visit_leaf`; override to consume whole ranges at once.
  fn visit_leaves(&mut self, tree: &OctTree<P>, r: LeafRange) {
    for l in r.iter() {
      self.visit_leaf(tree, l);
    }
  }

  /// Whether a walk from the root should also visit external leaves.
  fn wants_external(&self) -> bool {
    false
  }

  fn visit_external(&mut self, _tree: &OctTree<P>, _e: ExtLeaf) {}
}

/// Depth-first walk from `start`, daughters in ascending cell order.
pub fn walk<P: Point, W: WalkProcessor<P>>(tree: &OctTree<P>, w: &mut W, start: CellId) {
  let mut stack = Vec::with_capacity(64);
  walk_with_stack(tree, w, start, &mut stack);
}

/// Like [`walk`] but reusing a caller-owned stack across walks.
pub fn walk_with_stack<P: Point, W: WalkProcessor<P>>(
  tree: &OctTree<P>,
  w: &mut W,
  start: CellId,
  stack: &mut Vec<CellId>,
) {
  stack.clear();
  stack.push(start);
  while let Some(c) = stack.pop() {
    if w.visit_cell(tree, c) {
      continue;
    }
    w.visit_leaves(tree, tree.leaf_kids(c));
    for d in tree.daughters(c).iter().rev() {
      stack.push(d);
    }
  }
  if start == tree.root() && w.wants_external() {
    for e in tree.ext_leaves() {
      w.visit_external(tree, e);
    }
  }
}

/// Domain-parallel walk: one processor walks the shared top tree and
/// decides at each branch cell whether its domain subtree is pruned;
/// unpruned branches are then walked by per-domain processors on the
/// pool (each branch revisited by its domain's processor, which may
/// prune independently).
///
/// Returns the processors in order: top first, then one per domain.
/// External leaves go to the top processor.
pub fn walk_domains<P, W, F>(tree: &OctTree<P>, make: F) -> Vec<W>
where
  P: Point,
  W: WalkProcessor<P> + Send,
  F: Fn() -> W + Sync,
{
  let n_top = tree.n_top_cell();
  if n_top == 0 {
    let mut w = make();
    walk(tree, &mut w, tree.root());
    return vec![w];
  }

  let n_dom = tree.n_domain() as usize;
  let mut branch_dom = vec![u32::MAX; n_top as usize];
  for (di, d) in tree.domains().iter().enumerate() {
    for &b in d.branches() {
      branch_dom[b.index()] = di as u32;
    }
  }

  let mut top = make();
  let mut open: Vec<Vec<CellId>> = vec![Vec::new(); n_dom];
  let mut stack = vec![tree.root()];
  while let Some(c) = stack.pop() {
    let dom = branch_dom[c.index()];
    if dom != u32::MAX {
      if !top.visit_cell(tree, c) {
        open[dom as usize].push(c);
      }
      continue;
    }
    if top.visit_cell(tree, c) {
      continue;
    }
    top.visit_leaves(tree, tree.leaf_kids(c));
    for d in tree.daughters(c).iter().rev() {
      stack.push(d);
    }
  }
  if top.wants_external() {
    for e in tree.ext_leaves() {
      top.visit_external(tree, e);
    }
  }

  let workers: Vec<W> = open
    .into_par_iter()
    .map(|branches| {
      let mut w = make();
      let mut stack = Vec::with_capacity(64);
      for b in branches {
        walk_with_stack(tree, &mut w, b, &mut stack);
      }
      w
    })
    .collect();

  let mut all = Vec::with_capacity(n_dom + 1);
  all.push(top);
  all.extend(workers);
  all
}

#[cfg(test)]
#[path = "walk_test.rs"]
mod walk_test;
