//! Linking phase: compaction of a box-dot tree into flat arrays.
//!
//! Cells are numbered so that daughters of a cell are consecutive and a
//! cell's whole subtree occupies the index range up to its twig end;
//! leaves are numbered so that a cell's leaf kids come first, followed
//! by the leaves of its daughter subtrees.
//!
//! A parallel build lays out the shared top tree first (cells `0..n_top`),
//! then one contiguous cell block per domain. Branch cells, the topmost
//! cells of each domain, have their records in the top region and their
//! subtrees in their domain's block. Twig ends of non-branch top cells
//! are upper bounds in this layout; every other cell's twig end is exact.

use rayon::prelude::*;
use smallvec::{smallvec, SmallVec};

use crate::boxdot::{BoxDotTree, BoxNode, NO_BOX};
use crate::domain::{DomainData, DomainPlan};
use crate::geometry::{Cube, Point};
use crate::types::{CellId, CellRange, LeafRange, ParticleKey, INVALID_KEY};

/// Cell-array index of a missing cell reference.
pub(crate) const NO_CELL: u32 = u32::MAX;

/// The flat store produced by linking.
pub(crate) struct TreeArrays<P: Point> {
  pub leaf_pos: Vec<P>,
  pub leaf_key: Vec<ParticleKey>,
  pub leaf_parent: Vec<u32>,

  pub cell_cube: Vec<Cube<P>>,
  pub cell_level: Vec<u8>,
  pub cell_octant: Vec<u8>,
  pub cell_leaf0: Vec<u32>,
  pub cell_n_leaf_kids: Vec<u32>,
  pub cell_n_leaves: Vec<u32>,
  pub cell_cell0: Vec<u32>,
  pub cell_n_cells: Vec<u8>,
  pub cell_twig_end: Vec<u32>,
  pub cell_parent: Vec<u32>,
  pub cell_depth: Vec<u8>,

  pub n_top: u32,
  pub domains: Vec<DomainData>,
}

/// Follow a single-child chain to its end (identity when `ascc` is off).
fn resolve_chain<P: Point>(bd: &BoxDotTree<P>, ascc: bool, mut bi: u32) -> u32 {
  if !ascc {
    return bi;
  }
  loop {
    let b = &bd.boxes[bi as usize];
    if b.n_kids != 1 {
      return bi;
    }
    match b.kid_indices().next() {
      Some(k) => bi = k,
      None => return bi,
    }
  }
}

/// Cell and leaf arrays of one subtree, indices local to the subtree:
/// the root cell is 0 and the first leaf is 0.
struct LocalArrays<P: Point> {
  leaf_pos: Vec<P>,
  leaf_key: Vec<ParticleKey>,
  leaf_parent: Vec<u32>,

  cube: Vec<Cube<P>>,
  level: Vec<u8>,
  octant: Vec<u8>,
  leaf0: Vec<u32>,
  n_leaf_kids: Vec<u32>,
  n_leaves: Vec<u32>,
  cell0: Vec<u32>,
  n_cells: Vec<u8>,
  twig_end: Vec<u32>,
  parent: Vec<u32>,
  depth: Vec<u8>,
}

impl<P: Point> Default for LocalArrays<P> {
  fn default() -> Self {
    Self {
      leaf_pos: Vec::new(),
      leaf_key: Vec::new(),
      leaf_parent: Vec::new(),
      cube: Vec::new(),
      level: Vec::new(),
      octant: Vec::new(),
      leaf0: Vec::new(),
      n_leaf_kids: Vec::new(),
      n_leaves: Vec::new(),
      cell0: Vec::new(),
      n_cells: Vec::new(),
      twig_end: Vec::new(),
      parent: Vec::new(),
      depth: Vec::new(),
    }
  }
}

impl<P: Point> LocalArrays<P> {
  fn n_cell(&self) -> u32 {
    self.cube.len() as u32
  }
}

/// Append an unfilled cell record; subtree fields are placeholders
/// until the cell's own layout runs.
fn alloc_cell<P: Point>(out: &mut LocalArrays<P>, bx: &BoxNode<P>, octant: u8, parent: u32) -> u32 {
  let idx = out.cube.len() as u32;
  out.cube.push(bx.cube);
  out.level.push(bx.level);
  out.octant.push(octant);
  out.parent.push(parent);
  out.leaf0.push(0);
  out.n_leaf_kids.push(0);
  out.n_leaves.push(0);
  out.cell0.push(NO_CELL);
  out.n_cells.push(0);
  out.twig_end.push(idx + 1);
  out.depth.push(0);
  idx
}

struct Linker<'t, P: Point> {
  bd: &'t BoxDotTree<P>,
  n_min: u32,
  ascc: bool,
  out: LocalArrays<P>,
}

impl<'t, P: Point> Linker<'t, P> {
  fn new(bd: &'t BoxDotTree<P>, n_min: u32, ascc: bool) -> Self {
    Self {
      bd,
      n_min,
      ascc,
      out: LocalArrays::default(),
    }
  }

  fn emit_loose(&mut self, begin: u32, end: u32, parent: u32) {
    for d in &self.bd.dots[begin as usize..end as usize] {
      self.out.leaf_pos.push(d.pos);
      self.out.leaf_key.push(d.key);
      self.out.leaf_parent.push(parent);
    }
  }

  /// Lay out the subtree of (already resolved) box `bi` as cell `ci`.
  /// Returns the subtree depth.
  fn layout(&mut self, bi: u32, ci: u32) -> u8 {
    let bd = self.bd;
    let b = bd.boxes[bi as usize];
    let l0 = self.out.leaf_pos.len() as u32;

    let mut daughters: SmallVec<[(u32, u8); 8]> = SmallVec::new();
    if b.is_split() {
      for oct in 0..P::NSUB {
        let ki = b.kids[oct];
        if ki == NO_BOX {
          continue;
        }
        let rk = resolve_chain(bd, self.ascc, ki);
        let rb = &bd.boxes[rk as usize];
        if rb.n_dots() >= self.n_min {
          daughters.push((rk, oct as u8));
        } else {
          // too small for a cell of its own: absorb as leaf kids
          self.emit_loose(rb.dot_begin, rb.dot_end, ci);
        }
      }
    } else {
      self.emit_loose(b.dot_begin, b.dot_end, ci);
    }

    let nl = self.out.leaf_pos.len() as u32 - l0;
    let c0 = if daughters.is_empty() {
      NO_CELL
    } else {
      self.out.cube.len() as u32
    };
    for &(rk, oct) in &daughters {
      alloc_cell(&mut self.out, &bd.boxes[rk as usize], oct, ci);
    }

    self.out.leaf0[ci as usize] = l0;
    self.out.n_leaf_kids[ci as usize] = nl;
    self.out.n_leaves[ci as usize] = b.n_dots();
    self.out.cell0[ci as usize] = c0;
    self.out.n_cells[ci as usize] = daughters.len() as u8;

    let mut dp = 0u8;
    for (j, &(rk, _)) in daughters.iter().enumerate() {
      dp = dp.max(1 + self.layout(rk, c0 + j as u32));
    }
    self.out.twig_end[ci as usize] = self.out.cube.len() as u32;
    self.out.depth[ci as usize] = dp;
    dp
  }
}

/// Link the subtree rooted at box `root_bi` into local arrays.
fn link_subtree<P: Point>(
  bd: &BoxDotTree<P>,
  root_bi: u32,
  n_min: u32,
  ascc: bool,
) -> LocalArrays<P> {
  let mut lk = Linker::new(bd, n_min, ascc);
  let r = resolve_chain(bd, ascc, root_bi);
  let c = alloc_cell(&mut lk.out, &bd.boxes[r as usize], 0, NO_CELL);
  lk.layout(r, c);
  lk.out
}

/// Serial link of the whole tree: global depth-first layout, all twig
/// ends exact, a single domain covering everything.
pub(crate) fn link_serial<P: Point>(bd: &BoxDotTree<P>, n_min: u32, ascc: bool) -> TreeArrays<P> {
  let la = link_subtree(bd, 0, n_min, ascc);
  let n_cell = la.n_cell();
  let n_leaf = la.leaf_pos.len() as u32;
  let depth = la.depth[0];
  TreeArrays {
    leaf_pos: la.leaf_pos,
    leaf_key: la.leaf_key,
    leaf_parent: la.leaf_parent,
    cell_cube: la.cube,
    cell_level: la.level,
    cell_octant: la.octant,
    cell_leaf0: la.leaf0,
    cell_n_leaf_kids: la.n_leaf_kids,
    cell_n_leaves: la.n_leaves,
    cell_cell0: la.cell0,
    cell_n_cells: la.n_cells,
    cell_twig_end: la.twig_end,
    cell_parent: la.parent,
    cell_depth: la.depth,
    n_top: 0,
    domains: vec![DomainData {
      leaves: LeafRange::new(0, n_leaf),
      cells: CellRange::new(0, n_cell),
      branches: smallvec![CellId(0)],
      depth,
    }],
  }
}

/// A domain subtree root found during the top pass.
struct BranchTask {
  box_idx: u32,
  /// Top-region index of the branch cell record.
  cell: u32,
  /// Global index of the branch's first leaf.
  leaf_base: u32,
  domain: u32,
}

enum DaughterKind {
  Shared,
  Branch,
}

/// Top-pass state: lays out the shared cells, reserves leaf blocks for
/// branches and records loose leaves of shared cells.
struct TopLinker<'t, P: Point> {
  bd: &'t BoxDotTree<P>,
  plan: &'t DomainPlan,
  n_min: u32,
  ascc: bool,
  out: LocalArrays<P>,
  next_leaf: u32,
  /// (dot-buffer index, parent cell, global leaf index)
  loose: Vec<(u32, u32, u32)>,
  branches: Vec<BranchTask>,
}

impl<'t, P: Point> TopLinker<'t, P> {
  fn emit_loose(&mut self, begin: u32, end: u32, parent: u32) {
    for i in begin..end {
      self.loose.push((i, parent, self.next_leaf));
      self.next_leaf += 1;
    }
  }

  fn layout_top(&mut self, bi: u32, ci: u32) {
    let bd = self.bd;
    let b = bd.boxes[bi as usize];
    let l0 = self.next_leaf;

    let mut daughters: SmallVec<[(u32, u8, DaughterKind); 8]> = SmallVec::new();
    if b.is_split() {
      for oct in 0..P::NSUB {
        let ki = b.kids[oct];
        if ki == NO_BOX {
          continue;
        }
        let rk = resolve_chain(bd, self.ascc, ki);
        let rb = &bd.boxes[rk as usize];
        if self.plan.splits(rb.dot_begin, rb.dot_end) {
          // straddles a domain cut: stays in the shared top tree
          daughters.push((rk, oct as u8, DaughterKind::Shared));
        } else if rb.n_dots() >= self.n_min {
          daughters.push((rk, oct as u8, DaughterKind::Branch));
        } else {
          self.emit_loose(rb.dot_begin, rb.dot_end, ci);
        }
      }
    } else {
      // a terminal box split by a cut (indistinguishable positions)
      self.emit_loose(b.dot_begin, b.dot_end, ci);
    }

    let nl = self.next_leaf - l0;
    let c0 = if daughters.is_empty() {
      NO_CELL
    } else {
      self.out.cube.len() as u32
    };
    for &(rk, oct, _) in &daughters {
      alloc_cell(&mut self.out, &bd.boxes[rk as usize], oct, ci);
    }

    self.out.leaf0[ci as usize] = l0;
    self.out.n_leaf_kids[ci as usize] = nl;
    self.out.n_leaves[ci as usize] = b.n_dots();
    self.out.cell0[ci as usize] = c0;
    self.out.n_cells[ci as usize] = daughters.len() as u8;

    for (j, &(rk, _, ref kind)) in daughters.iter().enumerate() {
      let dci = c0 + j as u32;
      match kind {
        DaughterKind::Shared => self.layout_top(rk, dci),
        DaughterKind::Branch => {
          let rb = &bd.boxes[rk as usize];
          self.out.leaf0[dci as usize] = self.next_leaf;
          self.out.n_leaves[dci as usize] = rb.n_dots();
          self.branches.push(BranchTask {
            box_idx: rk,
            cell: dci,
            leaf_base: self.next_leaf,
            domain: self.plan.domain_of(rb.dot_begin),
          });
          self.next_leaf += rb.n_dots();
        }
      }
    }
  }
}

/// Domain-parallel link: shared top tree first, then one cell block per
/// domain, branch subtrees linked on the rayon pool.
pub(crate) fn link_parallel<P: Point>(
  bd: &BoxDotTree<P>,
  plan: &DomainPlan,
  n_min: u32,
  ascc: bool,
) -> TreeArrays<P> {
  let n = bd.n_dots();
  let n_dom = plan.n_domain();
  if n_dom <= 1 || !plan.splits(0, n) {
    return link_serial(bd, n_min, ascc);
  }

  // top pass (single-threaded)
  let mut top = TopLinker {
    bd,
    plan,
    n_min,
    ascc,
    out: LocalArrays::default(),
    next_leaf: 0,
    loose: Vec::new(),
    branches: Vec::new(),
  };
  let r = resolve_chain(bd, ascc, 0);
  let root = alloc_cell(&mut top.out, &bd.boxes[r as usize], 0, NO_CELL);
  top.layout_top(r, root);
  debug_assert_eq!(top.next_leaf, n);

  let n_top = top.out.n_cell();
  let built: Vec<LocalArrays<P>> = top
    .branches
    .par_iter()
    .map(|t| link_subtree(bd, t.box_idx, n_min, ascc))
    .collect();

  // assembly (single-threaded)
  let mut a = TreeArrays {
    leaf_pos: vec![P::splat(0.0); n as usize],
    leaf_key: vec![INVALID_KEY; n as usize],
    leaf_parent: vec![NO_CELL; n as usize],
    cell_cube: top.out.cube,
    cell_level: top.out.level,
    cell_octant: top.out.octant,
    cell_leaf0: top.out.leaf0,
    cell_n_leaf_kids: top.out.n_leaf_kids,
    cell_n_leaves: top.out.n_leaves,
    cell_cell0: top.out.cell0,
    cell_n_cells: top.out.n_cells,
    cell_twig_end: top.out.twig_end,
    cell_parent: top.out.parent,
    cell_depth: top.out.depth,
    n_top,
    domains: Vec::with_capacity(n_dom as usize),
  };

  for &(dot_i, parent, leaf_i) in &top.loose {
    let d = &bd.dots[dot_i as usize];
    a.leaf_pos[leaf_i as usize] = d.pos;
    a.leaf_key[leaf_i as usize] = d.key;
    a.leaf_parent[leaf_i as usize] = parent;
  }

  let mut dom_cells: Vec<CellRange> = vec![CellRange::default(); n_dom as usize];
  let mut dom_branches: Vec<SmallVec<[CellId; 8]>> = vec![SmallVec::new(); n_dom as usize];
  let mut dom_depth: Vec<u8> = vec![0; n_dom as usize];
  let mut dom_first_leaf: Vec<Option<u32>> = vec![None; n_dom as usize];

  for (t, la) in top.branches.iter().zip(&built) {
    let base = a.cell_cube.len() as u32;
    let d = t.domain as usize;
    if dom_branches[d].is_empty() {
      dom_cells[d] = CellRange::new(base, base);
    }
    dom_branches[d].push(CellId(t.cell));
    dom_depth[d] = dom_depth[d].max(la.depth[0]);
    dom_first_leaf[d].get_or_insert(t.leaf_base);

    // local -> global cell index: the branch record lives in the top
    // region, everything below it in the domain block
    let map = |j: u32| -> u32 {
      if j == NO_CELL {
        NO_CELL
      } else if j == 0 {
        t.cell
      } else {
        base + j - 1
      }
    };

    // patch the branch record with its subtree layout
    let tc = t.cell as usize;
    a.cell_n_leaf_kids[tc] = la.n_leaf_kids[0];
    a.cell_cell0[tc] = map(la.cell0[0]);
    a.cell_n_cells[tc] = la.n_cells[0];
    a.cell_twig_end[tc] = if la.twig_end[0] <= 1 {
      t.cell + 1
    } else {
      base + la.twig_end[0] - 1
    };
    a.cell_depth[tc] = la.depth[0];

    for j in 1..la.n_cell() as usize {
      a.cell_cube.push(la.cube[j]);
      a.cell_level.push(la.level[j]);
      a.cell_octant.push(la.octant[j]);
      a.cell_leaf0.push(la.leaf0[j] + t.leaf_base);
      a.cell_n_leaf_kids.push(la.n_leaf_kids[j]);
      a.cell_n_leaves.push(la.n_leaves[j]);
      a.cell_cell0.push(map(la.cell0[j]));
      a.cell_n_cells.push(la.n_cells[j]);
      a.cell_twig_end.push(base + la.twig_end[j] - 1);
      a.cell_parent.push(map(la.parent[j]));
      a.cell_depth.push(la.depth[j]);
    }
    dom_cells[d] = CellRange::new(dom_cells[d].begin, a.cell_cube.len() as u32);

    for i in 0..la.leaf_pos.len() {
      let gi = (t.leaf_base + i as u32) as usize;
      a.leaf_pos[gi] = la.leaf_pos[i];
      a.leaf_key[gi] = la.leaf_key[i];
      a.leaf_parent[gi] = map(la.leaf_parent[i]);
    }
  }

  // empty domains get an empty cell range at the end of the previous block
  let mut at = n_top;
  for d in 0..n_dom as usize {
    if dom_branches[d].is_empty() {
      dom_cells[d] = CellRange::new(at, at);
    }
    at = dom_cells[d].end;
  }

  // leaf boundaries: each domain starts at its first branch leaf
  let mut bounds = vec![0u32; n_dom as usize + 1];
  bounds[n_dom as usize] = n;
  for d in (1..n_dom as usize).rev() {
    bounds[d] = dom_first_leaf[d].unwrap_or(bounds[d + 1]);
  }
  for d in 0..n_dom as usize {
    a.domains.push(DomainData {
      leaves: LeafRange::new(bounds[d], bounds[d + 1]),
      cells: dom_cells[d],
      branches: std::mem::take(&mut dom_branches[d]),
      depth: dom_depth[d],
    });
  }

  // upward fix of depth and twig bounds for shared top cells
  for c in (0..n_top as usize).rev() {
    let nc = a.cell_n_cells[c] as u32;
    if nc == 0 {
      continue;
    }
    let c0 = a.cell_cell0[c];
    let mut dp = 0u8;
    let mut cn = c as u32 + 1;
    for dc in c0..c0 + nc {
      dp = dp.max(a.cell_depth[dc as usize]);
      cn = cn.max(a.cell_twig_end[dc as usize]);
    }
    a.cell_depth[c] = dp + 1;
    a.cell_twig_end[c] = cn;
  }

  a
}

#[cfg(test)]
#[path = "link_test.rs"]
mod link_test;
