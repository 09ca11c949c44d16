//! Domain decomposition over the box-dot tree.
//!
//! For a parallel build the dot buffer is cut into `n_domain` contiguous
//! segments of near-equal size. Cuts snap to box boundaries within a
//! tolerance so each domain subtree starts at the shallowest possible
//! box edge; a cut that cannot snap splits a box, which then becomes
//! part of the shared top tree.

use smallvec::SmallVec;
use tracing::warn;

use crate::boxdot::BoxDotTree;
use crate::geometry::Point;
use crate::types::{CellId, CellRange, LeafRange};

/// How often a failing tolerance is halved before giving up.
const TOL_RETRIES: u32 = 6;

/// Per-domain bookkeeping of a finished parallel build.
#[derive(Clone, Debug)]
pub struct DomainData {
  pub(crate) leaves: LeafRange,
  pub(crate) cells: CellRange,
  pub(crate) branches: SmallVec<[CellId; 8]>,
  pub(crate) depth: u8,
}

impl DomainData {
  /// Leaves owned by this domain, a contiguous range.
  pub fn leaves(&self) -> LeafRange {
    self.leaves
  }

  /// Non-top cells of this domain, a contiguous range.
  pub fn cells(&self) -> CellRange {
    self.cells
  }

  pub fn n_leaf(&self) -> u32 {
    self.leaves.len()
  }

  pub fn n_cell(&self) -> u32 {
    self.cells.len()
  }

  /// Branch cells: the topmost cells of this domain. Their records live
  /// in the top-tree region; their subtrees in this domain's cell range.
  pub fn branches(&self) -> &[CellId] {
    &self.branches
  }

  pub fn n_branch(&self) -> u32 {
    self.branches.len() as u32
  }

  /// Depth of the deepest branch subtree.
  pub fn depth(&self) -> u8 {
    self.depth
  }
}

/// The planned segmentation of the dot buffer: `n_domain + 1` cut
/// positions, starting at 0 and ending at the dot count.
pub(crate) struct DomainPlan {
  pub cuts: Vec<u32>,
}

impl DomainPlan {
  pub fn n_domain(&self) -> u32 {
    self.cuts.len() as u32 - 1
  }

  /// Domain owning dot position `i`.
  pub fn domain_of(&self, i: u32) -> u32 {
    debug_assert!(i < *self.cuts.last().unwrap_or(&0));
    match self.cuts.binary_search(&i) {
      // a cut position belongs to the domain it opens; skip empty ones
      Ok(mut d) => {
        while d + 1 < self.cuts.len() - 1 && self.cuts[d + 1] == i {
          d += 1;
        }
        d as u32
      }
      Err(d) => d as u32 - 1,
    }
  }

  /// Whether a box dot range `[begin, end)` straddles a cut, i.e. the
  /// box is shared between domains.
  pub fn splits(&self, begin: u32, end: u32) -> bool {
    self
      .cuts
      .iter()
      .any(|&c| begin < c && c < end)
  }
}

/// Plan domain cuts for `n` dots over at most `n_domain` domains.
///
/// The domain count is clamped so every domain can hold at least
/// `n_max` particles. If a tolerance leaves some domain short, it is
/// halved and the planning retried; a persistent imbalance is kept and
/// reported rather than treated as fatal.
pub(crate) fn plan<P: Point>(
  bd: &BoxDotTree<P>,
  n_domain: u32,
  tol: u32,
  n_max: u32,
) -> DomainPlan {
  let n = bd.n_dots();
  let n_dom = n_domain.max(1).min((n / n_max.max(1)).max(1));
  if n_dom == 1 {
    return DomainPlan { cuts: vec![0, n] };
  }

  let mut tol = tol.max(1);
  let mut best: Option<(u32, Vec<u32>)> = None;
  for _ in 0..=TOL_RETRIES {
    let cuts = snap_cuts(bd, n_dom, tol);
    let shortest = cuts
      .windows(2)
      .map(|w| w[1] - w[0])
      .min()
      .unwrap_or(0);
    if shortest >= n_max {
      return DomainPlan { cuts };
    }
    if best.as_ref().map_or(true, |(s, _)| shortest > *s) {
      best = Some((shortest, cuts));
    }
    if tol == 1 {
      break;
    }
    tol /= 2;
  }
  let (shortest, cuts) = best.unwrap_or((n, vec![0, n]));
  warn!(
    n_dom,
    shortest, n_max, "domain split imbalanced: some domain holds fewer than n_max particles"
  );
  DomainPlan { cuts }
}

/// Cuts at the box boundaries nearest the equal-share targets.
fn snap_cuts<P: Point>(bd: &BoxDotTree<P>, n_dom: u32, tol: u32) -> Vec<u32> {
  let n = bd.n_dots();
  let mut cuts = Vec::with_capacity(n_dom as usize + 1);
  cuts.push(0);
  for d in 1..n_dom {
    let target = ((d as u64 * n as u64 + n_dom as u64 / 2) / n_dom as u64) as u32;
    let mut cut = snap_one(bd, target, tol);
    // keep cuts monotonic even when two targets snap to the same edge
    let prev = *cuts.last().unwrap_or(&0);
    if cut < prev {
      cut = prev;
    }
    cuts.push(cut);
  }
  cuts.push(n);
  cuts
}

/// Walk down from the root box towards `target`, returning the first
/// box boundary within `tol` of it. A terminal box with no boundary in
/// reach is cut at the target itself.
fn snap_one<P: Point>(bd: &BoxDotTree<P>, target: u32, tol: u32) -> u32 {
  let mut bx = bd.root();
  loop {
    if !bx.is_split() {
      return target;
    }
    let mut best: Option<u32> = None;
    let mut next = None;
    for ki in bx.kid_indices() {
      let kid = &bd.boxes[ki as usize];
      for cand in [kid.dot_begin, kid.dot_end] {
        if cand.abs_diff(target) <= tol {
          let better = best.map_or(true, |b| cand.abs_diff(target) < b.abs_diff(target));
          if better {
            best = Some(cand);
          }
        }
      }
      if kid.dot_begin <= target && target < kid.dot_end {
        next = Some(ki);
      }
    }
    if let Some(cut) = best {
      return cut;
    }
    match next {
      Some(ki) => bx = &bd.boxes[ki as usize],
      // target sits exactly on this box's end boundary
      None => return target,
    }
  }
}

#[cfg(test)]
#[path = "domain_test.rs"]
mod domain_test;
