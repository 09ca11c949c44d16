//! Box-dot phase: octant subdivision of the particle set.
//!
//! Boxes form an arena-allocated tree in depth-first preorder. Each box
//! owns a contiguous range of the dot buffer; splitting a box partitions
//! its range stably by octant in place, so the buffer ends up sorted in
//! depth-first octant order without ever moving a dot between buffers.
//!
//! Large boxes fan out their octant groups onto the rayon pool; each
//! task builds a local arena that is spliced into the parent arena with
//! an index offset.

use rayon::prelude::*;

use crate::geometry::{Cube, Point, MAX_DEPTH};
use crate::init::Dot;

/// Arena index of a missing child box.
pub(crate) const NO_BOX: u32 = u32::MAX;

/// Below this many dots a box splits its octants on the current thread.
const PAR_CUTOFF: usize = 8192;

#[derive(Clone, Copy, Debug)]
pub(crate) struct BoxNode<P: Point> {
  pub cube: Cube<P>,
  /// True subdivision depth below the root box.
  pub level: u8,
  /// Octant within the parent box.
  pub octant: u8,
  /// Range of owned dots in the dot buffer.
  pub dot_begin: u32,
  pub dot_end: u32,
  /// Child box per octant, `NO_BOX` where the octant is empty or the
  /// box is unsplit. Only the first `P::NSUB` slots are used.
  pub kids: [u32; 8],
  pub n_kids: u8,
}

impl<P: Point> BoxNode<P> {
  #[inline]
  pub fn n_dots(&self) -> u32 {
    self.dot_end - self.dot_begin
  }

  #[inline]
  pub fn is_split(&self) -> bool {
    self.n_kids > 0
  }

  /// Child box indices in octant order.
  pub fn kid_indices(&self) -> impl Iterator<Item = u32> + '_ {
    self.kids[..P::NSUB].iter().copied().filter(|&k| k != NO_BOX)
  }
}

pub(crate) struct BoxDotTree<P: Point> {
  /// Depth-first preorder, root at index 0.
  pub boxes: Vec<BoxNode<P>>,
  /// Octant-sorted; box dot ranges index into this buffer.
  pub dots: Vec<Dot<P>>,
}

impl<P: Point> BoxDotTree<P> {
  /// Subdivide `dots` under `root_cube` until no box holds more than
  /// `n_max` dots or the depth limit is reached.
  pub fn build(mut dots: Vec<Dot<P>>, root_cube: Cube<P>, n_max: u32) -> Self {
    let mut boxes = Vec::with_capacity(estimate_boxes(dots.len(), n_max));
    split_box(&mut dots, 0, root_cube, 0, 0, n_max, &mut boxes);
    Self { boxes, dots }
  }

  #[inline]
  pub fn root(&self) -> &BoxNode<P> {
    &self.boxes[0]
  }

  pub fn n_dots(&self) -> u32 {
    self.dots.len() as u32
  }
}

/// Rough arena reservation; octant trees rarely exceed two boxes per
/// `n_max` dots.
fn estimate_boxes(n_dots: usize, n_max: u32) -> usize {
  8 + 2 * n_dots / n_max.max(1) as usize
}

/// Build the box for `dots` and recursively split it. `base` is the
/// absolute dot-buffer offset of the slice. Returns the box index.
fn split_box<P: Point>(
  dots: &mut [Dot<P>],
  base: u32,
  cube: Cube<P>,
  level: u8,
  octant: u8,
  n_max: u32,
  out: &mut Vec<BoxNode<P>>,
) -> u32 {
  let idx = out.len() as u32;
  out.push(BoxNode {
    cube,
    level,
    octant,
    dot_begin: base,
    dot_end: base + dots.len() as u32,
    kids: [NO_BOX; 8],
    n_kids: 0,
  });
  if dots.len() <= n_max as usize || level >= MAX_DEPTH {
    return idx;
  }

  // Stable in-place partition: dots of the same octant keep their
  // relative input order.
  dots.sort_by_key(|d| cube.octant(d.pos));

  let groups = octant_groups::<P>(dots, &cube);

  if dots.len() >= PAR_CUTOFF && groups.len() > 1 {
    // Fan the octant groups out onto the pool with local arenas.
    let mut parts: Vec<(u8, u32, &mut [Dot<P>])> = Vec::with_capacity(groups.len());
    let mut rest = dots;
    let mut consumed = 0usize;
    for &(oct, begin, end) in &groups {
      let (_, tail) = rest.split_at_mut(begin - consumed);
      let (mid, tail) = tail.split_at_mut(end - begin);
      parts.push((oct, base + begin as u32, mid));
      rest = tail;
      consumed = end;
    }
    let subs: Vec<(u8, Vec<BoxNode<P>>)> = parts
      .into_par_iter()
      .map(|(oct, sub_base, slice)| {
        let mut arena = Vec::with_capacity(estimate_boxes(slice.len(), n_max));
        split_box(slice, sub_base, cube.child(oct), level + 1, oct, n_max, &mut arena);
        (oct, arena)
      })
      .collect();
    for (oct, sub) in subs {
      let offset = out.len() as u32;
      out[idx as usize].kids[oct as usize] = offset;
      out[idx as usize].n_kids += 1;
      out.extend(sub.into_iter().map(|mut b| {
        for k in b.kids[..P::NSUB].iter_mut() {
          if *k != NO_BOX {
            *k += offset;
          }
        }
        b
      }));
    }
  } else {
    let mut rest = dots;
    let mut consumed = 0usize;
    for (oct, begin, end) in groups {
      let (_, tail) = rest.split_at_mut(begin - consumed);
      let (mid, tail) = tail.split_at_mut(end - begin);
      rest = tail;
      consumed = end;
      let kid = split_box(
        mid,
        base + begin as u32,
        cube.child(oct),
        level + 1,
        oct,
        n_max,
        out,
      );
      out[idx as usize].kids[oct as usize] = kid;
      out[idx as usize].n_kids += 1;
    }
  }
  idx
}

/// Boundaries of the non-empty octant runs of an octant-sorted slice,
/// as `(octant, begin, end)` relative to the slice.
fn octant_groups<P: Point>(dots: &[Dot<P>], cube: &Cube<P>) -> Vec<(u8, usize, usize)> {
  let mut groups = Vec::with_capacity(P::NSUB);
  let mut begin = 0usize;
  while begin < dots.len() {
    let oct = cube.octant(dots[begin].pos);
    let mut end = begin + 1;
    while end < dots.len() && cube.octant(dots[end].pos) == oct {
      end += 1;
    }
    groups.push((oct, begin, end));
    begin = end;
  }
  groups
}

#[cfg(test)]
#[path = "boxdot_test.rs"]
mod boxdot_test;
