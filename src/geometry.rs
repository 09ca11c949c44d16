//! Geometric primitives: points, cubic boxes and periodic boundaries.
//!
//! The tree is generic over the [`Point`] dimension; `glam::DVec2` gives a
//! quad-tree, `glam::DVec3` an oct-tree. Positions are always `f64`; the
//! maximum subdivision depth equals the mantissa width, below which child
//! centres are no longer representable.

use std::fmt;

use glam::{BVec2, BVec3, DVec2, DVec3};

/// Deepest level a box can sit at. At this level the cube half-size
/// relative to the root has shrunk below one part in 2^52, the f64
/// mantissa width, so further subdivision cannot separate positions.
pub const MAX_DEPTH: u8 = 52;

/// Point in 2 or 3 dimensions with the per-axis operations tree
/// construction needs.
pub trait Point: Copy + PartialEq + Send + Sync + fmt::Debug + 'static {
  /// Number of spatial dimensions.
  const DIM: usize;
  /// Number of octants per box, `1 << DIM`.
  const NSUB: usize;

  fn splat(v: f64) -> Self;
  fn axis(self, k: usize) -> f64;
  fn set_axis(&mut self, k: usize, v: f64);
  fn min_by_axis(self, other: Self) -> Self;
  fn max_by_axis(self, other: Self) -> Self;
  fn mid(self, other: Self) -> Self;

  /// Largest per-axis absolute difference.
  fn max_abs_diff(self, other: Self) -> f64;

  /// Octant of `x` relative to `centre`: bit `k` is set iff
  /// `x[k] >= centre[k]`.
  fn octant(centre: Self, x: Self) -> u8;

  /// Shift by `amount` along every axis, with the sign per axis taken
  /// from the octant bits.
  fn shifted(self, octant: u8, amount: f64) -> Self;
}

impl Point for DVec2 {
  const DIM: usize = 2;
  const NSUB: usize = 4;

  #[inline]
  fn splat(v: f64) -> Self {
    DVec2::splat(v)
  }

  #[inline]
  fn axis(self, k: usize) -> f64 {
    self[k]
  }

  #[inline]
  fn set_axis(&mut self, k: usize, v: f64) {
    self[k] = v;
  }

  #[inline]
  fn min_by_axis(self, other: Self) -> Self {
    self.min(other)
  }

  #[inline]
  fn max_by_axis(self, other: Self) -> Self {
    self.max(other)
  }

  #[inline]
  fn mid(self, other: Self) -> Self {
    0.5 * (self + other)
  }

  #[inline]
  fn max_abs_diff(self, other: Self) -> f64 {
    (self - other).abs().max_element()
  }

  #[inline]
  fn octant(centre: Self, x: Self) -> u8 {
    x.cmpge(centre).bitmask() as u8
  }

  #[inline]
  fn shifted(self, octant: u8, amount: f64) -> Self {
    let up = BVec2::new(octant & 1 != 0, octant & 2 != 0);
    DVec2::select(up, self + amount, self - amount)
  }
}

impl Point for DVec3 {
  const DIM: usize = 3;
  const NSUB: usize = 8;

  #[inline]
  fn splat(v: f64) -> Self {
    DVec3::splat(v)
  }

  #[inline]
  fn axis(self, k: usize) -> f64 {
    self[k]
  }

  #[inline]
  fn set_axis(&mut self, k: usize, v: f64) {
    self[k] = v;
  }

  #[inline]
  fn min_by_axis(self, other: Self) -> Self {
    self.min(other)
  }

  #[inline]
  fn max_by_axis(self, other: Self) -> Self {
    self.max(other)
  }

  #[inline]
  fn mid(self, other: Self) -> Self {
    0.5 * (self + other)
  }

  #[inline]
  fn max_abs_diff(self, other: Self) -> f64 {
    (self - other).abs().max_element()
  }

  #[inline]
  fn octant(centre: Self, x: Self) -> u8 {
    x.cmpge(centre).bitmask() as u8
  }

  #[inline]
  fn shifted(self, octant: u8, amount: f64) -> Self {
    let up = BVec3::new(octant & 1 != 0, octant & 2 != 0, octant & 4 != 0);
    DVec3::select(up, self + amount, self - amount)
  }
}

/// Axis-aligned cube given by centre and half side length.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Cube<P: Point> {
  pub centre: P,
  pub half: f64,
}

impl<P: Point> Cube<P> {
  pub fn new(centre: P, half: f64) -> Self {
    Self { centre, half }
  }

  /// Whether `x` lies inside the cube (boundary inclusive).
  #[inline]
  pub fn contains(&self, x: P) -> bool {
    P::max_abs_diff(self.centre, x) <= self.half
  }

  /// Octant of `x` relative to the cube centre.
  #[inline]
  pub fn octant(&self, x: P) -> u8 {
    P::octant(self.centre, x)
  }

  /// The child cube in the given octant: half the side length, centre
  /// shifted by a quarter side along each axis.
  #[inline]
  pub fn child(&self, octant: u8) -> Self {
    let h = 0.5 * self.half;
    Self {
      centre: self.centre.shifted(octant, h),
      half: h,
    }
  }

  /// Smallest cube with power-of-two half size enclosing all `points`,
  /// centred on the midpoint of their bounding box.
  ///
  /// An empty point set yields the unit cube at the origin.
  pub fn fitting(points: impl IntoIterator<Item = P>) -> Self {
    let mut it = points.into_iter();
    let first = match it.next() {
      Some(p) => p,
      None => return Self::new(P::splat(0.0), 1.0),
    };
    let mut lo = first;
    let mut hi = first;
    for p in it {
      lo = lo.min_by_axis(p);
      hi = hi.max_by_axis(p);
    }
    let centre = lo.mid(hi);
    let tight = P::max_abs_diff(centre, lo).max(P::max_abs_diff(centre, hi));
    Self::new(centre, pow2_at_least(tight))
  }
}

/// Smallest power of two (possibly below one) not less than `x`;
/// 1.0 for non-positive `x`.
fn pow2_at_least(x: f64) -> f64 {
  if !(x > 0.0) {
    return 1.0;
  }
  let mut h = 1.0f64;
  if x > 1.0 {
    while h < x {
      h *= 2.0;
    }
  } else {
    while 0.5 * h >= x {
      h *= 0.5;
    }
  }
  h
}

/// Periodic simulation box centred on the origin.
///
/// The half side length is per axis; an axis with half size zero is
/// open (not periodic). Canonical positions lie in `[-half, half)` on
/// each periodic axis.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PeriodicBox<P: Point> {
  pub half: P,
}

impl<P: Point> PeriodicBox<P> {
  pub fn new(half: P) -> Self {
    Self { half }
  }

  /// Cube box with equal half sides.
  pub fn cubic(half: f64) -> Self {
    Self {
      half: P::splat(half),
    }
  }

  /// Whether `x` is canonical on every periodic axis.
  pub fn conforms(&self, x: P) -> bool {
    for k in 0..P::DIM {
      let h = self.half.axis(k);
      if h > 0.0 {
        let v = x.axis(k);
        if v < -h || v >= h {
          return false;
        }
      }
    }
    true
  }

  /// Map `x` to its canonical image in `[-half, half)` per periodic axis.
  pub fn wrap(&self, mut x: P) -> P {
    for k in 0..P::DIM {
      let h = self.half.axis(k);
      if h > 0.0 {
        let v = (x.axis(k) + h).rem_euclid(2.0 * h) - h;
        x.set_axis(k, v);
      }
    }
    x
  }

  /// Largest per-axis half size.
  pub fn max_half(&self) -> f64 {
    let mut m = 0.0f64;
    for k in 0..P::DIM {
      m = m.max(self.half.axis(k));
    }
    m
  }

  /// Root cube for trees built inside this box: origin-centred with a
  /// power-of-two half size covering the widest axis.
  pub fn root_cube(&self) -> Cube<P> {
    Cube::new(P::splat(0.0), pow2_at_least(self.max_half()))
  }
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;
