//! Particle import traits.
//!
//! The tree pulls particle data through an [`Initialiser`] at build and
//! rebuild time instead of owning it. Implementations hand over dots
//! (position plus opaque key) and fill property arrays keyed by the
//! final leaf order.

use crate::geometry::{PeriodicBox, Point};
use crate::types::ParticleKey;

/// A particle about to enter the tree: position plus application key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dot<P: Point> {
  pub pos: P,
  pub key: ParticleKey,
}

impl<P: Point> Dot<P> {
  pub fn new(pos: P, key: ParticleKey) -> Self {
    Self { pos, key }
  }
}

/// Source of particles for tree construction.
///
/// `init_internal` is called once per build; on a rebuild it receives
/// the key table of the previous tree in leaf order, which lets sources
/// that kept per-key state emit dots in an order close to the old
/// locality.
pub trait Initialiser<P: Point>: Sync {
  /// Periodic boundary, if the particles live in one. Positions handed
  /// to `init_internal` are expected to be canonical already; builds
  /// conform stragglers and warn.
  fn boundary(&self) -> Option<PeriodicBox<P>> {
    None
  }

  /// All internal particles. `prior` is `None` on a fresh build.
  fn init_internal(&self, prior: Option<&[ParticleKey]>) -> Vec<Dot<P>>;

  /// Number of external particles (outside the tree proper).
  fn n_external(&self) -> u32 {
    0
  }

  /// The `i`-th external particle, `i < n_external()`.
  fn init_external(&self, _i: u32) -> Dot<P> {
    Dot::new(P::splat(0.0), crate::types::INVALID_KEY)
  }

  /// Fill time-step rungs for the given keys. The default is a zero
  /// fill, which marks every leaf active under the default threshold.
  fn init_rungs(&self, keys: &[ParticleKey], rungs: &mut [f32]) {
    debug_assert_eq!(keys.len(), rungs.len());
    rungs.fill(0.0);
  }
}

/// Source of per-particle interaction properties, keyed like
/// [`Initialiser::init_rungs`].
pub trait PropertyInitialiser: Sync {
  fn init_mass(&self, keys: &[ParticleKey], mass: &mut [f64]);

  fn init_size_sq(&self, keys: &[ParticleKey], size_sq: &mut [f64]);
}

/// Simple in-memory initialiser over a vector of positions.
///
/// Keys are the vector indices. Mostly useful for tests and examples;
/// real simulations implement [`Initialiser`] over their own storage.
pub struct VecInit<P: Point> {
  positions: Vec<P>,
  boundary: Option<PeriodicBox<P>>,
}

impl<P: Point> VecInit<P> {
  pub fn new(positions: Vec<P>) -> Self {
    Self {
      positions,
      boundary: None,
    }
  }

  pub fn periodic(positions: Vec<P>, boundary: PeriodicBox<P>) -> Self {
    Self {
      positions,
      boundary: Some(boundary),
    }
  }
}

impl<P: Point> Initialiser<P> for VecInit<P> {
  fn boundary(&self) -> Option<PeriodicBox<P>> {
    self.boundary
  }

  fn init_internal(&self, _prior: Option<&[ParticleKey]>) -> Vec<Dot<P>> {
    self
      .positions
      .iter()
      .enumerate()
      .map(|(i, &p)| Dot::new(p, i as ParticleKey))
      .collect()
  }
}
