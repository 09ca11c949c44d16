//! Build configuration and its validation.

use crate::types::Props;

/// Hard upper bound on `n_max`: leaf-kid counts of unsplit boxes must
/// stay comfortably inside a single byte per cell.
pub const MAX_N_MAX: u32 = 250;

/// Hard upper bound on the ratio `n_max / n_min`.
pub const MAX_RATIO: u32 = 250;

/// Largest supported block size for interaction-data alignment.
pub const MAX_BLOCK_SIZE: u32 = 64;

/// Parameters controlling a tree build.
///
/// Zero means "pick a default" for most fields: `n_max = NSUB` of the
/// point type, `n_min = min(2, n_max)`, `n_domain` = rayon pool width,
/// `tol` scaled from the particle count. On a rebuild, `n_max = 0`
/// instead keeps every parameter of the previous build.
#[derive(Clone, Copy, Debug)]
pub struct BuildConfig {
  /// Maximum number of particles in an unsplit box.
  pub n_max: u32,
  /// Minimum number of leaves per cell; subtrees with fewer particles
  /// are absorbed as direct leaf kids of the parent cell.
  pub n_min: u32,
  /// Avoid single-child cells: elide chains of single-child boxes so a
  /// cell never has exactly one daughter and no leaf kids.
  pub ascc: bool,
  /// Rung threshold: leaves with rung >= this value are flagged active.
  pub rung_active: f32,
  /// Which per-particle properties to load at build time.
  pub load: Props,
  /// Domain-split tolerance in particles. Larger values let domain
  /// boundaries snap to shallower box edges.
  pub tol: u32,
  /// Number of domains for a parallel build; 1 forces a serial build.
  pub n_domain: u32,
  /// Alignment block for interaction-data arrays, a power of two.
  pub block_size: u32,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      n_max: 0,
      n_min: 0,
      ascc: true,
      rung_active: 0.0,
      load: Props::empty(),
      tol: 0,
      n_domain: 0,
      block_size: 4,
    }
  }
}

/// Configuration rejected by [`BuildConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  #[error("n_min ({n_min}) exceeds n_max ({n_max})")]
  MinExceedsMax { n_min: u32, n_max: u32 },
  #[error("n_max ({0}) exceeds the supported maximum of {MAX_N_MAX}")]
  MaxTooLarge(u32),
  #[error("n_max/n_min ratio ({0}) exceeds the supported maximum of {MAX_RATIO}")]
  RatioTooLarge(u32),
  #[error("block_size ({0}) must be a power of two in 1..={MAX_BLOCK_SIZE}")]
  BadBlockSize(u32),
}

/// A validated configuration with all defaults filled in.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Resolved {
  pub n_max: u32,
  pub n_min: u32,
  pub ascc: bool,
  pub rung_active: f32,
  pub load: Props,
  pub tol: u32,
  pub n_domain: u32,
  pub block_size: u32,
}

impl BuildConfig {
  /// Validate and fill in defaults. `nsub` is the octant count of the
  /// point type (4 in 2D, 8 in 3D).
  pub(crate) fn resolve(&self, nsub: u32) -> Result<Resolved, ConfigError> {
    let n_max = if self.n_max == 0 { nsub } else { self.n_max };
    if n_max > MAX_N_MAX {
      return Err(ConfigError::MaxTooLarge(n_max));
    }
    let n_min = if self.n_min == 0 {
      2.min(n_max)
    } else {
      self.n_min
    };
    if n_min > n_max {
      return Err(ConfigError::MinExceedsMax { n_min, n_max });
    }
    if n_max / n_min > MAX_RATIO {
      return Err(ConfigError::RatioTooLarge(n_max / n_min));
    }
    if self.block_size == 0
      || self.block_size > MAX_BLOCK_SIZE
      || !self.block_size.is_power_of_two()
    {
      return Err(ConfigError::BadBlockSize(self.block_size));
    }
    let n_domain = if self.n_domain == 0 {
      rayon::current_num_threads() as u32
    } else {
      self.n_domain
    };
    Ok(Resolved {
      n_max,
      n_min,
      ascc: self.ascc,
      rung_active: self.rung_active,
      load: self.load,
      tol: self.tol,
      n_domain,
      block_size: self.block_size,
    })
  }
}

impl Resolved {
  /// Default split tolerance for `n` particles over the configured
  /// domain count: generous enough to snap to shallow box edges, never
  /// below one particle.
  pub fn tolerance(&self, n: u32) -> u32 {
    if self.tol != 0 {
      return self.tol;
    }
    let d = self.n_domain.max(1) as u64;
    ((n as u64 / (8 * d * d)) as u32).max(1)
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
