use super::*;

#[test]
fn defaults_resolve_from_octant_count() {
  let r = BuildConfig::default().resolve(8).unwrap();
  assert_eq!(r.n_max, 8);
  assert_eq!(r.n_min, 2);
  assert!(r.ascc);
  assert!(r.n_domain >= 1);

  let r2 = BuildConfig::default().resolve(4).unwrap();
  assert_eq!(r2.n_max, 4);
}

#[test]
fn n_min_defaults_to_at_most_two() {
  let cfg = BuildConfig {
    n_max: 1,
    ..Default::default()
  };
  let r = cfg.resolve(8).unwrap();
  assert_eq!(r.n_min, 1);
}

#[test]
fn rejects_min_over_max() {
  let cfg = BuildConfig {
    n_max: 4,
    n_min: 5,
    ..Default::default()
  };
  assert!(matches!(
    cfg.resolve(8),
    Err(ConfigError::MinExceedsMax { n_min: 5, n_max: 4 })
  ));
}

#[test]
fn rejects_oversized_n_max() {
  let cfg = BuildConfig {
    n_max: 251,
    ..Default::default()
  };
  assert!(matches!(cfg.resolve(8), Err(ConfigError::MaxTooLarge(251))));
}

#[test]
fn rejects_bad_block_size() {
  for bad in [0u32, 3, 6, 128] {
    let cfg = BuildConfig {
      block_size: bad,
      ..Default::default()
    };
    assert!(
      matches!(cfg.resolve(8), Err(ConfigError::BadBlockSize(b)) if b == bad),
      "block_size {bad} should be rejected"
    );
  }
  for good in [1u32, 2, 4, 8, 16, 32, 64] {
    let cfg = BuildConfig {
      block_size: good,
      ..Default::default()
    };
    assert!(cfg.resolve(8).is_ok(), "block_size {good} should be accepted");
  }
}

#[test]
fn default_tolerance_scales_with_particle_count() {
  let cfg = BuildConfig {
    n_domain: 4,
    ..Default::default()
  };
  let r = cfg.resolve(8).unwrap();
  assert_eq!(r.tolerance(1_280_000), 10_000);
  // tiny sets still get a tolerance of at least one particle
  assert_eq!(r.tolerance(10), 1);

  // an explicit tolerance wins
  let cfg = BuildConfig {
    n_domain: 4,
    tol: 77,
    ..Default::default()
  };
  assert_eq!(cfg.resolve(8).unwrap().tolerance(1_000_000), 77);
}
