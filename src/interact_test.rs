use glam::DVec3;

use super::*;
use crate::config::BuildConfig;
use crate::init::{Initialiser, VecInit};
use crate::types::ParticleKey;

fn scattered(n: usize) -> Vec<DVec3> {
  (0..n)
    .map(|i| {
      let f = i as f64 * 0.6180339887;
      DVec3::new(
        f.fract() * 2.0 - 1.0,
        (f * 3.0).fract() * 2.0 - 1.0,
        (f * 7.0).fract() * 2.0 - 1.0,
      )
    })
    .collect()
}

struct KeyProps;

impl PropertyInitialiser for KeyProps {
  fn init_mass(&self, keys: &[ParticleKey], mass: &mut [f64]) {
    for (k, m) in keys.iter().zip(mass.iter_mut()) {
      *m = 1.0 + *k as f64;
    }
  }

  fn init_size_sq(&self, keys: &[ParticleKey], size_sq: &mut [f64]) {
    for (k, s) in keys.iter().zip(size_sq.iter_mut()) {
      *s = 0.01 * (1 + *k) as f64;
    }
  }
}

fn build(n: usize, block_size: u32) -> crate::tree::OctTree<DVec3> {
  let cfg = BuildConfig {
    n_domain: 1,
    block_size,
    ..Default::default()
  };
  crate::tree::OctTree::build(&VecInit::new(scattered(n)), cfg).unwrap()
}

/// Masses and sizes land on the leaves matching their keys.
#[test]
fn properties_follow_the_leaf_order() {
  let tree = build(100, 4);
  let data = InteractionData::build(&tree, &KeyProps, Props::MASS | Props::SIZE_SQ);

  assert!(data.have_mass());
  assert!(data.have_size_sq());
  for l in tree.leaves().iter() {
    let k = tree.key(l);
    assert_eq!(data.mass(l), 1.0 + k as f64);
    assert_eq!(data.size_sq(l), 0.01 * (1 + k) as f64);
  }
}

/// Arrays are padded to whole blocks and padding reads as zero.
#[test]
fn blocks_are_aligned_and_padded() {
  // 10 leaves with block size 4: padded length 12, two zero slots
  let tree = build(10, 4);
  let data = InteractionData::build(&tree, &KeyProps, Props::MASS);

  let l = Leaf(9);
  let block = data.mass_block(l);
  assert_eq!(block.len(), 4);
  assert_eq!(block[0], data.mass(Leaf(8)));
  assert_eq!(block[1], data.mass(Leaf(9)));
  assert_eq!(block[2], 0.0);
  assert_eq!(block[3], 0.0);

  // a leaf always sits at its in-block offset
  for i in 0..10u32 {
    let b = data.mass_block(Leaf(i));
    assert_eq!(b.len(), 4);
    assert_eq!(b[(i % 4) as usize], data.mass(Leaf(i)));
  }
}

#[test]
fn unloaded_properties_stay_absent() {
  let tree = build(20, 4);
  let data = InteractionData::build(&tree, &KeyProps, Props::MASS);
  assert!(data.have_mass());
  assert!(!data.have_size_sq());
  assert_eq!(data.block_size(), 4);
}

struct ExtInit {
  inner: Vec<DVec3>,
}

impl Initialiser<DVec3> for ExtInit {
  fn init_internal(&self, _prior: Option<&[ParticleKey]>) -> Vec<crate::init::Dot<DVec3>> {
    self
      .inner
      .iter()
      .enumerate()
      .map(|(i, &p)| crate::init::Dot::new(p, i as ParticleKey))
      .collect()
  }

  fn n_external(&self) -> u32 {
    3
  }

  fn init_external(&self, i: u32) -> crate::init::Dot<DVec3> {
    crate::init::Dot::new(DVec3::splat(4.0 + i as f64), 100 + i)
  }
}

/// External leaves get their own property arrays, keyed the same way.
#[test]
fn external_properties_are_loaded() {
  let init = ExtInit {
    inner: scattered(30),
  };
  let cfg = BuildConfig {
    n_domain: 1,
    ..Default::default()
  };
  let tree = crate::tree::OctTree::build(&init, cfg).unwrap();
  let data = InteractionData::build(&tree, &KeyProps, Props::MASS);

  for (i, e) in tree.ext_leaves().enumerate() {
    assert_eq!(data.ext_mass(e), 1.0 + (100 + i) as f64);
  }
}
