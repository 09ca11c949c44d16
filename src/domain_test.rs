use glam::DVec3;

use super::*;
use crate::boxdot::BoxDotTree;
use crate::geometry::Cube;
use crate::init::Dot;

/// Two clusters of eight dots, one per sub-octant, in opposite root
/// octants. The box boundary between the clusters sits at dot 8.
fn two_cluster_tree() -> BoxDotTree<DVec3> {
  let mut positions = Vec::new();
  for &base in &[DVec3::splat(-0.5), DVec3::splat(0.5)] {
    for o in 0..8u8 {
      positions.push(base.shifted(o, 0.25));
    }
  }
  let dots: Vec<Dot<DVec3>> = positions
    .iter()
    .enumerate()
    .map(|(i, &p)| Dot::new(p, i as u32))
    .collect();
  BoxDotTree::build(dots, Cube::new(DVec3::ZERO, 1.0), 1)
}

/// An equal-share cut snaps exactly to the box edge between clusters.
#[test]
fn cut_snaps_to_box_boundary() {
  let bd = two_cluster_tree();
  let plan = plan(&bd, 2, 1, 1);
  assert_eq!(plan.cuts, vec![0, 8, 16]);
  assert_eq!(plan.n_domain(), 2);
}

/// With a generous tolerance the cut still prefers the boundary closest
/// to the target.
#[test]
fn cut_prefers_closest_boundary() {
  let bd = two_cluster_tree();
  // target for d=1 of 2 domains is 8; boundaries 7 and 9 exist one
  // level down, 8 at the top. 8 must win.
  let plan = plan(&bd, 2, 4, 1);
  assert_eq!(plan.cuts[1], 8);
}

/// Coincident dots give a terminal box no cut can snap to; the cut then
/// falls at the target itself, splitting the box between domains.
#[test]
fn terminal_box_is_cut_at_target() {
  let dots: Vec<Dot<DVec3>> = (0..16).map(|i| Dot::new(DVec3::splat(0.3), i)).collect();
  let bd = BoxDotTree::build(dots, Cube::new(DVec3::ZERO, 1.0), 1);
  let p = plan(&bd, 2, 1, 1);
  assert_eq!(p.cuts, vec![0, 8, 16]);
  assert!(p.splits(0, 16));
  assert!(!p.splits(0, 8));
}

/// The domain count is clamped so each domain can hold n_max particles.
#[test]
fn domain_count_clamps_to_particle_count() {
  let dots: Vec<Dot<DVec3>> = (0..10)
    .map(|i| Dot::new(DVec3::splat(-0.9 + 0.17 * i as f64), i))
    .collect();
  let bd = BoxDotTree::build(dots, Cube::new(DVec3::ZERO, 1.0), 8);
  let p = plan(&bd, 4, 1, 8);
  assert_eq!(p.cuts, vec![0, 10]);
  assert_eq!(p.n_domain(), 1);
}

#[test]
fn domain_of_handles_cut_positions() {
  let p = DomainPlan {
    cuts: vec![0, 8, 16],
  };
  assert_eq!(p.domain_of(0), 0);
  assert_eq!(p.domain_of(7), 0);
  assert_eq!(p.domain_of(8), 1);
  assert_eq!(p.domain_of(15), 1);
}

#[test]
fn empty_domains_are_skipped() {
  let p = DomainPlan {
    cuts: vec![0, 5, 5, 10],
  };
  assert_eq!(p.domain_of(4), 0);
  assert_eq!(p.domain_of(5), 2);
}
