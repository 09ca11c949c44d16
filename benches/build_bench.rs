//! Tree construction benchmarks.
//!
//! Measures the full build (box-dot phase plus linking) over particle
//! distributions with very different clustering:
//! - **uniform**: low-discrepancy fill of the unit cube
//! - **clustered**: Plummer-like radial concentration
//!
//! Each distribution runs serial and domain-parallel builds at several
//! particle counts, plus a query benchmark over a finished tree.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dot_tree::{BuildConfig, OctTree, VecInit};
use glam::DVec3;

/// Low-discrepancy positions in the unit cube.
fn uniform(n: usize) -> Vec<DVec3> {
  (0..n)
    .map(|i| {
      let f = i as f64;
      DVec3::new(
        (f * 0.7548776662).fract() * 2.0 - 1.0,
        (f * 0.5698402910).fract() * 2.0 - 1.0,
        (f * 0.3287194560).fract() * 2.0 - 1.0,
      )
    })
    .collect()
}

/// Centrally concentrated positions, roughly a Plummer sphere.
fn clustered(n: usize) -> Vec<DVec3> {
  uniform(n)
    .into_iter()
    .map(|u| {
      let r = 0.5 * (u.x * 0.5 + 0.5).powi(3) + 1e-3;
      let dir = DVec3::new(u.y, u.z, (u.x * 13.0).sin()).normalize_or_zero();
      dir * r
    })
    .collect()
}

fn bench_build(c: &mut Criterion) {
  let mut group = c.benchmark_group("build");
  for &n in &[10_000usize, 100_000, 1_000_000] {
    for (name, positions) in [("uniform", uniform(n)), ("clustered", clustered(n))] {
      group.bench_with_input(
        BenchmarkId::new(format!("{name}/serial"), n),
        &positions,
        |b, positions| {
          let init = VecInit::new(positions.clone());
          let cfg = BuildConfig {
            n_domain: 1,
            ..Default::default()
          };
          b.iter(|| black_box(OctTree::build(&init, cfg).unwrap()));
        },
      );
      group.bench_with_input(
        BenchmarkId::new(format!("{name}/parallel"), n),
        &positions,
        |b, positions| {
          let init = VecInit::new(positions.clone());
          let cfg = BuildConfig::default();
          b.iter(|| black_box(OctTree::build(&init, cfg).unwrap()));
        },
      );
    }
  }
  group.finish();
}

fn bench_queries(c: &mut Criterion) {
  let positions = uniform(100_000);
  let tree = OctTree::build(&VecInit::new(positions.clone()), BuildConfig::default()).unwrap();

  c.bench_function("smallest_cell_containing", |b| {
    let mut i = 0usize;
    b.iter(|| {
      i = (i + 7919) % positions.len();
      black_box(tree.smallest_cell_containing(black_box(positions[i])))
    });
  });

  c.bench_function("find_particle", |b| {
    let mut i = 0usize;
    b.iter(|| {
      i = (i + 7919) % positions.len();
      black_box(tree.find_particle(black_box(i as u32), positions[i]))
    });
  });
}

criterion_group!(benches, bench_build, bench_queries);
criterion_main!(benches);
