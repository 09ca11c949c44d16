//! dot_tree - hierarchical spatial indexing for large particle sets
//!
//! This crate builds an oct-tree (quad-tree in 2D) over up to ~4 billion
//! particles and exposes it as a flat, cache-friendly store of leaves and
//! cells. Construction runs in two phases: a mutable box-dot phase that
//! sorts particles into cubic boxes, followed by a linking phase that
//! compacts the result into contiguous arrays in depth-first order.
//!
//! Builds can be partitioned into per-domain subtrees and run on a rayon
//! pool; the shared top of the tree is linked by a single thread.
//!
//! # Example
//!
//! ```ignore
//! use dot_tree::{BuildConfig, OctTree, VecInit};
//! use glam::DVec3;
//!
//! let positions: Vec<DVec3> = load_snapshot();
//! let init = VecInit::new(positions);
//! let tree = OctTree::build(&init, BuildConfig::default())?;
//!
//! println!("{} leaves in {} cells, depth {}",
//!     tree.n_leaf(), tree.n_cell(), tree.depth());
//! ```

pub mod config;
pub mod geometry;
pub mod init;
pub mod types;

// Re-export commonly used items
pub use config::{BuildConfig, ConfigError, MAX_N_MAX, MAX_RATIO};
pub use geometry::{Cube, PeriodicBox, Point, MAX_DEPTH};
pub use init::{Dot, Initialiser, PropertyInitialiser, VecInit};
pub use types::{CellId, CellRange, ExtLeaf, Leaf, LeafRange, ParticleKey, Props, INVALID_KEY};

// Box-dot phase: mutable octant subdivision of the particle set
pub(crate) mod boxdot;

// Domain decomposition over the box-dot tree
pub mod domain;
pub use domain::DomainData;

// Linking phase: compaction into flat arrays
pub(crate) mod link;

// The finished tree
pub mod tree;
pub use tree::{BuildError, OctTree};

// Traversal engine: up/down passes and pruned depth-first walks
pub mod walk;
pub use walk::{
  loop_cells_down, loop_cells_down_par, loop_cells_up, pass_up, pass_up_par, walk, walk_domains,
  PassUp, WalkProcessor,
};

// Per-leaf interaction data (masses, sizes) layered over a finished tree
pub mod interact;
pub use interact::InteractionData;
