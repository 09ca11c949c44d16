//! The finished tree: a flat, immutable store of leaves and cells.
//!
//! All per-leaf and per-cell data live in parallel arrays indexed by the
//! typed handles from [`crate::types`]. A build runs the box-dot phase,
//! optionally a domain decomposition, and the linking phase; the result
//! only changes through [`OctTree::rebuild`].

use std::io::{self, Write};
use std::time::Instant;

use tracing::{debug, warn};

use crate::boxdot::BoxDotTree;
use crate::config::{BuildConfig, ConfigError, Resolved};
use crate::domain::{self, DomainData};
use crate::geometry::{Cube, PeriodicBox, Point};
use crate::init::Initialiser;
use crate::link::{self, TreeArrays, NO_CELL};
use crate::types::{CellId, CellRange, ExtLeaf, Leaf, LeafRange, ParticleKey, Props};

/// Build failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("particle count {0} exceeds the u32 index range")]
  TooManyParticles(usize),
}

/// Hierarchical spatial index over a set of particles.
pub struct OctTree<P: Point> {
  pub(crate) store: TreeArrays<P>,

  // per-leaf rung data, empty unless Props::RUNG was loaded
  pub(crate) rung: Vec<f32>,
  pub(crate) flag: Vec<u8>,
  pub(crate) n_active: Vec<u32>,

  // external particles
  pub(crate) ext_pos: Vec<P>,
  pub(crate) ext_key: Vec<ParticleKey>,
  pub(crate) ext_rung: Vec<f32>,
  pub(crate) ext_flag: Vec<u8>,

  boundary: Option<PeriodicBox<P>>,
  cfg: Resolved,
  n_build: u32,
}

impl<P: Point> OctTree<P> {
  /// Build a tree from scratch.
  pub fn build(init: &dyn Initialiser<P>, cfg: BuildConfig) -> Result<Self, BuildError> {
    let resolved = cfg.resolve(P::NSUB as u32)?;
    Self::build_impl(init, resolved, None, 1)
  }

  /// Build a replacement tree from the same source. The previous leaf
  /// order is handed to the initialiser so it can emit dots with the
  /// old locality. `cfg.n_max == 0` keeps every parameter of the
  /// previous build.
  pub fn rebuild(&mut self, init: &dyn Initialiser<P>, cfg: BuildConfig) -> Result<(), BuildError> {
    let resolved = if cfg.n_max == 0 {
      self.cfg
    } else {
      cfg.resolve(P::NSUB as u32)?
    };
    let next = Self::build_impl(init, resolved, Some(&self.store.leaf_key), self.n_build + 1)?;
    *self = next;
    Ok(())
  }

  fn build_impl(
    init: &dyn Initialiser<P>,
    cfg: Resolved,
    prior: Option<&[ParticleKey]>,
    n_build: u32,
  ) -> Result<Self, BuildError> {
    let started = Instant::now();
    let boundary = init.boundary();
    let mut dots = init.init_internal(prior);
    if dots.len() >= u32::MAX as usize {
      return Err(BuildError::TooManyParticles(dots.len()));
    }
    let n = dots.len() as u32;

    if let Some(pb) = &boundary {
      let mut stray = 0u32;
      for d in dots.iter_mut() {
        if !pb.conforms(d.pos) {
          d.pos = pb.wrap(d.pos);
          stray += 1;
        }
      }
      if stray > 0 {
        warn!(stray, "positions outside the periodic box were wrapped");
      }
    }

    let root_cube = match &boundary {
      Some(pb) => pb.root_cube(),
      None => Cube::fitting(dots.iter().map(|d| d.pos)),
    };
    let bd = BoxDotTree::build(dots, root_cube, cfg.n_max);

    let store = if cfg.n_domain > 1 {
      let plan = domain::plan(&bd, cfg.n_domain, cfg.tolerance(n), cfg.n_max);
      link::link_parallel(&bd, &plan, cfg.n_min, cfg.ascc)
    } else {
      link::link_serial(&bd, cfg.n_min, cfg.ascc)
    };

    let n_ext = init.n_external();
    let mut ext_pos = Vec::with_capacity(n_ext as usize);
    let mut ext_key = Vec::with_capacity(n_ext as usize);
    for i in 0..n_ext {
      let mut d = init.init_external(i);
      if let Some(pb) = &boundary {
        d.pos = pb.wrap(d.pos);
      }
      ext_pos.push(d.pos);
      ext_key.push(d.key);
    }

    let mut tree = Self {
      store,
      rung: Vec::new(),
      flag: Vec::new(),
      n_active: Vec::new(),
      ext_pos,
      ext_key,
      ext_rung: Vec::new(),
      ext_flag: Vec::new(),
      boundary,
      cfg,
      n_build,
    };
    if cfg.load.contains(Props::RUNG) {
      tree.load_rungs(init);
    }

    debug!(
      n,
      n_cell = tree.n_cell(),
      n_domain = tree.n_domain(),
      depth = tree.depth(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      rebuild = n_build > 1,
      "tree built"
    );
    Ok(tree)
  }

  /// Pull rungs through the initialiser and derive activity flags and
  /// per-cell active counts.
  fn load_rungs(&mut self, init: &dyn Initialiser<P>) {
    let n = self.n_leaf() as usize;
    self.rung = vec![0.0; n];
    init.init_rungs(&self.store.leaf_key, &mut self.rung);
    let ract = self.cfg.rung_active;
    self.flag = self.rung.iter().map(|&r| (r >= ract) as u8).collect();

    let n_ext = self.ext_pos.len();
    self.ext_rung = vec![0.0; n_ext];
    if n_ext > 0 {
      init.init_rungs(&self.ext_key, &mut self.ext_rung);
    }
    self.ext_flag = self.ext_rung.iter().map(|&r| (r >= ract) as u8).collect();

    // children always carry a larger index, so a reverse sweep sees
    // every daughter before its parent
    let n_cell = self.n_cell() as usize;
    self.n_active = vec![0; n_cell];
    for c in (0..n_cell).rev() {
      let mut na: u32 = self
        .leaf_kids(CellId(c as u32))
        .iter()
        .map(|l| self.flag[l.index()] as u32)
        .sum();
      for dc in self.daughters(CellId(c as u32)).iter() {
        na += self.n_active[dc.index()];
      }
      self.n_active[c] = na;
    }
  }

  // counts

  pub fn n_leaf(&self) -> u32 {
    self.store.leaf_pos.len() as u32
  }

  pub fn n_cell(&self) -> u32 {
    self.store.cell_cube.len() as u32
  }

  pub fn n_ext(&self) -> u32 {
    self.ext_pos.len() as u32
  }

  /// Cells of the shared top tree (zero in a serial layout).
  pub fn n_top_cell(&self) -> u32 {
    self.store.n_top
  }

  pub fn n_domain(&self) -> u32 {
    self.store.domains.len() as u32
  }

  /// How many times this tree has been built (1 after `build`).
  pub fn n_build(&self) -> u32 {
    self.n_build
  }

  pub fn depth(&self) -> u8 {
    self.store.cell_depth[0]
  }

  pub fn boundary(&self) -> Option<PeriodicBox<P>> {
    self.boundary
  }

  /// Effective `n_max` of this build.
  pub fn n_max(&self) -> u32 {
    self.cfg.n_max
  }

  /// Effective `n_min` of this build.
  pub fn n_min(&self) -> u32 {
    self.cfg.n_min
  }

  /// Alignment block for interaction-data arrays.
  pub fn block_size(&self) -> u32 {
    self.cfg.block_size
  }

  pub fn root(&self) -> CellId {
    CellId(0)
  }

  pub fn root_cube(&self) -> Cube<P> {
    self.store.cell_cube[0]
  }

  /// Whether per-leaf rungs and activity flags were loaded.
  pub fn have_rungs(&self) -> bool {
    !self.n_active.is_empty()
  }

  /// All leaves in index order.
  pub fn leaves(&self) -> LeafRange {
    LeafRange::new(0, self.n_leaf())
  }

  /// All cells in index order (parents before daughters).
  pub fn cells(&self) -> CellRange {
    CellRange::new(0, self.n_cell())
  }

  pub fn ext_leaves(&self) -> impl DoubleEndedIterator<Item = ExtLeaf> {
    (0..self.n_ext()).map(ExtLeaf)
  }

  pub fn domains(&self) -> &[DomainData] {
    &self.store.domains
  }

  pub fn domain(&self, d: u32) -> &DomainData {
    &self.store.domains[d as usize]
  }

  // leaf accessors

  pub fn pos(&self, l: Leaf) -> P {
    self.store.leaf_pos[l.index()]
  }

  pub fn key(&self, l: Leaf) -> ParticleKey {
    self.store.leaf_key[l.index()]
  }

  /// All leaf keys in leaf order.
  pub fn leaf_keys(&self) -> &[ParticleKey] {
    &self.store.leaf_key
  }

  /// All external keys in external-leaf order.
  pub fn ext_keys(&self) -> &[ParticleKey] {
    &self.ext_key
  }

  pub fn leaf_parent(&self, l: Leaf) -> CellId {
    CellId(self.store.leaf_parent[l.index()])
  }

  pub fn rung(&self, l: Leaf) -> f32 {
    self.rung[l.index()]
  }

  pub fn is_active(&self, l: Leaf) -> bool {
    self.flag[l.index()] != 0
  }

  pub fn ext_pos(&self, e: ExtLeaf) -> P {
    self.ext_pos[e.index()]
  }

  pub fn ext_key(&self, e: ExtLeaf) -> ParticleKey {
    self.ext_key[e.index()]
  }

  pub fn ext_rung(&self, e: ExtLeaf) -> f32 {
    self.ext_rung[e.index()]
  }

  pub fn ext_is_active(&self, e: ExtLeaf) -> bool {
    self.ext_flag[e.index()] != 0
  }

  // cell accessors

  pub fn cube(&self, c: CellId) -> Cube<P> {
    self.store.cell_cube[c.index()]
  }

  /// True subdivision level of the cell's cube below the root cube.
  pub fn level(&self, c: CellId) -> u8 {
    self.store.cell_level[c.index()]
  }

  /// Octant of this cell within its parent cell's cube.
  pub fn octant(&self, c: CellId) -> u8 {
    self.store.cell_octant[c.index()]
  }

  /// All leaves of the cell's subtree, a contiguous range.
  pub fn leaves_of(&self, c: CellId) -> LeafRange {
    let begin = self.store.cell_leaf0[c.index()];
    LeafRange::new(begin, begin + self.store.cell_n_leaves[c.index()])
  }

  /// The cell's own leaf kids: the head of its leaf range.
  pub fn leaf_kids(&self, c: CellId) -> LeafRange {
    let begin = self.store.cell_leaf0[c.index()];
    LeafRange::new(begin, begin + self.store.cell_n_leaf_kids[c.index()])
  }

  pub fn n_leaves(&self, c: CellId) -> u32 {
    self.store.cell_n_leaves[c.index()]
  }

  pub fn n_leaf_kids(&self, c: CellId) -> u32 {
    self.store.cell_n_leaf_kids[c.index()]
  }

  /// Daughter cells, a contiguous range (empty for a leaf-only cell).
  pub fn daughters(&self, c: CellId) -> CellRange {
    let c0 = self.store.cell_cell0[c.index()];
    if c0 == NO_CELL {
      CellRange::new(0, 0)
    } else {
      CellRange::new(c0, c0 + self.store.cell_n_cells[c.index()] as u32)
    }
  }

  pub fn n_daughters(&self, c: CellId) -> u32 {
    self.store.cell_n_cells[c.index()] as u32
  }

  /// The cell and all its descendants. Exact in a serial layout; for
  /// shared top cells of a parallel layout the end is an upper bound.
  pub fn twig(&self, c: CellId) -> CellRange {
    CellRange::new(c.0, self.store.cell_twig_end[c.index()])
  }

  pub fn parent(&self, c: CellId) -> CellId {
    CellId(self.store.cell_parent[c.index()])
  }

  /// Height of the subtree hanging off this cell (0 for leaf-only).
  pub fn cell_depth(&self, c: CellId) -> u8 {
    self.store.cell_depth[c.index()]
  }

  /// Number of active leaves in the subtree; requires loaded rungs.
  pub fn n_active(&self, c: CellId) -> u32 {
    self.n_active[c.index()]
  }

  /// Whether the cell belongs to the shared top tree of a parallel
  /// layout (branch cells included).
  pub fn is_top(&self, c: CellId) -> bool {
    c.0 < self.store.n_top
  }

  /// Cells of the shared top tree, in index order.
  pub fn top_cells(&self) -> CellRange {
    CellRange::new(0, self.store.n_top)
  }

  pub fn is_root(&self, c: CellId) -> bool {
    c.0 == 0
  }

  /// Whether the cell has no daughters.
  pub fn is_final(&self, c: CellId) -> bool {
    self.store.cell_n_cells[c.index()] == 0
  }

  /// Whether the cell is the topmost cell of some domain.
  pub fn is_branch(&self, c: CellId) -> bool {
    self.store.domains.iter().any(|d| d.branches().contains(&c))
  }

  /// Whether leaf `l` descends from cell `c`.
  pub fn contains(&self, c: CellId, l: Leaf) -> bool {
    self.leaves_of(c).contains(l)
  }

  /// Domain owning the cell. A cell of a domain block belongs to that
  /// domain; a top cell to the first domain its leaves touch.
  pub fn domain_of(&self, c: CellId) -> u32 {
    let l0 = Leaf(self.store.cell_leaf0[c.index()]);
    self
      .store
      .domains
      .iter()
      .position(|d| d.cells().contains(c) || d.leaves().contains(l0))
      .unwrap_or(0) as u32
  }

  fn leaf_domain(&self, l: Leaf) -> u32 {
    self
      .store
      .domains
      .iter()
      .position(|d| d.leaves().contains(l))
      .unwrap_or(0) as u32
  }

  /// First domain contributing leaves to the cell's subtree.
  pub fn first_domain(&self, c: CellId) -> u32 {
    self.leaf_domain(Leaf(self.store.cell_leaf0[c.index()]))
  }

  /// Number of domains contributing leaves to the cell's subtree.
  /// Domain leaf ranges are contiguous, so the span runs from the
  /// domain of the first descendant leaf to that of the last.
  pub fn n_domains_of(&self, c: CellId) -> u32 {
    let nm = self.store.cell_n_leaves[c.index()];
    if nm == 0 {
      return 0;
    }
    let last = Leaf(self.store.cell_leaf0[c.index()] + nm - 1);
    1 + self.leaf_domain(last) - self.first_domain(c)
  }

  /// Number of aligned leaf blocks covering all leaves.
  pub fn n_leaf_blocks(&self) -> u32 {
    self.n_leaf().div_ceil(self.cfg.block_size)
  }

  /// Aligned leaf blocks in index order; the last block is cut short at
  /// the leaf count.
  pub fn leaf_blocks(&self) -> impl Iterator<Item = LeafRange> + '_ {
    let bs = self.cfg.block_size;
    let n = self.n_leaf();
    (0..self.n_leaf_blocks()).map(move |b| LeafRange::new(b * bs, ((b + 1) * bs).min(n)))
  }

  // navigation

  /// The smallest cell whose cube contains `x`. Positions outside the
  /// root cube fall back to the root; periodic boundaries wrap first.
  pub fn smallest_cell_containing(&self, x: P) -> CellId {
    let x = match &self.boundary {
      Some(pb) => pb.wrap(x),
      None => x,
    };
    let mut c = self.root();
    if !self.root_cube().contains(x) {
      return c;
    }
    loop {
      let next = self
        .daughters(c)
        .iter()
        .find(|&dc| self.cube(dc).contains(x));
      match next {
        Some(dc) => c = dc,
        None => return c,
      }
    }
  }

  /// The leaf carrying `key` at position `x`, or the invalid sentinel
  /// when `key` is not there (even if it is present elsewhere).
  ///
  /// A leaf at `x` is always a leaf kid of the smallest cell containing
  /// `x`, so only that cell's kids are scanned.
  pub fn find_particle(&self, key: ParticleKey, x: P) -> Leaf {
    let x = match &self.boundary {
      Some(pb) => pb.wrap(x),
      None => x,
    };
    let c = self.smallest_cell_containing(x);
    self
      .leaf_kids(c)
      .iter()
      .find(|&l| self.key(l) == key)
      .unwrap_or(Leaf::INVALID)
  }

  // dumps

  /// Write one line per leaf: handle, key, parent cell and position.
  pub fn dump_leaves<W: Write>(&self, w: &mut W) -> io::Result<()> {
    let rungs = self.have_rungs();
    if rungs {
      writeln!(w, "{:>9} {:>9} {:>9} {:>6} {:>2}  position", "leaf", "key", "parent", "rung", "ac")?;
    } else {
      writeln!(w, "{:>9} {:>9} {:>9}  position", "leaf", "key", "parent")?;
    }
    for l in self.leaves().iter() {
      if rungs {
        writeln!(
          w,
          "{} {:9} {} {:6.1} {:2}  {:?}",
          l,
          self.key(l),
          self.leaf_parent(l),
          self.rung(l),
          self.flag[l.index()],
          self.pos(l)
        )?;
      } else {
        writeln!(w, "{} {:9} {}  {:?}", l, self.key(l), self.leaf_parent(l), self.pos(l))?;
      }
    }
    Ok(())
  }

  /// Write one line per cell: handle, level, octant, counts, links and
  /// cube geometry.
  pub fn dump_cells<W: Write>(&self, w: &mut W) -> io::Result<()> {
    writeln!(
      w,
      "{:>9} {:>3} {:>3} {:>9} {:>7} {:>7} {:>9} {:>2} {:>9} {:>9} {:>3}  centre/half",
      "cell", "lev", "oct", "leaf0", "nkids", "nleaf", "cell0", "nc", "twigend", "parent", "dp"
    )?;
    for c in self.cells().iter() {
      let i = c.index();
      writeln!(
        w,
        "{} {:3} {:3} {:9} {:7} {:7} {:>9} {:2} {:9} {:>9} {:3}  {:?} {:.6e}",
        c,
        self.store.cell_level[i],
        self.store.cell_octant[i],
        self.store.cell_leaf0[i],
        self.store.cell_n_leaf_kids[i],
        self.store.cell_n_leaves[i],
        CellId(self.store.cell_cell0[i]),
        self.store.cell_n_cells[i],
        self.store.cell_twig_end[i],
        CellId(self.store.cell_parent[i]),
        self.store.cell_depth[i],
        self.cube(c).centre,
        self.cube(c).half,
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
