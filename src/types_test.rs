use super::*;

/// Invalid sentinels are the all-ones bit pattern and never a usable index.
#[test]
fn invalid_sentinels() {
  assert!(Leaf::INVALID.is_invalid());
  assert!(ExtLeaf::INVALID.is_invalid());
  assert!(CellId::INVALID.is_invalid());
  assert!(!Leaf(0).is_invalid());
  assert!(!CellId(12345).is_invalid());
}

/// Handles format as dotted identifiers with fixed-width indices.
#[test]
fn display_formats() {
  assert_eq!(format!("{}", Leaf(123)), "L.0000123");
  assert_eq!(format!("{}", CellId(45)), "C.0000045");
  assert_eq!(format!("{}", ExtLeaf(7)), "E.007");
  assert_eq!(format!("{}", Leaf::INVALID), "L.invalid");
}

/// Ranges are half-open and iterate in ascending index order.
#[test]
fn leaf_range_iteration() {
  let r = LeafRange::new(3, 7);
  assert_eq!(r.len(), 4);
  assert!(!r.is_empty());
  assert!(r.contains(Leaf(3)));
  assert!(r.contains(Leaf(6)));
  assert!(!r.contains(Leaf(7)));

  let got: Vec<Leaf> = r.iter().collect();
  assert_eq!(got, vec![Leaf(3), Leaf(4), Leaf(5), Leaf(6)]);

  let rev: Vec<Leaf> = r.iter().rev().collect();
  assert_eq!(rev.first(), Some(&Leaf(6)));
}

#[test]
fn empty_ranges() {
  let r = CellRange::new(5, 5);
  assert!(r.is_empty());
  assert_eq!(r.iter().count(), 0);
  assert!(!r.contains(CellId(5)));
}

#[test]
fn props_combine() {
  let p = Props::RUNG | Props::MASS;
  assert!(p.contains(Props::RUNG));
  assert!(!p.contains(Props::SIZE_SQ));
  assert_eq!(Props::empty().bits(), 0);
}
