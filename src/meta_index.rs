//! Meta-index (§4.5): per-partition synopses plus candidate-set selection.
//! Deciding whether a whole partition can be skipped for a query is kept
//! separate from evaluating rows inside it ([`crate::partition::Partition`]),
//! so recovery after a restart only needs the (small) synopses, not the
//! (large) value indexes.

use crate::expr::ast::{Attribute, Expression, Operand, Predicate, RelOp};
use crate::partition::Slice;
use crate::schema::Layout;
use crate::synopsis::{BloomSynopsis, BooleanPairSynopsis, MinMaxSynopsis, Synopsis};
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Bloom-filter sizing knobs the meta-index's own synopses are built with
/// (§6 `address-synopsis-fp-rate`, `string-synopsis-fp-rate`).
#[derive(Clone, Debug)]
pub struct SynopsisLimits {
	pub address_fp_rate: f64,
	pub string_fp_rate: f64,
	pub bloom_expected_items: usize,
}

impl Default for SynopsisLimits {
	fn default() -> Self {
		Self {
			address_fp_rate: 0.01,
			string_fp_rate: 0.01,
			bloom_expected_items: 4096,
		}
	}
}

fn make_synopsis(type_name: &str, limits: &SynopsisLimits) -> Option<Box<dyn Synopsis>> {
	match type_name {
		"addr" | "address" => Some(Box::new(BloomSynopsis::new(limits.bloom_expected_items, limits.address_fp_rate))),
		"string" => Some(Box::new(BloomSynopsis::new(limits.bloom_expected_items, limits.string_fp_rate))),
		"int" | "real" | "timestamp" | "duration" => Some(Box::new(MinMaxSynopsis::new())),
		"bool" => Some(Box::new(BooleanPairSynopsis::new())),
		_ => None,
	}
}

/// String comparison for the `#type` pseudo-column (§4.5): the RHS is always
/// a string literal compared against the partition's layout name.
fn string_cmp(op: RelOp, a: &str, b: &str) -> bool {
	match op {
		RelOp::Eq => a == b,
		RelOp::Ne => a != b,
		RelOp::Lt => a < b,
		RelOp::Le => a <= b,
		RelOp::Gt => a > b,
		RelOp::Ge => a >= b,
		// Unsupported on a pseudo-column: conservative, cannot prune.
		_ => true,
	}
}

/// What the meta-index keeps per partition: its layout (to resolve field and
/// type extractors) and one synopsis per indexed column offset.
pub struct PartitionEntry {
	pub layout: Layout,
	synopses: HashMap<usize, Box<dyn Synopsis>>,
}

impl PartitionEntry {
	pub fn new(layout: Layout) -> Self {
		Self {
			layout,
			synopses: HashMap::new(),
		}
	}
}

/// Per-partition synopsis map plus sorted-UUID candidate selection (§4.5).
#[derive(Default)]
pub struct MetaIndex {
	entries: HashMap<Uuid, PartitionEntry>,
	order: BTreeSet<Uuid>,
	limits: SynopsisLimits,
}

impl MetaIndex {
	pub fn new(limits: SynopsisLimits) -> Self {
		Self {
			entries: HashMap::new(),
			order: BTreeSet::new(),
			limits,
		}
	}

	/// Feeds every non-null, non-`skip` cell of `slice` into this partition's
	/// synopses, creating one on first non-null sight of a synopsis-backed
	/// column type.
	pub fn add(&mut self, id: Uuid, slice: &Slice) {
		self.order.insert(id);
		let entry = self.entries.entry(id).or_insert_with(|| PartitionEntry::new(slice.layout.clone()));
		for (offset, field) in slice.layout.fields.iter().enumerate() {
			if field.has_attribute("skip") {
				continue;
			}
			for row in 0..slice.row_count as usize {
				let Some(v) = slice.cell(offset, row) else {
					continue;
				};
				if !entry.synopses.contains_key(&offset) {
					if let Some(s) = make_synopsis(&field.type_name, &self.limits) {
						entry.synopses.insert(offset, s);
					}
				}
				if let Some(s) = entry.synopses.get_mut(&offset) {
					s.add(v);
				}
			}
		}
	}

	/// Startup recovery (§4.7): installs a synopsis set recovered from a
	/// partition's on-disk header without re-scanning its rows.
	pub fn merge(&mut self, id: Uuid, entry: PartitionEntry) {
		self.order.insert(id);
		self.entries.insert(id, entry);
	}

	pub fn remove(&mut self, id: &Uuid) {
		self.order.remove(id);
		self.entries.remove(id);
	}

	fn all_ids(&self) -> BTreeSet<Uuid> {
		self.order.clone()
	}

	/// `lookup(expr) → sorted [UUID]` (§4.5): always returns a sorted,
	/// duplicate-free vector, since `order`/the set-algebra below are
	/// `BTreeSet`-backed throughout.
	pub fn lookup(&self, expr: &Expression) -> Vec<Uuid> {
		self.lookup_set(expr).into_iter().collect()
	}

	fn lookup_set(&self, expr: &Expression) -> BTreeSet<Uuid> {
		match expr {
			Expression::Predicate(p) => self.matching(p),
			Expression::Conjunction(children) => {
				let mut iter = children.iter();
				let Some(first) = iter.next() else {
					return self.all_ids();
				};
				let mut acc = self.lookup_set(first);
				for child in iter {
					if acc.is_empty() {
						break;
					}
					let next = self.lookup_set(child);
					acc = acc.intersection(&next).copied().collect();
				}
				acc
			}
			Expression::Disjunction(children) => {
				let full = self.all_ids();
				let mut acc = BTreeSet::new();
				for child in children {
					acc.extend(self.lookup_set(child));
					if acc.len() == full.len() {
						break;
					}
				}
				acc
			}
			// Synopses cannot reliably negate (a false positive would become
			// a false negative), so every partition is kept as a candidate.
			Expression::Negation(_) => self.all_ids(),
			Expression::Empty => self.all_ids(),
		}
	}

	fn matching(&self, pred: &Predicate) -> BTreeSet<Uuid> {
		self.order.iter().filter(|id| self.partition_may_match(&self.entries[id], pred)).copied().collect()
	}

	fn partition_may_match(&self, entry: &PartitionEntry, pred: &Predicate) -> bool {
		let (extractor, data, op) = match (&pred.lhs, &pred.rhs) {
			(lhs, Operand::Data(v)) if lhs.is_extractor() => (lhs, v, pred.op),
			(Operand::Data(v), rhs) if rhs.is_extractor() => (rhs, v, pred.op.mirror()),
			// Neither side is a literal: nothing to prune on.
			_ => return true,
		};
		match extractor {
			Operand::AttributeExtractor(Attribute::Type) => match data {
				Value::String(s) => string_cmp(op, &entry.layout.name, s),
				_ => true,
			},
			Operand::AttributeExtractor(Attribute::Field) => match data {
				Value::String(suffix) => {
					let any = (0..entry.layout.fields.len()).any(|i| entry.layout.qualified_name(i).ends_with(suffix.as_str()));
					if op.is_negative() {
						!any
					} else {
						any
					}
				}
				_ => true,
			},
			Operand::AttributeExtractor(Attribute::Timestamp) => {
				let offsets = entry.layout.offsets_with_attribute("timestamp");
				self.any_offset_may_match(entry, &offsets, op, data)
			}
			Operand::FieldExtractor(path) => match entry.layout.offset_of(path) {
				// The field doesn't exist on this layout at all: a row-level
				// `tailor` would error on this partition's events too, so
				// there can never be a match — safe to prune.
				None => false,
				Some(offset) => self.offset_may_match(entry, offset, op, data),
			},
			Operand::TypeExtractor(type_name) => {
				let offsets = entry.layout.offsets_of_type(type_name);
				if offsets.is_empty() {
					return false;
				}
				self.any_offset_may_match(entry, &offsets, op, data)
			}
			Operand::DataExtractor(_, offset) => self.offset_may_match(entry, *offset, op, data),
			Operand::Data(_) => true,
		}
	}

	fn any_offset_may_match(&self, entry: &PartitionEntry, offsets: &[usize], op: RelOp, data: &Value) -> bool {
		if offsets.is_empty() {
			return true;
		}
		offsets.iter().any(|&offset| self.offset_may_match(entry, offset, op, data))
	}

	fn offset_may_match(&self, entry: &PartitionEntry, offset: usize, op: RelOp, data: &Value) -> bool {
		match entry.synopses.get(&offset) {
			// No synopsis for this column: cannot prune (§4.5).
			None => true,
			Some(syn) => !matches!(syn.lookup(op, data), Some(false)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::ast::Expression;
	use crate::schema::FieldDef;
	use crate::value::Address;
	use std::net::Ipv4Addr;

	fn conn_layout() -> Layout {
		Layout::new("conn", vec![FieldDef::new("id.orig_h", "addr")])
	}

	fn addr(a: u8, b: u8, c: u8, d: u8) -> Value {
		Value::Address(Address::v4(Ipv4Addr::new(a, b, c, d)))
	}

	fn addr_slice(addrs: &[Value]) -> Slice {
		Slice::new(conn_layout(), 0, addrs.len() as u64, vec![addrs.iter().cloned().map(Some).collect()])
	}

	/// Scenario S5: meta-index pruning via Bloom synopsis.
	#[test]
	fn s5_meta_index_pruning() {
		let mut idx = MetaIndex::new(SynopsisLimits::default());
		let p1 = Uuid::new_v4();
		let p2 = Uuid::new_v4();
		idx.add(p1, &addr_slice(&[addr(10, 0, 0, 1), addr(10, 1, 2, 3), addr(10, 5, 5, 5)]));
		idx.add(p2, &addr_slice(&[addr(192, 168, 0, 1), addr(192, 168, 1, 1)]));

		// queried value must actually be present in p1 for the "not pruned"
		// assertion to hold against the Bloom synopsis.
		let expr = Expression::Predicate(Predicate::new(
			Operand::TypeExtractor("addr".into()),
			RelOp::Eq,
			Operand::Data(addr(10, 0, 0, 1)),
		));
		let hits = idx.lookup(&expr);
		assert!(hits.contains(&p1));
		assert!(!hits.contains(&p2));
	}

	#[test]
	fn lookup_is_sorted_and_deduplicated() {
		let mut idx = MetaIndex::new(SynopsisLimits::default());
		let mut ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
		for id in &ids {
			idx.add(*id, &addr_slice(&[addr(1, 1, 1, 1)]));
		}
		let expr = Expression::Empty;
		let mut hits = idx.lookup(&expr);
		ids.sort();
		hits.sort();
		assert_eq!(hits, ids);
		let unique: BTreeSet<_> = hits.iter().collect();
		assert_eq!(unique.len(), hits.len());
	}

	#[test]
	fn negation_returns_all_partitions() {
		let mut idx = MetaIndex::new(SynopsisLimits::default());
		let p1 = Uuid::new_v4();
		idx.add(p1, &addr_slice(&[addr(1, 1, 1, 1)]));
		let inner = Expression::Predicate(Predicate::new(
			Operand::TypeExtractor("addr".into()),
			RelOp::Eq,
			Operand::Data(addr(9, 9, 9, 9)),
		));
		let negated = Expression::not(inner);
		assert_eq!(idx.lookup(&negated), vec![p1]);
	}

	#[test]
	fn hash_attribute_type_filters_by_layout_name() {
		let mut idx = MetaIndex::new(SynopsisLimits::default());
		let conn = Uuid::new_v4();
		let dns = Uuid::new_v4();
		idx.add(conn, &addr_slice(&[addr(1, 1, 1, 1)]));
		idx.merge(dns, PartitionEntry::new(Layout::new("dns", vec![])));

		let expr = Expression::Predicate(Predicate::new(
			Operand::AttributeExtractor(Attribute::Type),
			RelOp::Eq,
			Operand::Data(Value::String("conn".into())),
		));
		assert_eq!(idx.lookup(&expr), vec![conn]);
	}

	#[test]
	fn unknown_field_prunes_partition() {
		let mut idx = MetaIndex::new(SynopsisLimits::default());
		let p1 = Uuid::new_v4();
		idx.add(p1, &addr_slice(&[addr(1, 1, 1, 1)]));
		let expr = Expression::Predicate(Predicate::new(
			Operand::FieldExtractor("no.such.field".into()),
			RelOp::Eq,
			Operand::Data(Value::Int(1)),
		));
		assert!(idx.lookup(&expr).is_empty());
	}
}
