//! Partition (§4.6): the unit of storage and query evaluation. An active
//! partition accepts a stream of [`Slice`]s and grows its per-column value
//! indexes; a passive partition is a read-only shell reloaded from disk.
//!
//! Synopses live in [`crate::meta_index`], not here — per §4.8 a partition's
//! own query surface is value-index lookups only, while pruning whole
//! partitions out of a candidate set is the meta-index's job (§4.5).

use crate::bitmap::Bitmap;
use crate::err::{Error, Result};
use crate::expr::ast::{Expression, Operand, Predicate};
use crate::schema::Layout;
use crate::value::Value;
use crate::value_index::{AddressIndex, BoolIndex, EnumIndex, GenericIndex, ListIndex, StringIndex, SubnetIndex, ValueIndex};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// A columnar batch of events sharing a layout (GLOSSARY "Slice"):
/// `columns[offset][row]` is `None` for a null cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
	pub layout: Layout,
	pub base_id: u64,
	pub row_count: u64,
	pub columns: Vec<Vec<Option<Value>>>,
}

impl Slice {
	pub fn new(layout: Layout, base_id: u64, row_count: u64, columns: Vec<Vec<Option<Value>>>) -> Self {
		Self {
			layout,
			base_id,
			row_count,
			columns,
		}
	}

	pub(crate) fn cell(&self, offset: usize, row: usize) -> Option<&Value> {
		self.columns.get(offset).and_then(|c| c.get(row)).and_then(|o| o.as_ref())
	}
}

/// Sizing knobs a partition's value indexes need at construction time,
/// narrowed from the §6 recognized `Config` keys this module consumes.
#[derive(Clone, Debug)]
pub struct PartitionLimits {
	pub max_container_elements: usize,
	pub max_string_size: usize,
}

impl Default for PartitionLimits {
	fn default() -> Self {
		Self {
			max_container_elements: 256,
			max_string_size: 256,
		}
	}
}

fn make_value_index(type_name: &str, limits: &PartitionLimits) -> Box<dyn ValueIndex> {
	match type_name {
		"addr" | "address" => Box::new(AddressIndex::new()),
		"subnet" => Box::new(SubnetIndex::new()),
		"string" => Box::new(StringIndex::new(limits.max_string_size)),
		"list" => Box::new(ListIndex::new(limits.max_container_elements)),
		"bool" => Box::new(BoolIndex::new()),
		"enum" => Box::new(EnumIndex::new()),
		// Numerics, timestamps, durations, ports: no named §4.2 variant covers
		// them, so they fall back to the additive equality-only index (see
		// DESIGN.md).
		_ => Box::new(GenericIndex::new()),
	}
}

/// The minimal slice of partition state a [`crate::persist::PartitionCodec`]
/// round-trips. The real byte format (value indexes, synopsis encoding) is
/// delegated to an external encoder (§1 Non-goal); this type stands in for
/// what that encoder would persist, not a literal serialization of it.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionSnapshot {
	pub layout: Layout,
	pub base_id: u64,
	pub row_count: u64,
}

/// A bitmap-indexed slab of rows sharing a layout: writable (`active`) until
/// decommissioned, then read-only (`passive`) once reloaded from a snapshot.
pub struct Partition {
	pub id: Uuid,
	pub layout: Layout,
	value_indexes: HashMap<usize, Box<dyn ValueIndex>>,
	limits: PartitionLimits,
	id_base: Option<u64>,
	row_count: u64,
	capacity_remaining: u64,
	persisted: bool,
	decommission: bool,
}

impl Partition {
	pub fn new_active(id: Uuid, layout: Layout, capacity: u64, limits: PartitionLimits) -> Self {
		Self {
			id,
			layout,
			value_indexes: HashMap::new(),
			limits,
			id_base: None,
			row_count: 0,
			capacity_remaining: capacity,
			persisted: false,
			decommission: false,
		}
	}

	/// Reconstructs a passive partition from a snapshot. Real recovery would
	/// rebuild the value indexes from the external byte format (§1); absent
	/// that format, a reloaded partition starts with empty indexes, matching
	/// the same "no pruning possible" fallback every non-indexed column
	/// already uses.
	pub fn from_snapshot(id: Uuid, snapshot: PartitionSnapshot, limits: PartitionLimits) -> Self {
		Self {
			id,
			layout: snapshot.layout,
			value_indexes: HashMap::new(),
			limits,
			id_base: Some(snapshot.base_id),
			row_count: snapshot.row_count,
			capacity_remaining: 0,
			persisted: true,
			decommission: false,
		}
	}

	pub fn is_persisted(&self) -> bool {
		self.persisted
	}

	pub fn should_decommission(&self) -> bool {
		self.decommission
	}

	pub fn row_count(&self) -> u64 {
		self.row_count
	}

	pub fn capacity_remaining(&self) -> u64 {
		self.capacity_remaining
	}

	pub fn snapshot(&self) -> PartitionSnapshot {
		PartitionSnapshot {
			layout: self.layout.clone(),
			base_id: self.id_base.unwrap_or(0),
			row_count: self.row_count,
		}
	}

	/// Appends a slice (§4.6): every non-`skip` column gets its value index
	/// created on first non-null sight, then fed each non-null cell; null
	/// cells realign an already-created index via `skip_to` so row offsets
	/// stay aligned across columns. Accepts the slice in full even when it
	/// overruns `capacity_remaining`, marking the partition for
	/// decommission-after-this-slice instead of splitting it.
	pub fn append(&mut self, slice: &Slice) -> Result<()> {
		if self.persisted {
			return Err(Error::logic_error("cannot append to a passive partition"));
		}
		let base = *self.id_base.get_or_insert(slice.base_id);
		for row in 0..slice.row_count as usize {
			let global_id = slice.base_id + row as u64;
			let local_id = global_id - base;
			for (offset, field) in slice.layout.fields.iter().enumerate() {
				if field.has_attribute("skip") {
					continue;
				}
				match slice.cell(offset, row) {
					Some(v) => {
						let index =
							self.value_indexes.entry(offset).or_insert_with(|| make_value_index(&field.type_name, &self.limits));
						if !index.append(v, local_id) {
							warn!(field = %field.path, "value shape does not match declared column type");
						}
					}
					None => {
						if let Some(index) = self.value_indexes.get_mut(&offset) {
							index.skip_to(local_id);
						}
					}
				}
			}
		}
		self.row_count = slice.base_id + slice.row_count - base;
		if slice.row_count > self.capacity_remaining {
			self.capacity_remaining = 0;
			self.decommission = true;
		} else {
			self.capacity_remaining -= slice.row_count;
		}
		Ok(())
	}

	/// Evaluates a tailored-and-resolved expression against this partition's
	/// value indexes, composing bitmaps per the AST structure (§4.8).
	/// A bare `Negation` is a defensive fallback — `normalize()` already
	/// rewrites every negation away via De Morgan before an expression
	/// reaches a partition.
	pub fn evaluate(&self, expr: &Expression) -> Bitmap {
		match expr {
			Expression::Predicate(p) => self.predicate_bitmap(p),
			Expression::Conjunction(children) => {
				let mut acc = Bitmap::with_size(self.row_count);
				acc.flip();
				for child in children {
					acc.and_assign(&self.evaluate(child));
					if acc.all_zero() {
						return acc;
					}
				}
				acc
			}
			Expression::Disjunction(children) => {
				let mut acc = Bitmap::with_size(self.row_count);
				for child in children {
					acc.or_assign(&self.evaluate(child));
				}
				acc
			}
			Expression::Negation(inner) => self.evaluate(inner).not(),
			Expression::Empty => {
				let mut acc = Bitmap::with_size(self.row_count);
				acc.flip();
				acc
			}
		}
	}

	fn predicate_bitmap(&self, pred: &Predicate) -> Bitmap {
		let (offset, op, data) = match (&pred.lhs, &pred.rhs) {
			(Operand::DataExtractor(_, offset), Operand::Data(v)) => (*offset, pred.op, v),
			(Operand::Data(v), Operand::DataExtractor(_, offset)) => (*offset, pred.op.mirror(), v),
			_ => return Bitmap::with_size(self.row_count),
		};
		let Some(index) = self.value_indexes.get(&offset) else {
			return Bitmap::with_size(self.row_count);
		};
		match index.lookup(op, data) {
			Ok(bitmap) => bitmap,
			// Predicate-local failures (§7) mean "no match", not "abort".
			Err(_) => Bitmap::with_size(self.row_count),
		}
	}
}
