//! List index (§4.2.4): a dynamically growing array of element-indexes by
//! position, plus a length index. Only `ni`/`!ni` are supported.

use super::{realign, value_key};
use super::EnumIndex;
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;
use std::collections::BTreeMap;

/// A single list position's element index: an equality-coded bitmap keyed
/// by a canonical string encoding of the stored element. `ni`/`!ni` are the
/// only operators the list index supports, so per-element equality is all a
/// position needs — no address/string-specific bitslicing is required here.
#[derive(Default)]
struct PositionIndex {
	values: BTreeMap<String, Bitmap>,
	size: u64,
}

impl PositionIndex {
	fn append(&mut self, elem: Option<&Value>, id: u64) {
		for bitmap in self.values.values_mut() {
			realign(bitmap, id);
			bitmap.append(false, 1);
		}
		if let Some(v) = elem {
			self.values.entry(value_key(v)).or_insert_with(|| Bitmap::with_size(id + 1)).set(id);
		}
		self.size = id + 1;
	}

	fn lookup(&self, target: &Value) -> Bitmap {
		self.values.get(&value_key(target)).cloned().unwrap_or_else(|| Bitmap::with_size(self.size))
	}
}

pub struct ListIndex {
	max_elements: usize,
	positions: Vec<PositionIndex>,
	length: EnumIndex,
	size: u64,
}

impl ListIndex {
	pub fn new(max_elements: usize) -> Self {
		Self {
			max_elements,
			positions: Vec::new(),
			length: EnumIndex::new(),
			size: 0,
		}
	}

	fn contains(&self, target: &Value) -> Bitmap {
		let mut acc = Bitmap::with_size(self.size);
		for position in &self.positions {
			acc.or_assign(&position.lookup(target));
		}
		acc
	}
}

impl super::ValueIndex for ListIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		let elements = match view {
			Value::List(items) => items,
			_ => return false,
		};
		if elements.len() > self.max_elements {
			return false;
		}
		while self.positions.len() < elements.len() {
			let mut p = PositionIndex::default();
			// Bring a freshly grown position up to date with prior ids (all absent).
			if id > 0 {
				p.append(None, id - 1);
			}
			self.positions.push(p);
		}
		for (i, position) in self.positions.iter_mut().enumerate() {
			position.append(elements.get(i), id);
		}
		self.length.append(&Value::Enum(elements.len() as u32), id);
		self.size = id + 1;
		true
	}

	fn skip_to(&mut self, id: u64) {
		for position in self.positions.iter_mut() {
			position.append(None, id);
		}
		crate::value_index::ValueIndex::skip_to(&mut self.length, id);
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		match op {
			RelOp::Ni => Ok(self.contains(view)),
			RelOp::NotNi => Ok(self.contains(view).not()),
			_ => Err(Error::unsupported_operator(format!("{op} on list"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>()
			+ self.positions.iter().map(|p| p.values.len() * std::mem::size_of::<Bitmap>()).sum::<usize>()
	}

	fn size(&self) -> u64 {
		self.size
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value_index::ValueIndex;

	fn list(items: &[Value]) -> Value {
		Value::List(items.to_vec())
	}

	#[test]
	fn ni_over_growing_lists() {
		let mut idx = ListIndex::new(8);
		idx.append(&list(&[Value::Int(1), Value::Int(2)]), 0);
		idx.append(&list(&[Value::Int(3)]), 1);
		idx.append(&list(&[Value::Int(9), Value::Int(2), Value::Int(1)]), 2);

		assert_eq!(idx.lookup(RelOp::Ni, &Value::Int(2)).unwrap().to_vec(), vec![0, 2]);
		assert_eq!(idx.lookup(RelOp::Ni, &Value::Int(3)).unwrap().to_vec(), vec![1]);
		assert_eq!(idx.lookup(RelOp::NotNi, &Value::Int(2)).unwrap().to_vec(), vec![1]);
	}

	#[test]
	fn oversized_list_rejected() {
		let mut idx = ListIndex::new(1);
		assert!(!idx.append(&list(&[Value::Int(1), Value::Int(2)]), 0));
	}
}
