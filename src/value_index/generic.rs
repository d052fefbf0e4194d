//! Generic equality index: an equality-coded bitmap keyed by a canonical
//! string encoding of the stored value, for column types outside the six
//! named variants of §4.2 (numerics, timestamps, durations, ports). Same
//! shape as [`super::EnumIndex`], but over an open value space rather than a
//! fixed `u32` code.

use super::{realign, value_key};
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct GenericIndex {
	values: BTreeMap<String, Bitmap>,
	size: u64,
}

impl GenericIndex {
	pub fn new() -> Self {
		Self::default()
	}

	fn bitmap_for(&self, key: &str) -> Bitmap {
		self.values.get(key).cloned().unwrap_or_else(|| Bitmap::with_size(self.size))
	}
}

impl super::ValueIndex for GenericIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		for bitmap in self.values.values_mut() {
			realign(bitmap, id);
			bitmap.append(false, 1);
		}
		self.values.entry(value_key(view)).or_insert_with(|| Bitmap::with_size(id + 1)).set(id);
		self.size = id + 1;
		true
	}

	fn skip_to(&mut self, id: u64) {
		for bitmap in self.values.values_mut() {
			realign(bitmap, id);
			bitmap.append(false, 1);
		}
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		match op {
			RelOp::Eq => Ok(self.bitmap_for(&value_key(view))),
			RelOp::Ne => Ok(self.bitmap_for(&value_key(view)).not()),
			_ => Err(Error::unsupported_operator(format!("{op} on generic index"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>() + self.values.len() * std::mem::size_of::<Bitmap>()
	}

	fn size(&self) -> u64 {
		self.size
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value_index::ValueIndex;

	#[test]
	fn equality_over_mixed_numeric_values() {
		let mut idx = GenericIndex::new();
		for (i, v) in [Value::Int(1), Value::Real(2.5), Value::Int(1), Value::Timestamp(99)].into_iter().enumerate() {
			idx.append(&v, i as u64);
		}
		assert_eq!(idx.lookup(RelOp::Eq, &Value::Int(1)).unwrap().to_vec(), vec![0, 2]);
		assert_eq!(idx.lookup(RelOp::Ne, &Value::Int(1)).unwrap().to_vec(), vec![1, 3]);
	}
}
