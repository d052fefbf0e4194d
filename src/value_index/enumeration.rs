//! Enumeration index (§4.2.5): an equality-coded bitmap over discrete codes.

use super::realign;
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct EnumIndex {
	codes: BTreeMap<u32, Bitmap>,
	size: u64,
}

impl EnumIndex {
	pub fn new() -> Self {
		Self::default()
	}

	fn bitmap_for(&self, code: u32) -> Bitmap {
		self.codes.get(&code).cloned().unwrap_or_else(|| Bitmap::with_size(self.size))
	}

	/// Equality bitmap for `code`, exposed for callers (e.g. [`super::SubnetIndex`])
	/// that combine it with other terms rather than returning it directly.
	pub(crate) fn bitmap_for_eq(&self, code: u32) -> Bitmap {
		self.bitmap_for(code)
	}

	/// `code >= target`, computed as the union of the per-code equality
	/// bitmaps at or above `target` (the code space is small and bounded —
	/// e.g. subnet prefix lengths 0..=128 — so a linear union is cheap).
	pub(crate) fn ge(&self, target: u32) -> Bitmap {
		let mut acc = Bitmap::with_size(self.size);
		for (&code, bitmap) in self.codes.range(target..) {
			let _ = code;
			acc.or_assign(bitmap);
		}
		acc
	}
}

impl super::ValueIndex for EnumIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		let code = match view {
			Value::Enum(c) => *c,
			_ => return false,
		};
		// Bring every code's bitmap up to `id + 1` with a zero bit at `id`,
		// then flip just the matching code's bit on.
		for bitmap in self.codes.values_mut() {
			realign(bitmap, id);
			bitmap.append(false, 1);
		}
		self.codes.entry(code).or_insert_with(|| Bitmap::with_size(id + 1)).set(id);
		self.size = id + 1;
		true
	}

	fn skip_to(&mut self, id: u64) {
		for bitmap in self.codes.values_mut() {
			realign(bitmap, id);
			bitmap.append(false, 1);
		}
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		let code = match view {
			Value::Enum(c) => *c,
			_ => return Err(Error::type_clash(format!("enum index vs {}", view.type_name()))),
		};
		match op {
			RelOp::Eq => Ok(self.bitmap_for(code)),
			RelOp::Ne => Ok(self.bitmap_for(code).not()),
			_ => Err(Error::unsupported_operator(format!("{op} on enum"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>() + self.codes.len() * std::mem::size_of::<Bitmap>()
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
	fn equality_and_ge() {
		let mut idx = EnumIndex::new();
		for (i, code) in [1u32, 2, 1, 3, 2].into_iter().enumerate() {
			idx.append(&Value::Enum(code), i as u64);
		}
		assert_eq!(idx.lookup(RelOp::Eq, &Value::Enum(1)).unwrap().to_vec(), vec![0, 2]);
		assert_eq!(idx.lookup(RelOp::Ne, &Value::Enum(1)).unwrap().to_vec(), vec![1, 3, 4]);
		assert_eq!(idx.ge(2).to_vec(), vec![1, 3, 4]);
	}
}
