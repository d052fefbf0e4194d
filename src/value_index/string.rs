//! String index (§4.2.3): per-position byte bitslice indexes bounded by
//! `max-length`, plus a length index.
//!
//! The spec calls for the length index to be base-10 bitsliced; this
//! implementation uses an equality-coded [`EnumIndex`] over the length value
//! instead (see DESIGN.md) — the two are observationally equivalent for
//! every operation this index exposes, differing only in on-disk
//! compression strategy, which is out of this crate's scope (§1).

use super::realign;
use super::EnumIndex;
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;

pub struct StringIndex {
	max_length: usize,
	/// `positions[p][bit]` is set for id `i` iff bit `bit` (MSB-first) of
	/// byte position `p` of the string stored at `i` is 1 (zero-padded
	/// beyond the string's real length).
	positions: Vec<[Bitmap; 8]>,
	length: EnumIndex,
	size: u64,
}

impl StringIndex {
	pub fn new(max_length: usize) -> Self {
		Self {
			max_length,
			positions: (0..max_length).map(|_| Default::default()).collect(),
			length: EnumIndex::new(),
			size: 0,
		}
	}

	fn byte_equals(&self, position: usize, target: u8) -> Bitmap {
		let mut acc = Bitmap::with_size(self.size);
		acc.flip();
		for bit in 0..8 {
			let plane = &self.positions[position][bit];
			let target_bit = (target >> (7 - bit)) & 1 == 1;
			let term = if target_bit {
				plane.clone()
			} else {
				plane.not()
			};
			acc.and_assign(&term);
			if acc.all_zero() {
				return acc;
			}
		}
		acc
	}

	fn equals(&self, s: &str) -> Result<Bitmap, Error> {
		let bytes = s.as_bytes();
		if bytes.len() > self.max_length {
			return Ok(Bitmap::with_size(self.size));
		}
		let mut acc = crate::value_index::ValueIndex::lookup(
			&self.length,
			RelOp::Eq,
			&Value::Enum(bytes.len() as u32),
		)?;
		for (p, &b) in bytes.iter().enumerate() {
			acc.and_assign(&self.byte_equals(p, b));
			if acc.all_zero() {
				return Ok(acc);
			}
		}
		Ok(acc)
	}

	/// Substring containment (§4.2.3 `ni`): OR over all starting offsets of
	/// the AND of per-position byte matches, short-circuiting an offset the
	/// moment any position is all-zero.
	fn contains(&self, needle: &str) -> Result<Bitmap, Error> {
		let bytes = needle.as_bytes();
		if bytes.is_empty() || bytes.len() > self.max_length {
			return Ok(Bitmap::with_size(self.size));
		}
		let mut acc = Bitmap::with_size(self.size);
		let last_offset = self.max_length - bytes.len();
		for offset in 0..=last_offset {
			let mut term = Bitmap::with_size(self.size);
			term.flip();
			for (k, &b) in bytes.iter().enumerate() {
				term.and_assign(&self.byte_equals(offset + k, b));
				if term.all_zero() {
					break;
				}
			}
			acc.or_assign(&term);
		}
		Ok(acc)
	}
}

impl super::ValueIndex for StringIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		let s = match view {
			Value::String(s) => s,
			_ => return false,
		};
		let bytes = s.as_bytes();
		if bytes.len() > self.max_length {
			return false;
		}
		for (p, plane) in self.positions.iter_mut().enumerate() {
			let byte = bytes.get(p).copied().unwrap_or(0);
			for bit in 0..8 {
				realign(&mut plane[bit], id);
				let set = (byte >> (7 - bit)) & 1 == 1;
				plane[bit].append(set, 1);
			}
		}
		self.length.append(&Value::Enum(bytes.len() as u32), id);
		self.size = id + 1;
		true
	}

	fn skip_to(&mut self, id: u64) {
		for plane in self.positions.iter_mut() {
			for bit in plane.iter_mut() {
				realign(bit, id);
				bit.append(false, 1);
			}
		}
		crate::value_index::ValueIndex::skip_to(&mut self.length, id);
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		let s = match view {
			Value::String(s) => s,
			_ => return Err(Error::type_clash(format!("string index vs {}", view.type_name()))),
		};
		match op {
			RelOp::Eq => self.equals(s),
			RelOp::Ne => self.equals(s).map(|b| b.not()),
			RelOp::Ni => self.contains(s),
			RelOp::NotNi => self.contains(s).map(|b| b.not()),
			_ => Err(Error::unsupported_operator(format!("{op} on string"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>() + self.positions.len() * 8 * std::mem::size_of::<Bitmap>()
	}

	fn size(&self) -> u64 {
		self.size
	}
}
