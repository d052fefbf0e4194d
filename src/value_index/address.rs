//! Address index (§4.2.1): IPv4 and IPv6 unified into 16 bytes, with
//! bitslice-coded (8 bit-planes per byte position) per-byte indexes that
//! support both equality and prefix masking.

use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::{Address, Value};

/// Per-byte, per-bit compressed bitmap: `planes[byte][bit]` is set for id
/// `i` iff bit `bit` (MSB-first) of byte `byte` of the address stored at
/// `i` is 1.
pub struct AddressIndex {
	planes: Vec<[Bitmap; 8]>,
	/// Records which representation each id was originally stored as.
	v4: Bitmap,
	size: u64,
}

impl Default for AddressIndex {
	fn default() -> Self {
		Self::new()
	}
}

impl AddressIndex {
	pub fn new() -> Self {
		Self {
			planes: (0..16).map(|_| Default::default()).collect(),
			v4: Bitmap::new(),
			size: 0,
		}
	}

	fn append_address(&mut self, addr: &Address, id: u64) {
		let gap = id.saturating_sub(self.size);
		if gap > 0 {
			for byte in 0..16 {
				for bit in 0..8 {
					self.planes[byte][bit].skip(gap);
				}
			}
			self.v4.skip(gap);
		}
		for byte in 0..16 {
			for bit in 0..8 {
				let set = (addr.octets[byte] >> (7 - bit)) & 1 == 1;
				self.planes[byte][bit].append(set, 1);
			}
		}
		self.v4.append(addr.is_v4, 1);
		self.size = id + 1;
	}

	/// AND over the per-byte equality lookups for byte `byte_idx`; short
	/// circuits the caller via [`Bitmap::all_zero`] on the returned value.
	fn byte_equals(&self, byte_idx: usize, target: u8) -> Bitmap {
		let mut acc = Bitmap::with_size(self.size);
		acc.flip(); // all-ones of size `self.size`
		for bit in 0..8 {
			let plane = &self.planes[byte_idx][bit];
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

	fn equals(&self, addr: &Address) -> Bitmap {
		let (start, end) = if addr.is_v4 {
			(12usize, 16usize)
		} else {
			(0usize, 16usize)
		};
		let mut acc = Bitmap::with_size(self.size);
		acc.flip();
		if addr.is_v4 {
			acc.and_assign(&self.v4);
			if acc.all_zero() {
				return acc;
			}
		}
		for byte in start..end {
			acc.and_assign(&self.byte_equals(byte, addr.octets[byte]));
			if acc.all_zero() {
				return acc;
			}
		}
		acc
	}

	/// `subnet ni` / `in` support (§4.2.1, §4.2.2): masks the prefix into
	/// full bytes (AND the equality lookups) and residual bits (AND/ANDN the
	/// bit-plane of the straddling byte depending on the prefix bit).
	pub(crate) fn lookup_prefix(&self, network: &Address, prefix_len: u8) -> Bitmap {
		let start = if network.is_v4 {
			12usize
		} else {
			0usize
		};
		let full_bytes = (prefix_len / 8) as usize;
		let residual_bits = prefix_len % 8;

		let mut acc = Bitmap::with_size(self.size);
		acc.flip();
		if network.is_v4 {
			acc.and_assign(&self.v4);
			if acc.all_zero() {
				return acc;
			}
		}
		for offset in 0..full_bytes {
			let byte = start + offset;
			acc.and_assign(&self.byte_equals(byte, network.octets[byte]));
			if acc.all_zero() {
				return acc;
			}
		}
		if residual_bits > 0 {
			let byte = start + full_bytes;
			for bit in 0..residual_bits as usize {
				let plane = &self.planes[byte][bit];
				let target_bit = (network.octets[byte] >> (7 - bit)) & 1 == 1;
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
		}
		acc
	}
}

impl super::ValueIndex for AddressIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		match view {
			Value::Address(addr) => {
				self.append_address(addr, id);
				true
			}
			_ => false,
		}
	}

	fn skip_to(&mut self, id: u64) {
		let gap = id.saturating_sub(self.size);
		if gap > 0 {
			for byte in 0..16 {
				for bit in 0..8 {
					self.planes[byte][bit].skip(gap);
				}
			}
			self.v4.skip(gap);
		}
		for byte in 0..16 {
			for bit in 0..8 {
				self.planes[byte][bit].append(false, 1);
			}
		}
		self.v4.append(false, 1);
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		// `in` against a subnet literal (Scenario S2) masks to the subnet's
		// prefix length instead of the address's full family width.
		if op == RelOp::In {
			return match view {
				Value::Address(a) => Ok(self.lookup_prefix(a, a.family_bits())),
				Value::Subnet(s) => Ok(self.lookup_prefix(&s.network, s.prefix_len)),
				_ => Err(Error::type_clash(format!("address index vs {}", view.type_name()))),
			};
		}
		let addr = match view {
			Value::Address(a) => a,
			_ => return Err(Error::type_clash(format!("address index vs {}", view.type_name()))),
		};
		match op {
			RelOp::Eq => Ok(self.equals(addr)),
			RelOp::Ne => Ok(self.equals(addr).not()),
			_ => Err(Error::unsupported_operator(format!("{op} on address"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>() + self.planes.len() * 8 * std::mem::size_of::<Bitmap>()
	}

	fn size(&self) -> u64 {
		self.size
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value_index::ValueIndex;
	use std::net::Ipv4Addr;

	fn v4(a: u8, b: u8, c: u8, d: u8) -> Value {
		Value::Address(Address::v4(Ipv4Addr::new(a, b, c, d)))
	}

	fn v6(s: &str) -> Value {
		Value::Address(Address::v6(s.parse().unwrap()))
	}

	/// Scenario S1: address equality with a v4/v6 mix.
	#[test]
	fn s1_address_equality_v4_v6_mix() {
		let mut idx = AddressIndex::new();
		idx.append(&v4(10, 0, 0, 1), 0);
		idx.append(&v6("::1"), 1);
		idx.append(&v4(10, 0, 0, 1), 2);
		idx.append(&v4(10, 0, 0, 2), 3);

		assert_eq!(idx.lookup(RelOp::Eq, &v4(10, 0, 0, 1)).unwrap().to_vec(), vec![0, 2]);
		assert_eq!(idx.lookup(RelOp::Eq, &v6("::1")).unwrap().to_vec(), vec![1]);
		assert_eq!(idx.lookup(RelOp::Ne, &v4(10, 0, 0, 1)).unwrap().to_vec(), vec![1, 3]);
	}

	#[test]
	fn unsupported_operator_on_address() {
		let mut idx = AddressIndex::new();
		idx.append(&v4(1, 1, 1, 1), 0);
		assert!(idx.lookup(RelOp::Lt, &v4(1, 1, 1, 1)).is_err());
	}

	#[test]
	fn type_clash_reports_error_not_panic() {
		let mut idx = AddressIndex::new();
		idx.append(&v4(1, 1, 1, 1), 0);
		assert!(!idx.append(&Value::Int(1), 1));
		assert!(idx.lookup(RelOp::Eq, &Value::Int(1)).is_err());
	}
}
