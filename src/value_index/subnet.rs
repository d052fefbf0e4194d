//! Subnet index (§4.2.2): a nested address index over the network plus a
//! prefix-length index.

use super::{AddressIndex, EnumIndex, ValueIndex};
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::{Address, Subnet, Value};

pub struct SubnetIndex {
	network: AddressIndex,
	length: EnumIndex,
	size: u64,
}

impl Default for SubnetIndex {
	fn default() -> Self {
		Self::new()
	}
}

impl SubnetIndex {
	pub fn new() -> Self {
		Self {
			network: AddressIndex::new(),
			length: EnumIndex::new(),
			size: 0,
		}
	}

	fn eq(&self, s: &Subnet) -> Result<Bitmap, Error> {
		let mut acc = self.network.lookup(RelOp::Eq, &Value::Address(s.network))?;
		acc.and_assign(&self.length.lookup(RelOp::Eq, &Value::Enum(s.prefix_len as u32))?);
		Ok(acc)
	}

	/// Stored subnet is a subset of `other` (§4.2.2 `in`): more specific
	/// (greater or equal prefix length) and its network falls within `other`.
	fn subset_of(&self, other: &Subnet) -> Result<Bitmap, Error> {
		let mut acc = self.network.lookup_prefix(&other.network, other.prefix_len);
		acc.and_assign(&self.length.ge(other.prefix_len as u32));
		Ok(acc)
	}

	/// Stored subnet is a superset of (`ni`) the address or subnet `needle`,
	/// masked to prefix length `needle_len`: OR, over every possible stored
	/// prefix length `0..=needle_len`, of "stored network equals `needle`
	/// masked to that length AND stored length equals that length" (§4.2.2,
	/// §4.2.3-style sliding union).
	fn superset_of(&self, needle: &Address, needle_len: u8) -> Bitmap {
		let mut acc = Bitmap::with_size(self.size);
		for len in 0..=needle_len {
			let masked = needle.masked(len);
			let mut term = self.network.lookup_prefix(&masked, len);
			term.and_assign(&self.length.bitmap_for_eq(len as u32));
			acc.or_assign(&term);
		}
		acc
	}
}

impl super::ValueIndex for SubnetIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		let s = match view {
			Value::Subnet(s) => s,
			_ => return false,
		};
		self.network.append(&Value::Address(s.network), id);
		self.length.append(&Value::Enum(s.prefix_len as u32), id);
		self.size = id + 1;
		true
	}

	fn skip_to(&mut self, id: u64) {
		self.network.skip_to(id);
		self.length.skip_to(id);
		self.size = id + 1;
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		match (op, view) {
			(RelOp::Eq, Value::Subnet(s)) => self.eq(s),
			(RelOp::Ne, Value::Subnet(s)) => self.eq(s).map(|b| b.not()),
			(RelOp::In, Value::Subnet(s)) => self.subset_of(s),
			(RelOp::Ni, Value::Subnet(s)) => Ok(self.superset_of(&s.network, s.prefix_len)),
			(RelOp::Ni, Value::Address(a)) => Ok(self.superset_of(a, a.family_bits())),
			(_, Value::Subnet(_)) | (_, Value::Address(_)) => {
				Err(Error::unsupported_operator(format!("{op} on subnet")))
			}
			_ => Err(Error::type_clash(format!("subnet index vs {}", view.type_name()))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>() + self.network.memusage()
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

	fn net(a: u8, b: u8, c: u8, d: u8, len: u8) -> Value {
		Value::Subnet(Subnet {
			network: Address::v4(Ipv4Addr::new(a, b, c, d)),
			prefix_len: len,
		})
	}

	fn addr(a: u8, b: u8, c: u8, d: u8) -> Value {
		Value::Address(Address::v4(Ipv4Addr::new(a, b, c, d)))
	}

	/// Scenario S2: plain addresses queried against a subnet literal via `in`.
	#[test]
	fn s2_subnet_containment() {
		let mut addr_idx = AddressIndex::new();
		for (i, v) in [addr(1, 2, 3, 4), addr(1, 2, 3, 5), addr(1, 2, 4, 0), addr(10, 0, 0, 1)]
			.into_iter()
			.enumerate()
		{
			addr_idx.append(&v, i as u64);
		}
		assert_eq!(addr_idx.lookup(RelOp::In, &net(1, 2, 3, 0, 24)).unwrap().to_vec(), vec![0, 1]);
		assert_eq!(addr_idx.lookup(RelOp::In, &net(0, 0, 0, 0, 0)).unwrap().to_vec(), vec![0, 1, 2, 3]);
	}

	#[test]
	fn subnet_equality_and_superset() {
		let mut idx = SubnetIndex::new();
		idx.append(&net(10, 0, 0, 0, 8), 0);
		idx.append(&net(192, 168, 0, 0, 16), 1);
		idx.append(&net(10, 1, 0, 0, 16), 2);

		assert_eq!(idx.lookup(RelOp::Eq, &net(10, 0, 0, 0, 8)).unwrap().to_vec(), vec![0]);

		// /8 and /16 networks that contain 10.1.2.3: ids 0 and 2.
		let contains = idx.lookup(RelOp::Ni, &addr(10, 1, 2, 3)).unwrap();
		assert_eq!(contains.to_vec(), vec![0, 2]);

		// id 2 (10.1.0.0/16) is a subset of id 0's 10.0.0.0/8.
		let subset = idx.subset_of(&Subnet {
			network: Address::v4(Ipv4Addr::new(10, 0, 0, 0)),
			prefix_len: 8,
		});
		assert_eq!(subset.unwrap().to_vec(), vec![0, 2]);
	}
}
