//! Per-column value indexes built over compressed bitmaps (§4.2).
//!
//! Every variant exposes the same small surface (`append`, `lookup`,
//! `memusage`, `size`), matching the teacher's "trait with
//! dynamic dispatch... one vtable call per lookup, negligible against bitmap
//! work" design note (§9) rather than a monomorphized enum of index kinds.

mod address;
mod boolean;
mod enumeration;
mod generic;
mod list;
mod string;
mod subnet;

pub use address::AddressIndex;
pub use boolean::BoolIndex;
pub use enumeration::EnumIndex;
pub use generic::GenericIndex;
pub use list::ListIndex;
pub use string::StringIndex;
pub use subnet::SubnetIndex;

use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;

/// Shared surface of every per-column value index (§4.2).
pub trait ValueIndex: Send + Sync {
	/// Appends `view` at absolute position `id`, implicitly skipping any gap
	/// since the last append. Returns `false` when `view`'s shape does not
	/// match this index's declared column type (the caller logs and
	/// proceeds — §4.2, failure semantics).
	fn append(&mut self, view: &Value, id: u64) -> bool;

	/// Advances this index to `id + 1` with an absent/false entry at `id`,
	/// for a row whose cell was null (§4.1 "skip is used to realign a
	/// per-column bitmap... when a column was absent").
	fn skip_to(&mut self, id: u64);

	/// Returns a bitmap of matching IDs, or a predicate-local error
	/// (`type_clash`/`unsupported_operator`) that the evaluator treats as an
	/// empty result without aborting the query (§4.2, §7).
	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error>;

	/// Approximate resident memory in bytes.
	fn memusage(&self) -> usize;

	/// Logical size (the next absolute id this index expects an append at).
	fn size(&self) -> u64;
}

/// Realigns `bitmap` to `target_size` by skipping the gap, mirroring the
/// "skip to realign a per-column bitmap to the current global ID" invariant
/// shared by every per-column bitmap in this module (§4.1).
pub(crate) fn realign(bitmap: &mut Bitmap, id: u64) {
	if id > bitmap.size() {
		bitmap.skip(id - bitmap.size());
	}
}

/// A canonical string key a value hashes to, shared by every equality-coded
/// index keyed on arbitrary `Value`s rather than a fixed code space
/// ([`list::PositionIndex`], [`GenericIndex`]).
pub(crate) fn value_key(v: &Value) -> String {
	format!("{}:{}", v.type_name(), v)
}

#[cfg(test)]
pub(crate) fn assert_rank_matches<F>(index: &dyn ValueIndex, op: RelOp, view: &Value, expect: F)
where
	F: Fn(u64) -> bool,
{
	let hits = index.lookup(op, view).unwrap();
	let expected = (0..index.size()).filter(|&i| expect(i)).count() as u64;
	assert_eq!(hits.rank(), expected);
}
