//! Boolean index (§4.2.5): a singleton-coded bitmap.

use super::realign;
use crate::bitmap::Bitmap;
use crate::err::Error;
use crate::expr::ast::RelOp;
use crate::value::Value;

#[derive(Default)]
pub struct BoolIndex {
	trues: Bitmap,
}

impl BoolIndex {
	pub fn new() -> Self {
		Self::default()
	}
}

impl super::ValueIndex for BoolIndex {
	fn append(&mut self, view: &Value, id: u64) -> bool {
		let b = match view {
			Value::Bool(b) => *b,
			_ => return false,
		};
		realign(&mut self.trues, id);
		self.trues.append(b, 1);
		true
	}

	fn skip_to(&mut self, id: u64) {
		realign(&mut self.trues, id);
		self.trues.append(false, 1);
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Result<Bitmap, Error> {
		let b = match view {
			Value::Bool(b) => *b,
			_ => return Err(Error::type_clash(format!("bool index vs {}", view.type_name()))),
		};
		match op {
			RelOp::Eq => Ok(if b {
				self.trues.clone()
			} else {
				self.trues.not()
			}),
			RelOp::Ne => Ok(if b {
				self.trues.not()
			} else {
				self.trues.clone()
			}),
			_ => Err(Error::unsupported_operator(format!("{op} on bool"))),
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>()
	}

	fn size(&self) -> u64 {
		self.trues.size()
	}
}
