//! Boolean-pair synopsis (§4.3): tracks whether any `true` and any `false`
//! has been seen. Trivial but still a sound pruner.

use super::Synopsis;
use crate::expr::ast::RelOp;
use crate::value::Value;

#[derive(Default)]
pub struct BooleanPairSynopsis {
	any_true: bool,
	any_false: bool,
}

impl BooleanPairSynopsis {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Synopsis for BooleanPairSynopsis {
	fn add(&mut self, view: &Value) {
		if let Value::Bool(b) = view {
			if *b {
				self.any_true = true;
			} else {
				self.any_false = true;
			}
		}
	}

	fn lookup(&self, op: RelOp, view: &Value) -> Option<bool> {
		let Value::Bool(b) = view else {
			return None;
		};
		let present = if *b {
			self.any_true
		} else {
			self.any_false
		};
		let opposite_present = if *b {
			self.any_false
		} else {
			self.any_true
		};
		match op {
			RelOp::Eq if !present => Some(false),
			RelOp::Ne if present && !opposite_present => Some(false),
			_ => None,
		}
	}

	fn memusage(&self) -> usize {
		std::mem::size_of::<Self>()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn all_true_prunes_false_equality() {
		let mut syn = BooleanPairSynopsis::new();
		syn.add(&Value::Bool(true));
		syn.add(&Value::Bool(true));
		assert_eq!(syn.lookup(RelOp::Eq, &Value::Bool(false)), Some(false));
		assert_eq!(syn.lookup(RelOp::Eq, &Value::Bool(true)), None);
		assert_eq!(syn.lookup(RelOp::Ne, &Value::Bool(true)), Some(false));
	}

	#[test]
	fn mixed_values_cannot_prune() {
		let mut syn = BooleanPairSynopsis::new();
		syn.add(&Value::Bool(true));
		syn.add(&Value::Bool(false));
		assert_eq!(syn.lookup(RelOp::Eq, &Value::Bool(true)), None);
		assert_eq!(syn.lookup(RelOp::Eq, &Value::Bool(false)), None);
		assert_eq!(syn.lookup(RelOp::Ne, &Value::Bool(true)), None);
	}
}
