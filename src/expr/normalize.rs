//! `normalize` (§4.4): four independently testable passes, composed the way
//! the original `expression_visitors.hpp` decomposes them — one function per
//! concern rather than a single monolithic rewrite.

use super::ast::{Expression, Operand, Predicate, RelOp};

/// Lifts a single-child `Conjunction`/`Disjunction` into its child, and
/// recurses into children first (bottom-up) so a nested single-child node
/// collapses before its parent is inspected.
fn hoist(expr: Expression) -> Expression {
	match expr {
		Expression::Conjunction(children) => {
			let children: Vec<_> = children.into_iter().map(hoist).collect();
			match children.len() {
				1 => children.into_iter().next().unwrap(),
				_ => Expression::Conjunction(children),
			}
		}
		Expression::Disjunction(children) => {
			let children: Vec<_> = children.into_iter().map(hoist).collect();
			match children.len() {
				1 => children.into_iter().next().unwrap(),
				_ => Expression::Disjunction(children),
			}
		}
		Expression::Negation(inner) => Expression::Negation(Box::new(hoist(*inner))),
		other => other,
	}
}

/// Rewrites each predicate so an extractor operand is on the LHS, mirroring
/// `op` when the original LHS held data and the RHS held an extractor.
fn align(expr: Expression) -> Expression {
	match expr {
		Expression::Predicate(p) => {
			let Predicate {
				lhs,
				op,
				rhs,
			} = p;
			if !lhs.is_extractor() && rhs.is_extractor() {
				Expression::Predicate(Predicate::new(rhs, op.mirror(), lhs))
			} else {
				Expression::Predicate(Predicate::new(lhs, op, rhs))
			}
		}
		Expression::Conjunction(children) => Expression::Conjunction(children.into_iter().map(align).collect()),
		Expression::Disjunction(children) => Expression::Disjunction(children.into_iter().map(align).collect()),
		Expression::Negation(inner) => Expression::Negation(Box::new(align(*inner))),
		other => other,
	}
}

/// Pushes `Negation` nodes down into predicate operators (flipping `op`);
/// De Morgan's laws turn `!Conjunction` into `Disjunction` of negated
/// children and vice versa; double negation cancels outright.
fn denegate(expr: Expression) -> Expression {
	match expr {
		Expression::Negation(inner) => match *inner {
			Expression::Negation(inner2) => denegate(*inner2),
			Expression::Predicate(Predicate {
				lhs,
				op,
				rhs,
			}) => Expression::Predicate(Predicate::new(lhs, op.flip(), rhs)),
			Expression::Conjunction(children) => Expression::Disjunction(
				children.into_iter().map(|c| denegate(Expression::Negation(Box::new(c)))).collect(),
			),
			Expression::Disjunction(children) => Expression::Conjunction(
				children.into_iter().map(|c| denegate(Expression::Negation(Box::new(c)))).collect(),
			),
			Expression::Empty => Expression::Empty,
		},
		Expression::Conjunction(children) => Expression::Conjunction(children.into_iter().map(denegate).collect()),
		Expression::Disjunction(children) => Expression::Disjunction(children.into_iter().map(denegate).collect()),
		other => other,
	}
}

/// A canonical string key for a predicate, used only to detect structural
/// duplicates among an AND/OR's direct children — not exposed outside this
/// module.
fn predicate_key(p: &Predicate) -> String {
	format!("{:?}{}{:?}", p.lhs, p.op, p.rhs)
}

fn expr_key(e: &Expression) -> Option<String> {
	match e {
		Expression::Predicate(p) => Some(predicate_key(p)),
		_ => None,
	}
}

/// Removes duplicate predicates from each AND/OR child set; children that
/// aren't bare predicates (nested connectives) are never deduplicated
/// against each other, only recursed into.
fn dedup(expr: Expression) -> Expression {
	match expr {
		Expression::Conjunction(children) => Expression::Conjunction(dedup_children(children)),
		Expression::Disjunction(children) => Expression::Disjunction(dedup_children(children)),
		Expression::Negation(inner) => Expression::Negation(Box::new(dedup(*inner))),
		other => other,
	}
}

fn dedup_children(children: Vec<Expression>) -> Vec<Expression> {
	let mut seen = std::collections::HashSet::new();
	let mut out = Vec::with_capacity(children.len());
	for child in children.into_iter().map(dedup) {
		match expr_key(&child) {
			Some(key) if !seen.insert(key) => continue,
			_ => out.push(child),
		}
	}
	out
}

/// `hoister → aligner → denegator → deduplicator → hoister` (§4.4): the
/// trailing hoist catches unary AND/OR produced by deduplication.
pub fn normalize(expr: Expression) -> Expression {
	let expr = hoist(expr);
	let expr = align(expr);
	let expr = denegate(expr);
	let expr = dedup(expr);
	hoist(expr)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Value;

	fn pred(field: &str, op: RelOp, v: i64) -> Expression {
		Expression::Predicate(Predicate::new(Operand::FieldExtractor(field.into()), op, Operand::Data(Value::Int(v))))
	}

	/// Scenario S4: double negation over a conjunction denegates cleanly.
	#[test]
	fn s4_double_negation_cancels() {
		let inner = Expression::and(vec![pred("x", RelOp::Eq, 1), pred("y", RelOp::Eq, 2)]);
		let expr = Expression::not(Expression::not(inner.clone()));
		assert_eq!(normalize(expr), normalize(inner));
	}

	#[test]
	fn idempotent() {
		let expr = Expression::not(Expression::or(vec![pred("x", RelOp::Lt, 1), pred("x", RelOp::Lt, 1)]));
		let once = normalize(expr);
		let twice = normalize(once.clone());
		assert_eq!(once, twice);
	}

	#[test]
	fn no_negation_survives() {
		fn has_negation(e: &Expression) -> bool {
			match e {
				Expression::Negation(_) => true,
				Expression::Conjunction(cs) | Expression::Disjunction(cs) => cs.iter().any(has_negation),
				_ => false,
			}
		}
		let expr = Expression::not(Expression::and(vec![
			pred("x", RelOp::Eq, 1),
			Expression::not(pred("y", RelOp::Ge, 2)),
		]));
		assert!(!has_negation(&normalize(expr)));
	}

	#[test]
	fn aligner_moves_extractor_to_lhs() {
		let expr = Expression::Predicate(Predicate::new(
			Operand::Data(Value::Int(5)),
			RelOp::Lt,
			Operand::FieldExtractor("x".into()),
		));
		let normalized = normalize(expr);
		match normalized {
			Expression::Predicate(p) => {
				assert!(p.lhs.is_extractor());
				assert_eq!(p.op, RelOp::Gt);
			}
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn deduplicates_direct_children() {
		let expr = Expression::and(vec![pred("x", RelOp::Eq, 1), pred("x", RelOp::Eq, 1), pred("y", RelOp::Eq, 2)]);
		let Expression::Conjunction(children) = normalize(expr) else {
			panic!("expected a conjunction");
		};
		assert_eq!(children.len(), 2);
	}
}
