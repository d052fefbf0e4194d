//! `tailor`, `validate`, `resolve` (§4.4): the passes that bind an
//! extractor-carrying expression to one concrete record [`Layout`].

use super::ast::{Expression, Operand, Predicate, RelOp, TreePath};
use crate::err::{Error, Result};
use crate::schema::Layout;

/// Replaces each `FieldExtractor`/`TypeExtractor` operand with one or more
/// `DataExtractor(type, offset)` predicates, ORed together when more than
/// one column matches. A `FieldExtractor`/`TypeExtractor` that matches no
/// column in `layout` is a `no_such_field` error that aborts the whole call
/// (§4.4) — `AttributeExtractor` and `Data` operands pass through untouched,
/// since the meta-index (not `tailor`) interprets attribute extractors.
pub fn tailor(expr: Expression, layout: &Layout) -> Result<Expression> {
	match expr {
		Expression::Predicate(p) => tailor_predicate(p, layout),
		Expression::Conjunction(children) => Ok(Expression::Conjunction(
			children.into_iter().map(|c| tailor(c, layout)).collect::<Result<_>>()?,
		)),
		Expression::Disjunction(children) => Ok(Expression::Disjunction(
			children.into_iter().map(|c| tailor(c, layout)).collect::<Result<_>>()?,
		)),
		Expression::Negation(inner) => Ok(Expression::Negation(Box::new(tailor(*inner, layout)?))),
		Expression::Empty => Ok(Expression::Empty),
	}
}

fn tailor_predicate(p: Predicate, layout: &Layout) -> Result<Expression> {
	let lhs_columns = tailor_operand(&p.lhs, layout)?;
	let rhs_columns = tailor_operand(&p.rhs, layout)?;
	match (lhs_columns, rhs_columns) {
		(Some(offsets), None) => Ok(fan_out(offsets, layout, |offset| {
			Predicate::new(data_extractor(layout, offset), p.op, p.rhs.clone())
		})),
		(None, Some(offsets)) => Ok(fan_out(offsets, layout, |offset| {
			Predicate::new(p.lhs.clone(), p.op, data_extractor(layout, offset))
		})),
		(None, None) => Ok(Expression::Predicate(p)),
		(Some(_), Some(_)) => Ok(Expression::Predicate(p)),
	}
}

/// `Some(offsets)` when the operand is a `FieldExtractor`/`TypeExtractor`
/// that needs fanning out; `None` when it passes through as-is.
fn tailor_operand(operand: &Operand, layout: &Layout) -> Result<Option<Vec<usize>>> {
	match operand {
		Operand::FieldExtractor(name) => match layout.offset_of(name) {
			Some(offset) => Ok(Some(vec![offset])),
			None => Err(Error::invalid_query(format!("no_such_field: {name} in layout {layout}"))),
		},
		Operand::TypeExtractor(type_name) => {
			let offsets = layout.offsets_of_type(type_name);
			if offsets.is_empty() {
				Err(Error::invalid_query(format!("no_such_field: no column of type {type_name} in layout {layout}")))
			} else {
				Ok(Some(offsets))
			}
		}
		_ => Ok(None),
	}
}

fn data_extractor(layout: &Layout, offset: usize) -> Operand {
	Operand::DataExtractor(layout.field(offset).type_name.clone(), offset)
}

fn fan_out(offsets: Vec<usize>, _layout: &Layout, build: impl Fn(usize) -> Predicate) -> Expression {
	if offsets.len() == 1 {
		Expression::Predicate(build(offsets[0]))
	} else {
		Expression::Disjunction(offsets.into_iter().map(|o| Expression::Predicate(build(o))).collect())
	}
}

/// Checks each predicate's operand compatibility (§4.4): a comparison
/// between two extractors with no literal data anywhere is a `syntax_error`,
/// since there is nothing to look up in a value index.
pub fn validate(expr: &Expression) -> Result<()> {
	match expr {
		Expression::Predicate(p) => {
			if p.lhs.is_extractor() && p.rhs.is_extractor() {
				return Err(Error::syntax_error(format!("predicate has no data operand: {p}")));
			}
			Ok(())
		}
		Expression::Conjunction(children) | Expression::Disjunction(children) => {
			children.iter().try_for_each(validate)
		}
		Expression::Negation(inner) => validate(inner),
		Expression::Empty => Ok(()),
	}
}

/// Flattens a tailored expression into `(path, predicate)` pairs for the
/// evaluator (§4.4). The path is the sequence of child indexes from the
/// root, which is always `[0]`.
pub fn resolve(expr: &Expression, _layout: &Layout) -> Vec<(TreePath, Predicate)> {
	if validate(expr).is_err() {
		return Vec::new();
	}
	let mut out = Vec::new();
	resolve_into(expr, vec![0], &mut out);
	out
}

fn resolve_into(expr: &Expression, path: TreePath, out: &mut Vec<(TreePath, Predicate)>) {
	match expr {
		Expression::Predicate(p) => out.push((path, p.clone())),
		Expression::Conjunction(children) | Expression::Disjunction(children) => {
			for (i, child) in children.iter().enumerate() {
				let mut child_path = path.clone();
				child_path.push(i);
				resolve_into(child, child_path, out);
			}
		}
		Expression::Negation(inner) => resolve_into(inner, path, out),
		Expression::Empty => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::FieldDef;
	use crate::value::Value;

	fn layout() -> Layout {
		Layout::new(
			"conn",
			vec![FieldDef::new("id.orig_h", "addr"), FieldDef::new("id.resp_h", "addr"), FieldDef::new("proto", "string")],
		)
	}

	#[test]
	fn field_extractor_resolves_to_data_extractor() {
		let expr = Expression::Predicate(Predicate::new(
			Operand::FieldExtractor("proto".into()),
			RelOp::Eq,
			Operand::Data(Value::String("tcp".into())),
		));
		let tailored = tailor(expr, &layout()).unwrap();
		match tailored {
			Expression::Predicate(p) => assert_eq!(p.lhs, Operand::DataExtractor("string".into(), 2)),
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn type_extractor_fans_out_into_disjunction() {
		let expr = Expression::Predicate(Predicate::new(
			Operand::TypeExtractor("addr".into()),
			RelOp::Eq,
			Operand::Data(Value::String("10.0.0.1".into())),
		));
		let tailored = tailor(expr, &layout()).unwrap();
		let Expression::Disjunction(children) = tailored else {
			panic!("expected a disjunction");
		};
		assert_eq!(children.len(), 2);
	}

	#[test]
	fn unknown_field_is_an_error() {
		let expr = Expression::Predicate(Predicate::new(
			Operand::FieldExtractor("nope".into()),
			RelOp::Eq,
			Operand::Data(Value::Int(1)),
		));
		assert!(tailor(expr, &layout()).is_err());
	}

	#[test]
	fn resolve_assigns_tree_paths() {
		let expr = Expression::Conjunction(vec![
			Expression::Predicate(Predicate::new(
				Operand::DataExtractor("addr".into(), 0),
				RelOp::Eq,
				Operand::Data(Value::Int(1)),
			)),
			Expression::Predicate(Predicate::new(
				Operand::DataExtractor("addr".into(), 1),
				RelOp::Eq,
				Operand::Data(Value::Int(2)),
			)),
		]);
		let resolved = resolve(&expr, &layout());
		assert_eq!(resolved[0].0, vec![0, 0]);
		assert_eq!(resolved[1].0, vec![0, 1]);
	}

	#[test]
	fn validate_rejects_two_extractors() {
		let expr = Expression::Predicate(Predicate::new(
			Operand::FieldExtractor("a".into()),
			RelOp::Lt,
			Operand::FieldExtractor("b".into()),
		));
		assert!(validate(&expr).is_err());
	}
}
