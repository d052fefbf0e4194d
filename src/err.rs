//! Crate-wide error type.
//!
//! Mirrors the teacher's per-subsystem error pattern (e.g. `gql::error::GqlError`
//! wrapping `crate::err::Error`): each subsystem converts its local failures into
//! one of these variants at its boundary, so callers match on a single type.

use thiserror::Error;

/// Error kinds named by the error-handling design (propagation policy in full
/// in the design doc): local index/synopsis errors are recovered by the
/// expression evaluator and never surface past a single predicate; the rest
/// are surfaced to the caller or are fatal to the coordinator.
#[derive(Debug, Error)]
pub enum Error {
	/// A predicate operand's type is incompatible with the indexed column's type.
	#[error("type clash: {0}")]
	TypeClash(String),

	/// The operator is not supported by the target value index (e.g. `<` on a string).
	#[error("unsupported operator: {0}")]
	UnsupportedOperator(String),

	/// The expression text or AST is malformed.
	#[error("syntax error: {0}")]
	SyntaxError(String),

	/// On-disk data failed a version check or structural validation.
	#[error("format error: {0}")]
	FormatError(String),

	/// A read or write against the filesystem collaborator failed.
	#[error("filesystem error: {0}")]
	FilesystemError(String),

	/// A precondition was violated (e.g. an unknown partition id was requested).
	#[error("logic error: {0}")]
	LogicError(String),

	/// The expression could not be resolved against the given record type.
	#[error("invalid query: {0}")]
	InvalidQuery(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	pub fn type_clash(msg: impl Into<String>) -> Self {
		Self::TypeClash(msg.into())
	}

	pub fn unsupported_operator(msg: impl Into<String>) -> Self {
		Self::UnsupportedOperator(msg.into())
	}

	pub fn syntax_error(msg: impl Into<String>) -> Self {
		Self::SyntaxError(msg.into())
	}

	pub fn format_error(msg: impl Into<String>) -> Self {
		Self::FormatError(msg.into())
	}

	pub fn logic_error(msg: impl Into<String>) -> Self {
		Self::LogicError(msg.into())
	}

	pub fn invalid_query(msg: impl Into<String>) -> Self {
		Self::InvalidQuery(msg.into())
	}

	/// True for the two predicate-local error kinds that the evaluator must
	/// recover from instead of aborting the whole query (§7).
	pub fn is_predicate_local(&self) -> bool {
		matches!(self, Self::TypeClash(_) | Self::UnsupportedOperator(_))
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
