//! Recursive-descent parser for the text expression syntax (§6).
//!
//! Grounded in the teacher's `syn::v2::parser` decomposition (a lexer feeding
//! a hand-written recursive-descent parser, one function per grammar rule)
//! but self-contained: this grammar is small enough that a dedicated token
//! buffer isn't worth the indirection.

use super::ast::{Attribute, Expression, Operand, Predicate, RelOp};
use crate::err::{Error, Result};
use crate::value::{Address, Port, PortProto, Subnet, Value};
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Clone, Debug, PartialEq)]
enum Tok {
	LParen,
	RParen,
	LBracket,
	RBracket,
	Comma,
	And,
	Or,
	Not,
	Sym(&'static str),
	Str(String),
	Atom(String),
}

const SYMBOL_CHARS: &str = "=!<>~&|";

struct Lexer<'a> {
	chars: Peekable<CharIndices<'a>>,
	src: &'a str,
}

impl<'a> Lexer<'a> {
	fn new(src: &'a str) -> Self {
		Self {
			chars: src.char_indices().peekable(),
			src,
		}
	}

	fn tokens(mut self) -> Result<Vec<Tok>> {
		let mut out = Vec::new();
		while let Some(tok) = self.next_token()? {
			out.push(tok);
		}
		Ok(out)
	}

	fn next_token(&mut self) -> Result<Option<Tok>> {
		while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
			self.chars.next();
		}
		let Some(&(start, c)) = self.chars.peek() else {
			return Ok(None);
		};
		match c {
			'(' => {
				self.chars.next();
				Ok(Some(Tok::LParen))
			}
			')' => {
				self.chars.next();
				Ok(Some(Tok::RParen))
			}
			'[' => {
				self.chars.next();
				Ok(Some(Tok::LBracket))
			}
			']' => {
				self.chars.next();
				Ok(Some(Tok::RBracket))
			}
			',' => {
				self.chars.next();
				Ok(Some(Tok::Comma))
			}
			'"' => self.lex_string().map(Some),
			c if SYMBOL_CHARS.contains(c) => Ok(Some(self.lex_symbol_run(start))),
			_ => Ok(Some(self.lex_atom(start))),
		}
	}

	fn lex_string(&mut self) -> Result<Tok> {
		self.chars.next(); // opening quote
		let mut s = String::new();
		loop {
			match self.chars.next() {
				Some((_, '"')) => return Ok(Tok::Str(s)),
				Some((_, '\\')) => match self.chars.next() {
					Some((_, 'n')) => s.push('\n'),
					Some((_, 't')) => s.push('\t'),
					Some((_, other)) => s.push(other),
					None => return Err(Error::syntax_error("unterminated escape in string literal")),
				},
				Some((_, c)) => s.push(c),
				None => return Err(Error::syntax_error("unterminated string literal")),
			}
		}
	}

	fn lex_symbol_run(&mut self, start: usize) -> Tok {
		let mut end = start;
		while matches!(self.chars.peek(), Some((_, c)) if SYMBOL_CHARS.contains(*c)) {
			end = self.chars.next().unwrap().0;
		}
		let run = &self.src[start..=end];
		match run {
			"==" => Tok::Sym("=="),
			"!=" => Tok::Sym("!="),
			"<" => Tok::Sym("<"),
			"<=" => Tok::Sym("<="),
			">" => Tok::Sym(">"),
			">=" => Tok::Sym(">="),
			"~" => Tok::Sym("~"),
			"!~" => Tok::Sym("!~"),
			"&&" => Tok::And,
			"||" => Tok::Or,
			"!" => Tok::Not,
			other => Tok::Atom(other.to_string()),
		}
	}

	fn lex_atom(&mut self, start: usize) -> Tok {
		let mut end = start;
		while let Some(&(i, c)) = self.chars.peek() {
			if c.is_whitespace() || "()[],\"".contains(c) || SYMBOL_CHARS.contains(c) {
				break;
			}
			end = i;
			self.chars.next();
		}
		Tok::Atom(self.src[start..=end].to_string())
	}
}

fn tokenize(src: &str) -> Result<Vec<Tok>> {
	Lexer::new(src).tokens()
}

struct Parser {
	tokens: Vec<Tok>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Tok> {
		self.tokens.get(self.pos)
	}

	fn peek2(&self) -> Option<&Tok> {
		self.tokens.get(self.pos + 1)
	}

	fn advance(&mut self) -> Option<Tok> {
		let tok = self.tokens.get(self.pos).cloned();
		if tok.is_some() {
			self.pos += 1;
		}
		tok
	}

	fn expect(&mut self, expected: &Tok) -> Result<()> {
		match self.advance() {
			Some(ref t) if t == expected => Ok(()),
			other => Err(Error::syntax_error(format!("expected {expected:?}, found {other:?}"))),
		}
	}

	fn parse_expr(&mut self) -> Result<Expression> {
		self.parse_or()
	}

	fn parse_or(&mut self) -> Result<Expression> {
		let mut children = vec![self.parse_and()?];
		while matches!(self.peek(), Some(Tok::Or)) {
			self.advance();
			children.push(self.parse_and()?);
		}
		Ok(if children.len() == 1 {
			children.pop().unwrap()
		} else {
			Expression::Disjunction(children)
		})
	}

	fn parse_and(&mut self) -> Result<Expression> {
		let mut children = vec![self.parse_unary()?];
		while matches!(self.peek(), Some(Tok::And)) {
			self.advance();
			children.push(self.parse_unary()?);
		}
		Ok(if children.len() == 1 {
			children.pop().unwrap()
		} else {
			Expression::Conjunction(children)
		})
	}

	fn parse_unary(&mut self) -> Result<Expression> {
		if matches!(self.peek(), Some(Tok::Not)) {
			self.advance();
			let inner = self.parse_unary()?;
			return Ok(Expression::not(inner));
		}
		self.parse_primary()
	}

	fn parse_primary(&mut self) -> Result<Expression> {
		if matches!(self.peek(), Some(Tok::LParen)) {
			self.advance();
			let inner = self.parse_expr()?;
			self.expect(&Tok::RParen)?;
			return Ok(inner);
		}
		self.parse_predicate()
	}

	fn parse_predicate(&mut self) -> Result<Expression> {
		let lhs = self.parse_operand()?;
		let op = self.parse_operator()?;
		let rhs = self.parse_operand()?;
		Ok(Expression::Predicate(Predicate::new(lhs, op, rhs)))
	}

	/// Operators that start with `!` (`!in`, `!ni`, `!~`) are two raw tokens
	/// (`Not` then an atom, or `Not` then `Sym("~")`) because `!` is always
	/// lexed standalone; disambiguated here from logical negation by parser
	/// position, since `!` as logical-not only ever appears at the start of
	/// a primary (immediately followed by `(`), never between two operands.
	fn parse_operator(&mut self) -> Result<RelOp> {
		if matches!(self.peek(), Some(Tok::Not)) {
			let negated = match self.peek2() {
				Some(Tok::Atom(a)) if a == "in" => Some(RelOp::NotIn),
				Some(Tok::Atom(a)) if a == "ni" => Some(RelOp::NotNi),
				Some(Tok::Sym("~")) => Some(RelOp::NotMatch),
				_ => None,
			};
			if let Some(op) = negated {
				self.advance();
				self.advance();
				return Ok(op);
			}
		}
		match self.advance() {
			Some(Tok::Sym("==")) => Ok(RelOp::Eq),
			Some(Tok::Sym("!=")) => Ok(RelOp::Ne),
			Some(Tok::Sym("<")) => Ok(RelOp::Lt),
			Some(Tok::Sym("<=")) => Ok(RelOp::Le),
			Some(Tok::Sym(">")) => Ok(RelOp::Gt),
			Some(Tok::Sym(">=")) => Ok(RelOp::Ge),
			Some(Tok::Sym("~")) => Ok(RelOp::Match),
			Some(Tok::Atom(a)) if a == "in" => Ok(RelOp::In),
			Some(Tok::Atom(a)) if a == "ni" => Ok(RelOp::Ni),
			other => Err(Error::syntax_error(format!("expected a relational operator, found {other:?}"))),
		}
	}

	fn parse_operand(&mut self) -> Result<Operand> {
		match self.advance() {
			Some(Tok::Str(s)) => Ok(Operand::Data(Value::String(s))),
			Some(Tok::LBracket) => self.parse_list_operand(),
			Some(Tok::Atom(a)) if a.starts_with('#') => parse_attribute(&a).map(Operand::AttributeExtractor),
			Some(Tok::Atom(a)) if is_type_extractor(&a) => Ok(Operand::TypeExtractor(a[1..].to_string())),
			Some(Tok::Atom(a)) => Ok(classify_atom(&a)),
			other => Err(Error::syntax_error(format!("expected an operand, found {other:?}"))),
		}
	}

	fn parse_list_operand(&mut self) -> Result<Operand> {
		let mut items = Vec::new();
		if !matches!(self.peek(), Some(Tok::RBracket)) {
			loop {
				match self.parse_operand()? {
					Operand::Data(v) => items.push(v),
					other => return Err(Error::syntax_error(format!("list elements must be literals, found {other}"))),
				}
				if matches!(self.peek(), Some(Tok::Comma)) {
					self.advance();
				} else {
					break;
				}
			}
		}
		self.expect(&Tok::RBracket)?;
		Ok(Operand::Data(Value::List(items)))
	}
}

/// `:addr`-shaped type extractors are letters/digits/underscore only, which
/// disambiguates them from IPv6 addresses (`::1`, `2001:db8::1`) that also
/// start with `:` but contain a second colon or a digit run.
fn is_type_extractor(atom: &str) -> bool {
	atom.strip_prefix(':').is_some_and(|rest| {
		!rest.is_empty() && rest.chars().next().unwrap().is_ascii_alphabetic() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
	})
}

fn parse_attribute(atom: &str) -> Result<Attribute> {
	match &atom[1..] {
		"timestamp" => Ok(Attribute::Timestamp),
		"type" => Ok(Attribute::Type),
		"field" => Ok(Attribute::Field),
		other => Err(Error::syntax_error(format!("unknown attribute extractor #{other}"))),
	}
}

/// Classifies a bareword atom as a field path or one of the literal forms
/// (§6): integer, real, address, subnet, port, duration, timestamp. The
/// first successful classification wins; an atom that matches none of these
/// shapes is treated as a dotted field path.
fn classify_atom(atom: &str) -> Operand {
	if let Some(v) = try_subnet(atom).or_else(|| try_address(atom)) {
		return Operand::Data(v);
	}
	if let Some(v) = try_port(atom) {
		return Operand::Data(v);
	}
	if let Ok(i) = atom.parse::<i64>() {
		return Operand::Data(Value::Int(i));
	}
	if let Some(v) = try_duration(atom) {
		return Operand::Data(v);
	}
	if let Ok(r) = atom.parse::<f64>() {
		return Operand::Data(Value::Real(r));
	}
	if let Some(v) = try_timestamp(atom) {
		return Operand::Data(v);
	}
	Operand::FieldExtractor(atom.to_string())
}

fn try_subnet(atom: &str) -> Option<Value> {
	let (addr_part, len_part) = atom.split_once('/')?;
	let prefix_len: u8 = len_part.parse().ok()?;
	let network = parse_address(addr_part)?;
	Some(Value::Subnet(Subnet {
		network,
		prefix_len,
	}))
}

fn try_address(atom: &str) -> Option<Value> {
	parse_address(atom).map(Value::Address)
}

fn parse_address(s: &str) -> Option<Address> {
	if let Ok(v4) = s.parse::<std::net::Ipv4Addr>() {
		return Some(Address::v4(v4));
	}
	if s.contains(':') {
		if let Ok(v6) = s.parse::<std::net::Ipv6Addr>() {
			return Some(Address::v6(v6));
		}
	}
	None
}

fn try_port(atom: &str) -> Option<Value> {
	let (number_part, proto_part) = atom.split_once('/')?;
	let number: u16 = number_part.parse().ok()?;
	let proto = match proto_part {
		"tcp" => PortProto::Tcp,
		"udp" => PortProto::Udp,
		"icmp" => PortProto::Icmp,
		"icmp6" => PortProto::Icmp6,
		"sctp" => PortProto::Sctp,
		"?" => PortProto::Unknown,
		_ => return None,
	};
	Some(Value::Port(Port {
		number,
		proto,
	}))
}

fn try_duration(atom: &str) -> Option<Value> {
	let split_at = atom.find(|c: char| !c.is_ascii_digit() && c != '.')?;
	let (number, unit) = atom.split_at(split_at);
	let magnitude: f64 = number.parse().ok()?;
	let secs = match unit {
		"ns" => magnitude / 1_000_000_000.0,
		"us" => magnitude / 1_000_000.0,
		"ms" => magnitude / 1_000.0,
		"s" => magnitude,
		"m" => magnitude * 60.0,
		"h" => magnitude * 3_600.0,
		"d" => magnitude * 86_400.0,
		"w" => magnitude * 604_800.0,
		_ => return None,
	};
	Some(Value::Duration(std::time::Duration::from_secs_f64(secs.max(0.0))))
}

fn try_timestamp(atom: &str) -> Option<Value> {
	chrono::DateTime::parse_from_rfc3339(atom).ok().map(|dt| Value::Timestamp(dt.timestamp()))
}

/// Parses the §6 text syntax into an [`Expression`].
pub fn parse(src: &str) -> Result<Expression> {
	let tokens = tokenize(src)?;
	if tokens.is_empty() {
		return Ok(Expression::Empty);
	}
	let mut parser = Parser {
		tokens,
		pos: 0,
	};
	let expr = parser.parse_expr()?;
	if parser.pos != parser.tokens.len() {
		return Err(Error::syntax_error(format!("unexpected trailing input at token {}", parser.pos)));
	}
	Ok(expr)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_predicate() {
		let expr = parse("proto == \"tcp\"").unwrap();
		match expr {
			Expression::Predicate(p) => {
				assert_eq!(p.lhs, Operand::FieldExtractor("proto".into()));
				assert_eq!(p.op, RelOp::Eq);
				assert_eq!(p.rhs, Operand::Data(Value::String("tcp".into())));
			}
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn parses_conjunction_and_disjunction_precedence() {
		let expr = parse("a == 1 && b == 2 || c == 3").unwrap();
		// `||` binds loosest: (a==1 && b==2) || c==3
		let Expression::Disjunction(children) = expr else {
			panic!("expected a disjunction at the top");
		};
		assert!(matches!(children[0], Expression::Conjunction(_)));
	}

	#[test]
	fn parses_negation_of_parenthesized_expr() {
		let expr = parse("!(!(x == 1 && y == 2))").unwrap();
		assert!(matches!(expr, Expression::Negation(_)));
	}

	#[test]
	fn parses_not_in_operator() {
		let expr = parse("x !in 10.0.0.0/8").unwrap();
		match expr {
			Expression::Predicate(p) => assert_eq!(p.op, RelOp::NotIn),
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn parses_address_and_subnet_literals() {
		let expr = parse(":addr == 10.0.0.1").unwrap();
		match expr {
			Expression::Predicate(p) => {
				assert_eq!(p.lhs, Operand::TypeExtractor("addr".into()));
				assert!(matches!(p.rhs, Operand::Data(Value::Address(_))));
			}
			_ => panic!("expected a predicate"),
		}
		let expr = parse("net in 10.0.0.0/8").unwrap();
		match expr {
			Expression::Predicate(p) => assert!(matches!(p.rhs, Operand::Data(Value::Subnet(_)))),
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn parses_attribute_extractors() {
		let expr = parse("#type == \"conn\"").unwrap();
		match expr {
			Expression::Predicate(p) => assert_eq!(p.lhs, Operand::AttributeExtractor(Attribute::Type)),
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn parses_list_literal() {
		let expr = parse("port in [80, 443, 8080]").unwrap();
		match expr {
			Expression::Predicate(p) => match p.rhs {
				Operand::Data(Value::List(items)) => assert_eq!(items.len(), 3),
				_ => panic!("expected a list literal"),
			},
			_ => panic!("expected a predicate"),
		}
	}

	#[test]
	fn rejects_malformed_input() {
		assert!(parse("a ==").is_err());
	}
}
