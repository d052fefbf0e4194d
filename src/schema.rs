//! Record layouts (GLOSSARY: "Layout", "Qualified field"): the column table
//! `tailor`/`resolve` and the partition's column table are built from.

use std::fmt;

/// One column of a [`Layout`]: a dotted field path, its declared type name,
/// and the attributes that gate indexing (`skip`) and meta-index treatment
/// (`timestamp`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
	pub path: String,
	pub type_name: String,
	pub attributes: Vec<String>,
}

impl FieldDef {
	pub fn new(path: impl Into<String>, type_name: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			type_name: type_name.into(),
			attributes: Vec::new(),
		}
	}

	pub fn with_attribute(mut self, attr: impl Into<String>) -> Self {
		self.attributes.push(attr.into());
		self
	}

	pub fn has_attribute(&self, attr: &str) -> bool {
		self.attributes.iter().any(|a| a == attr)
	}
}

/// A record type (GLOSSARY: "Layout"): a name plus an ordered column table.
/// Column offsets are stable for the lifetime of a layout and are what
/// `DataExtractor` addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
	pub name: String,
	pub fields: Vec<FieldDef>,
}

impl Layout {
	pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
		Self {
			name: name.into(),
			fields,
		}
	}

	pub fn offset_of(&self, path: &str) -> Option<usize> {
		self.fields.iter().position(|f| f.path == path)
	}

	pub fn offsets_of_type(&self, type_name: &str) -> Vec<usize> {
		self.fields.iter().enumerate().filter(|(_, f)| f.type_name == type_name).map(|(i, _)| i).collect()
	}

	pub fn offsets_with_attribute(&self, attr: &str) -> Vec<usize> {
		self.fields.iter().enumerate().filter(|(_, f)| f.has_attribute(attr)).map(|(i, _)| i).collect()
	}

	/// GLOSSARY "Qualified field": `(layout_name, field_path, field_type)`,
	/// rendered `layout.path` for the `#field` suffix match (§4.5).
	pub fn qualified_name(&self, offset: usize) -> String {
		format!("{}.{}", self.name, self.fields[offset].path)
	}

	pub fn field(&self, offset: usize) -> &FieldDef {
		&self.fields[offset]
	}
}

impl fmt::Display for Layout {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.name)
	}
}
