//! Evaluation of search filters against entry attributes.
//!
//! Filters are plain data; parsing the wire syntax into a [`Filter`] is the
//! protocol layer's job (see [`crate::server`]).
use crate::entry::Attributes;

/// The parts of a substring assertion, e.g. `(cn=ad*mi*n)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstringFilter {
	/// Required prefix.
	pub initial: Option<String>,
	/// Fragments that must appear in order after the prefix.
	pub any: Vec<String>,
	/// Required suffix.
	pub final_: Option<String>,
}

impl SubstringFilter {
	/// Whether `value` matches this assertion. Segments may not overlap.
	#[must_use]
	pub fn matches(&self, value: &str) -> bool {
		let mut rest = value;
		if let Some(initial) = &self.initial {
			match rest.strip_prefix(initial.as_str()) {
				Some(tail) => rest = tail,
				None => return false,
			}
		}
		let mut end = rest.len();
		if let Some(final_) = &self.final_ {
			if !rest.ends_with(final_.as_str()) {
				return false;
			}
			end -= final_.len();
		}
		let mut rest = &rest[..end];
		for fragment in &self.any {
			match rest.find(fragment.as_str()) {
				Some(pos) => rest = &rest[pos + fragment.len()..],
				None => return false,
			}
		}
		true
	}
}

/// A boolean filter over an entry's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
	/// The attribute has exactly this value.
	Equality(String, String),
	/// The attribute has at least one value.
	Present(String),
	/// The attribute has a value matching the substring assertion.
	Substring(String, SubstringFilter),
	/// All sub-filters match. Empty means true.
	And(Vec<Filter>),
	/// At least one sub-filter matches. Empty means false.
	Or(Vec<Filter>),
	/// The sub-filter does not match.
	Not(Box<Filter>),
}

impl Filter {
	/// A filter that matches every entry.
	#[must_use]
	pub fn always() -> Self {
		Filter::And(Vec::new())
	}

	/// A filter that matches no entry.
	#[must_use]
	pub fn never() -> Self {
		Filter::Or(Vec::new())
	}

	/// Evaluate the filter against `attributes`.
	#[must_use]
	pub fn matches(&self, attributes: &Attributes) -> bool {
		matches(self, attributes)
	}
}

/// Evaluate `filter` against `attributes`.
///
/// Attribute names compare case-insensitively, values exactly. A multi-valued
/// attribute matches if any value does. Missing attributes never match.
#[must_use]
pub fn matches(filter: &Filter, attributes: &Attributes) -> bool {
	match filter {
		Filter::Equality(attr, expected) => any_value(attributes, attr, |v| v == expected.as_str()),
		Filter::Present(attr) => attributes.get(attr).is_some_and(|values| !values.is_empty()),
		Filter::Substring(attr, substring) => {
			any_value(attributes, attr, |v| substring.matches(v))
		}
		Filter::And(filters) => filters.iter().all(|f| matches(f, attributes)),
		Filter::Or(filters) => filters.iter().any(|f| matches(f, attributes)),
		Filter::Not(inner) => !matches(inner, attributes),
	}
}

/// Whether any value of `attr` satisfies `predicate`.
fn any_value(attributes: &Attributes, attr: &str, predicate: impl Fn(&str) -> bool) -> bool {
	attributes.get(attr).is_some_and(|values| values.iter().any(|v| predicate(v.as_str())))
}
