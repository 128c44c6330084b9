//! Distinguished name parsing and hierarchy checks.
//!
//! A [`Dn`] stores its relative components leftmost first, the way they are
//! written. Hierarchy relations are decided on the rightmost components, so
//! `ou=users,dc=example` is an ancestor of `cn=admin,ou=users,dc=example`.
use std::{fmt, str::FromStr};

use crate::error::Error;

/// A single `type=value` component of a distinguished name.
#[derive(Debug, Clone, Eq)]
pub struct Rdn {
	/// The attribute type, e.g. `cn`.
	attr: String,
	/// The unescaped attribute value.
	value: String,
}

impl Rdn {
	/// Create a component from an attribute type and an unescaped value.
	#[must_use]
	pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
		Self { attr: attr.into(), value: value.into() }
	}

	/// The attribute type of this component.
	#[must_use]
	pub fn attr(&self) -> &str {
		&self.attr
	}

	/// The unescaped value of this component.
	#[must_use]
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Parse a single `type=value` component.
	fn parse(component: &str) -> Result<Self, Error> {
		let split = find_unescaped(component, '=')
			.ok_or_else(|| Error::MalformedDn(format!("Missing '=' in \"{component}\"")))?;
		let attr = component[..split].trim();
		if attr.is_empty() {
			return Err(Error::MalformedDn(format!("Empty attribute type in \"{component}\"")));
		}
		let value = unescape(component[split + 1..].trim());
		Ok(Self::new(attr, value))
	}
}

impl PartialEq for Rdn {
	fn eq(&self, other: &Self) -> bool {
		self.attr.eq_ignore_ascii_case(&other.attr) && self.value.eq_ignore_ascii_case(&other.value)
	}
}

impl fmt::Display for Rdn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.attr, ldap3::dn_escape(self.value.as_str()))
	}
}

/// A parsed distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
	/// Components, leftmost (most specific) first.
	rdns: Vec<Rdn>,
}

impl Dn {
	/// Parse a distinguished name. The empty string is the root DSE.
	pub fn parse(dn: &str) -> Result<Self, Error> {
		if dn.trim().is_empty() {
			return Ok(Self::default());
		}
		let rdns = split_unescaped(dn, ',').into_iter().map(Rdn::parse).collect::<Result<_, _>>()?;
		Ok(Self { rdns })
	}

	/// The components of this name, leftmost first.
	#[must_use]
	pub fn rdns(&self) -> &[Rdn] {
		&self.rdns
	}

	/// Whether this is the empty name of the root DSE.
	#[must_use]
	pub fn is_root(&self) -> bool {
		self.rdns.is_empty()
	}

	/// Build the name of a direct child of this entry.
	#[must_use]
	pub fn child(&self, rdn: Rdn) -> Self {
		let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
		rdns.push(rdn);
		rdns.extend(self.rdns.iter().cloned());
		Self { rdns }
	}

	/// Whether `self` is a strict ancestor of `other`.
	#[must_use]
	pub fn is_ancestor_of(&self, other: &Dn) -> bool {
		self.rdns.len() < other.rdns.len() && self.is_suffix_of(other)
	}

	/// Whether `self` is the direct parent of `other`.
	#[must_use]
	pub fn is_parent_of(&self, other: &Dn) -> bool {
		self.rdns.len() + 1 == other.rdns.len() && self.is_suffix_of(other)
	}

	/// Whether `other` equals `self` or lies somewhere below it.
	#[must_use]
	pub fn contains(&self, other: &Dn) -> bool {
		self.rdns.len() <= other.rdns.len() && self.is_suffix_of(other)
	}

	/// The value of the leading `cn` component.
	pub fn common_name(&self) -> Result<&str, Error> {
		match self.rdns.first() {
			Some(rdn) if rdn.attr.eq_ignore_ascii_case("cn") && !rdn.value.is_empty() => {
				Ok(&rdn.value)
			}
			_ => Err(Error::MalformedDn(format!("No common name in \"{self}\""))),
		}
	}

	/// Compare the trailing components of `other` against all of `self`.
	fn is_suffix_of(&self, other: &Dn) -> bool {
		let offset = other.rdns.len().saturating_sub(self.rdns.len());
		other.rdns.len() >= self.rdns.len()
			&& self.rdns.iter().zip(&other.rdns[offset..]).all(|(a, b)| a == b)
	}
}

impl FromStr for Dn {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for Dn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, rdn) in self.rdns.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}
			write!(f, "{rdn}")?;
		}
		Ok(())
	}
}

/// Whether two distinguished names denote the same entry.
pub fn equals(a: &str, b: &str) -> Result<bool, Error> {
	Ok(Dn::parse(a)? == Dn::parse(b)?)
}

/// Whether `a` is a strict ancestor of `b`.
pub fn is_ancestor_of(a: &str, b: &str) -> Result<bool, Error> {
	Ok(Dn::parse(a)?.is_ancestor_of(&Dn::parse(b)?))
}

/// Extract the value of the leading `cn` component of `dn`.
pub fn common_name_of(dn: &str) -> Result<String, Error> {
	Dn::parse(dn)?.common_name().map(str::to_owned)
}

/// Byte offset of the first occurrence of `needle` not preceded by a backslash.
fn find_unescaped(s: &str, needle: char) -> Option<usize> {
	let mut escaped = false;
	for (i, c) in s.char_indices() {
		match c {
			_ if escaped => escaped = false,
			'\\' => escaped = true,
			c if c == needle => return Some(i),
			_ => {}
		}
	}
	None
}

/// Split on every unescaped occurrence of `sep`.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut rest = s;
	while let Some(i) = find_unescaped(rest, sep) {
		parts.push(&rest[..i]);
		rest = &rest[i + sep.len_utf8()..];
	}
	parts.push(rest);
	parts
}

/// Resolve `\c` and `\XX` escapes in an attribute value.
fn unescape(value: &str) -> String {
	let mut out = Vec::with_capacity(value.len());
	let bytes = value.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'\\' && i + 1 < bytes.len() {
			let hex = value.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok());
			if let Some(byte) = hex {
				out.push(byte);
				i += 3;
			} else {
				out.push(bytes[i + 1]);
				i += 2;
			}
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{common_name_of, equals, is_ancestor_of, Dn, Rdn};
	use crate::error::Error;

	#[test]
	fn parse_components() -> Result<(), Box<dyn std::error::Error>> {
		let dn = Dn::parse("cn=admin, ou=users ,dc=example")?;
		let parts: Vec<_> = dn.rdns().iter().map(|r| (r.attr(), r.value())).collect();
		assert_eq!(parts, [("cn", "admin"), ("ou", "users"), ("dc", "example")]);
		assert!(Dn::parse("")?.is_root());
		Ok(())
	}

	#[test]
	fn escaped_separators() -> Result<(), Box<dyn std::error::Error>> {
		let dn = Dn::parse(r"cn=Burgermeister\, Herbert,ou=users,dc=example")?;
		assert_eq!(dn.rdns().len(), 3);
		assert_eq!(dn.common_name()?, "Burgermeister, Herbert");

		let hex = Dn::parse(r"cn=a\2cb,dc=example")?;
		assert_eq!(hex.common_name()?, "a,b");
		Ok(())
	}

	#[test]
	fn malformed() {
		assert!(matches!(Dn::parse("admin,ou=users"), Err(Error::MalformedDn(_))));
		assert!(matches!(Dn::parse("=admin,ou=users"), Err(Error::MalformedDn(_))));
		assert!(matches!(Dn::parse("cn=admin,"), Err(Error::MalformedDn(_))));
	}

	#[test]
	fn hierarchy() -> Result<(), Box<dyn std::error::Error>> {
		assert!(equals("CN=Admin,OU=users,dc=example", "cn=admin,ou=users,dc=example")?);
		assert!(is_ancestor_of("ou=users,dc=example", "cn=admin,ou=users,dc=example")?);
		assert!(is_ancestor_of("dc=example", "cn=admin,ou=users,dc=example")?);
		assert!(!is_ancestor_of("ou=users,dc=example", "ou=users,dc=example")?);
		assert!(!is_ancestor_of("ou=groups,dc=example", "cn=admin,ou=users,dc=example")?);
		assert!(!is_ancestor_of("cn=admin,ou=users,dc=example", "ou=users,dc=example")?);

		let base = Dn::parse("ou=users,dc=example")?;
		let child = base.child(Rdn::new("cn", "admin"));
		assert!(base.is_parent_of(&child));
		assert!(base.contains(&child));
		assert!(base.contains(&base));
		assert!(!Dn::parse("dc=example")?.is_parent_of(&child));
		assert!(Dn::default().is_ancestor_of(&base));
		Ok(())
	}

	#[test]
	fn common_name() {
		assert_eq!(common_name_of("cn=admin,ou=users,dc=example").unwrap(), "admin");
		assert_eq!(common_name_of("CN=admin").unwrap(), "admin");
		assert!(matches!(common_name_of("uid=admin,ou=users"), Err(Error::MalformedDn(_))));
		assert!(matches!(common_name_of("cn=,ou=users"), Err(Error::MalformedDn(_))));
		assert!(matches!(common_name_of(""), Err(Error::MalformedDn(_))));
	}

	#[test]
	fn display_escapes_values() -> Result<(), Box<dyn std::error::Error>> {
		let dn = Dn::parse("ou=users,dc=example")?.child(Rdn::new("cn", "a,b"));
		let rendered = dn.to_string();
		assert!(rendered.starts_with(r"cn=a\"), "{rendered}");
		assert!(rendered.ends_with("b,ou=users,dc=example"), "{rendered}");
		assert_eq!(Dn::parse(&rendered)?, dn);
		Ok(())
	}
}
