//! Directory entries projected from the catalog records.
use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::{
	dn::{Dn, Rdn},
	store::{GroupRecord, UserRecord},
};

/// An attribute name with its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	/// The attribute name as presented to clients.
	pub name: String,
	/// All values, in order.
	pub values: Vec<String>,
}

/// The attributes of an entry. Names are matched case-insensitively and keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
	/// Create an empty attribute set.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Set `name` to `values`, replacing any attribute of the same name.
	/// Attributes without values are removed.
	pub fn insert<I, S>(&mut self, name: &str, values: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let values: Vec<String> = values.into_iter().map(Into::into).collect();
		self.0.retain(|attr| !attr.name.eq_ignore_ascii_case(name));
		if !values.is_empty() {
			self.0.push(Attribute { name: name.to_owned(), values });
		}
	}

	/// Builder form of [`Attributes::insert`].
	#[must_use]
	pub fn with<I, S>(mut self, name: &str, values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.insert(name, values);
		self
	}

	/// Set a single-valued attribute, skipping empty values.
	#[must_use]
	fn with_value(self, name: &str, value: &str) -> Self {
		if value.is_empty() {
			self
		} else {
			self.with(name, [value])
		}
	}

	/// The values of `name`, if present.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&[String]> {
		self.0.iter().find(|attr| attr.name.eq_ignore_ascii_case(name)).map(|a| a.values.as_slice())
	}

	/// Iterate over all attributes.
	pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
		self.0.iter()
	}

	/// Number of attributes.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether there are no attributes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<'a> IntoIterator for &'a Attributes {
	type Item = &'a Attribute;
	type IntoIter = std::slice::Iter<'a, Attribute>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// An entry as returned by a search: a DN plus its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
	/// The distinguished name the entry was projected under.
	pub dn: Dn,
	/// The entry's attributes.
	pub attributes: Attributes,
}

/// The DN of a user entry below `base`.
#[must_use]
pub fn user_dn(base: &Dn, user: &UserRecord) -> Dn {
	base.child(Rdn::new("cn", user.id.as_str()))
}

/// The DN of a group entry below `base`.
#[must_use]
pub fn group_dn(base: &Dn, group: &GroupRecord) -> Dn {
	base.child(Rdn::new("cn", group.name.as_str()))
}

/// Project a user into a directory entry. `memberof` lists every group in
/// `groups` the user currently belongs to.
#[must_use]
pub fn project_user(
	user: &UserRecord,
	groups: &[GroupRecord],
	user_base: &Dn,
	group_base: &Dn,
) -> DirectoryEntry {
	let member_of = groups
		.iter()
		.filter(|group| group.has_member(user))
		.map(|group| group_dn(group_base, group).to_string());
	let attributes = Attributes::new()
		.with("objectclass", ["user", "inetOrgPerson"])
		.with_value("uid", &user.id)
		.with_value("cn", &user.username)
		.with_value("username", &user.username)
		.with_value("mail", &user.mail)
		.with_value("displayname", &user.display_name)
		.with_value("givenName", &user.given_name)
		.with_value("sn", &user.family_name)
		.with("memberof", member_of);
	DirectoryEntry { dn: user_dn(user_base, user), attributes }
}

/// Project a group into a directory entry. `memberuid` lists the ids of its
/// members among `users`.
#[must_use]
pub fn project_group(group: &GroupRecord, users: &[UserRecord], group_base: &Dn) -> DirectoryEntry {
	let attributes = Attributes::new()
		.with("objectclass", ["group"])
		.with_value("cn", &group.name)
		.with("memberuid", group.members(users).map(|user| user.id.as_str()));
	DirectoryEntry { dn: group_dn(group_base, group), attributes }
}

impl From<DirectoryEntry> for SearchEntry {
	fn from(entry: DirectoryEntry) -> Self {
		SearchEntry {
			dn: entry.dn.to_string(),
			attrs: entry.attributes.0.into_iter().map(|attr| (attr.name, attr.values)).collect(),
			bin_attrs: HashMap::new(),
		}
	}
}

/// An extension trait for entries that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get all values of an attribute.
	fn attr_values(&self, attr: &str) -> Option<&[String]>;

	/// Get the first value of an attribute.
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.attr_values(attr)?.first().map(String::as_str)
	}
}

impl SearchEntryExt for DirectoryEntry {
	fn attr_values(&self, attr: &str) -> Option<&[String]> {
		self.attributes.get(attr)
	}
}

impl SearchEntryExt for SearchEntry {
	fn attr_values(&self, attr: &str) -> Option<&[String]> {
		self.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.map(|(_, values)| values.as_slice())
	}
}
