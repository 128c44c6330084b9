//! The static catalog of user and group records.
use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A user account known to the directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
	/// The immutable unique identifier, used as the entry's RDN and `uid`.
	pub id: String,
	/// The unique login name, matched against the bind common name.
	pub username: String,
	/// The plaintext password.
	pub password: String,
	/// Display name.
	#[serde(default)]
	pub display_name: String,
	/// Given name.
	#[serde(default)]
	pub given_name: String,
	/// Family name.
	#[serde(default)]
	pub family_name: String,
	/// Mail address.
	#[serde(default)]
	pub mail: String,
	/// Whether the user belongs to the privileged group.
	#[serde(default)]
	pub admin: bool,
}

impl fmt::Debug for UserRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserRecord")
			.field("id", &self.id)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("display_name", &self.display_name)
			.field("given_name", &self.given_name)
			.field("family_name", &self.family_name)
			.field("mail", &self.mail)
			.field("admin", &self.admin)
			.finish()
	}
}

/// A group. Its members are derived from the user records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
	/// The unique group name, used as the entry's RDN and `cn`.
	pub name: String,
	/// An admin group contains only admin users, any other group contains
	/// every user.
	#[serde(default)]
	pub admin: bool,
}

impl GroupRecord {
	/// Whether `user` is a member of this group.
	#[must_use]
	pub fn has_member(&self, user: &UserRecord) -> bool {
		!self.admin || user.admin
	}

	/// The members of this group among `users`, in catalog order.
	pub fn members<'a>(
		&'a self,
		users: &'a [UserRecord],
	) -> impl Iterator<Item = &'a UserRecord> + 'a {
		users.iter().filter(move |user| self.has_member(user))
	}
}

/// Read access to the directory's records.
///
/// Every call returns the full current catalog in insertion order; filtering
/// is left to the caller.
pub trait EntryStore: Send + Sync {
	/// List all users.
	fn list_users(&self) -> Result<Vec<UserRecord>, Error>;

	/// List all groups.
	fn list_groups(&self) -> Result<Vec<GroupRecord>, Error>;
}

impl<S: EntryStore + ?Sized> EntryStore for Arc<S> {
	fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
		(**self).list_users()
	}

	fn list_groups(&self) -> Result<Vec<GroupRecord>, Error> {
		(**self).list_groups()
	}
}

/// An immutable in-memory catalog, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
	/// User records.
	users: Vec<UserRecord>,
	/// Group records.
	groups: Vec<GroupRecord>,
}

impl Catalog {
	/// Create a catalog from the given records.
	#[must_use]
	pub fn new(users: Vec<UserRecord>, groups: Vec<GroupRecord>) -> Self {
		Self { users, groups }
	}

	/// The built-in test users: an admin and a regular account, both with the
	/// password `test`.
	#[must_use]
	pub fn default_users() -> Vec<UserRecord> {
		vec![
			UserRecord {
				id: "admin".to_owned(),
				username: "admin".to_owned(),
				password: "test".to_owned(),
				display_name: "Herbert Burgermeister".to_owned(),
				given_name: "Herbert".to_owned(),
				family_name: "Burgermeister".to_owned(),
				mail: "admin@example.org".to_owned(),
				admin: true,
			},
			UserRecord {
				id: "normal".to_owned(),
				username: "normal".to_owned(),
				password: "test".to_owned(),
				display_name: "Norman Default".to_owned(),
				given_name: "Norman".to_owned(),
				family_name: "Default".to_owned(),
				mail: "normal@example.org".to_owned(),
				admin: false,
			},
		]
	}

	/// The built-in groups: `admins` for admin users and `users` for everyone.
	#[must_use]
	pub fn default_groups() -> Vec<GroupRecord> {
		vec![
			GroupRecord { name: "admins".to_owned(), admin: true },
			GroupRecord { name: "users".to_owned(), admin: false },
		]
	}
}

impl Default for Catalog {
	fn default() -> Self {
		Self::new(Self::default_users(), Self::default_groups())
	}
}

impl EntryStore for Catalog {
	fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
		Ok(self.users.clone())
	}

	fn list_groups(&self) -> Result<Vec<GroupRecord>, Error> {
		Ok(self.groups.clone())
	}
}
