//! Config for the fixture directory.
use std::{
	fmt,
	net::{Ipv4Addr, SocketAddr},
	path::Path,
	str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
	error::Error,
	store::{Catalog, GroupRecord, UserRecord},
};

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3002;

/// Directory configuration. Every field has a default, so an empty file
/// yields the built-in test directory.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
	/// Address the LDAP listener binds to
	pub listen: SocketAddr,
	/// Base DN of the user subtree
	pub user_base_dn: String,
	/// Base DN of the group subtree
	pub group_base_dn: String,
	/// The privileged service principal
	pub service: ServiceAccount,
	/// Switches that reproduce quirks of older fixtures
	pub compat: CompatConfig,
	/// User records served by the directory
	pub users: Vec<UserRecord>,
	/// Group records served by the directory
	pub groups: Vec<GroupRecord>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
			user_base_dn: "ou=users,dc=example".to_owned(),
			group_base_dn: "ou=groups,dc=example".to_owned(),
			service: ServiceAccount::default(),
			compat: CompatConfig::default(),
			users: Catalog::default_users(),
			groups: Catalog::default_groups(),
		}
	}
}

impl Config {
	/// Read a TOML configuration file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
		std::fs::read_to_string(path)?.parse()
	}

	/// Build the record catalog described by this configuration.
	#[must_use]
	pub fn catalog(&self) -> Catalog {
		Catalog::new(self.users.clone(), self.groups.clone())
	}
}

impl FromStr for Config {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(toml::from_str(s)?)
	}
}

/// Credentials of the service principal. A successful bind with these is
/// authenticated without being tied to a user record.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceAccount {
	/// Common name to bind as
	pub name: String,
	/// Password
	pub password: String,
}

impl Default for ServiceAccount {
	fn default() -> Self {
		Self { name: "readonly".to_owned(), password: "readonly".to_owned() }
	}
}

impl fmt::Debug for ServiceAccount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceAccount")
			.field("name", &self.name)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Compatibility switches.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct CompatConfig {
	/// Return every user for searches anywhere in the user subtree, ignoring
	/// the requested base and scope. Only the filter is applied.
	pub unscoped_user_search: bool,
}
