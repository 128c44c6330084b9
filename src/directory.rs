//! Search, bind and compare over the entry store.
use ldap3::Scope;
use tracing::{debug, info, warn};

use crate::{
	config::{CompatConfig, Config, ServiceAccount},
	dn::Dn,
	entry::{project_group, project_user, user_dn, DirectoryEntry},
	error::Error,
	filter::Filter,
	store::{Catalog, EntryStore, UserRecord},
};

/// The outcome of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindIdentity {
	/// The service principal. Authenticated, but not backed by a user record.
	Service,
	/// A user from the catalog.
	User(UserRecord),
}

/// The two subtrees served by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtree {
	/// Below the user base DN.
	Users,
	/// Below the group base DN.
	Groups,
}

/// A directory over a read-only entry store. Cheap to share between
/// connections: every operation takes `&self` and re-reads the store.
#[derive(Debug)]
pub struct Directory<S = Catalog> {
	/// Source of user and group records
	store: S,
	/// Root of the user subtree
	user_base: Dn,
	/// Root of the group subtree
	group_base: Dn,
	/// The privileged service principal
	service: ServiceAccount,
	/// Compatibility switches
	compat: CompatConfig,
}

/// Lazily produced search results.
pub type Entries<'a> = Box<dyn Iterator<Item = DirectoryEntry> + Send + 'a>;

impl Directory<Catalog> {
	/// Create a directory serving the catalog contained in `config`.
	pub fn from_config(config: &Config) -> Result<Self, Error> {
		Self::new(config.catalog(), config)
	}
}

impl<S: EntryStore> Directory<S> {
	/// Create a directory over `store`, taking base DNs, service account and
	/// compatibility switches from `config`.
	pub fn new(store: S, config: &Config) -> Result<Self, Error> {
		Ok(Self {
			store,
			user_base: Dn::parse(&config.user_base_dn)?,
			group_base: Dn::parse(&config.group_base_dn)?,
			service: config.service.clone(),
			compat: config.compat.clone(),
		})
	}

	/// Root of the user subtree.
	#[must_use]
	pub fn user_base(&self) -> &Dn {
		&self.user_base
	}

	/// Root of the group subtree.
	#[must_use]
	pub fn group_base(&self) -> &Dn {
		&self.group_base
	}

	/// The subtree `dn` lies in. When the bases are nested the deeper one
	/// wins.
	fn subtree_of(&self, dn: &Dn) -> Option<Subtree> {
		let users =
			self.user_base.contains(dn).then_some((self.user_base.rdns().len(), Subtree::Users));
		let groups =
			self.group_base.contains(dn).then_some((self.group_base.rdns().len(), Subtree::Groups));
		match (users, groups) {
			(Some(u), Some(g)) => Some(if g.0 > u.0 { g.1 } else { u.1 }),
			(u, g) => u.or(g).map(|(_, subtree)| subtree),
		}
	}

	/// Search for entries below `base` within `scope` that match `filter`.
	///
	/// The store is read once per call and entries are projected and filtered
	/// as the returned iterator is consumed. A base outside both subtrees
	/// yields no entries.
	pub fn search<'a>(
		&'a self,
		base: &str,
		scope: Scope,
		filter: &'a Filter,
	) -> Result<Entries<'a>, Error> {
		let base = Dn::parse(base)?;
		debug!(base = %base, scope = ?scope, filter = ?filter, "Search");
		let Some(subtree) = self.subtree_of(&base) else {
			debug!(base = %base, "Search base outside of the directory");
			return Ok(Box::new(std::iter::empty()));
		};

		let users = self.store.list_users()?;
		let groups = self.store.list_groups()?;
		let entries: Entries<'a> = match subtree {
			Subtree::Users => {
				let unscoped = self.compat.unscoped_user_search;
				Box::new(
					users
						.into_iter()
						.map(move |user| {
							project_user(&user, &groups, &self.user_base, &self.group_base)
						})
						.filter(move |entry| unscoped || in_scope(&base, scope, &entry.dn)),
				)
			}
			Subtree::Groups => Box::new(
				groups
					.into_iter()
					.map(move |group| project_group(&group, &users, &self.group_base))
					.filter(move |entry| in_scope(&base, scope, &entry.dn)),
			),
		};
		Ok(Box::new(entries.filter(move |entry| filter.matches(&entry.attributes))))
	}

	/// Check `credential` for the identity with common name `common_name`.
	pub fn verify(&self, common_name: &str, credential: &str) -> Result<BindIdentity, Error> {
		if common_name == self.service.name && credential == self.service.password {
			info!("Service principal bound");
			return Ok(BindIdentity::Service);
		}

		let user = self
			.store
			.list_users()?
			.into_iter()
			.find(|user| user.username == common_name)
			.ok_or_else(|| {
				warn!(common_name = %common_name, "Bind for unknown user");
				Error::NotFound(common_name.to_owned())
			})?;
		if user.password != credential {
			warn!(common_name = %common_name, "Bind with wrong password");
			return Err(Error::InvalidCredential(common_name.to_owned()));
		}
		info!(common_name = %common_name, "User bound");
		Ok(BindIdentity::User(user))
	}

	/// Bind as the entry named by `dn`. The identity is the DN's leading `cn`;
	/// a DN without one names no bindable entry.
	pub fn bind(&self, dn: &str, credential: &str) -> Result<BindIdentity, Error> {
		let target = Dn::parse(dn)?;
		let Ok(common_name) = target.common_name() else {
			warn!(dn = %target, "Bind DN without common name");
			return Err(Error::NotFound(dn.to_owned()));
		};
		self.verify(common_name, credential)
	}

	/// Whether the entry at `dn` has `value` for `attr`.
	///
	/// Group entries always compare true. User entries are checked against
	/// their projected attributes.
	pub fn compare(&self, dn: &str, attr: &str, value: &str) -> Result<bool, Error> {
		let target = Dn::parse(dn)?;
		match self.subtree_of(&target) {
			Some(Subtree::Groups) => Ok(true),
			Some(Subtree::Users) => {
				let groups = self.store.list_groups()?;
				let user = self
					.store
					.list_users()?
					.into_iter()
					.find(|user| user_dn(&self.user_base, user) == target)
					.ok_or_else(|| Error::NotFound(dn.to_owned()))?;
				let entry = project_user(&user, &groups, &self.user_base, &self.group_base);
				let values = entry.attributes.get(attr).unwrap_or_default();
				Ok(values.iter().any(|v| v == value))
			}
			None => Err(Error::NotFound(dn.to_owned())),
		}
	}
}

/// Whether an entry at `dn` is within `scope` of `base`.
fn in_scope(base: &Dn, scope: Scope, dn: &Dn) -> bool {
	match scope {
		Scope::Base => base == dn,
		Scope::OneLevel => base.is_parent_of(dn),
		Scope::Subtree => base.contains(dn),
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use std::sync::{Arc, RwLock};

	use ldap3::Scope;

	use super::{BindIdentity, Directory};
	use crate::{
		config::Config,
		entry::{DirectoryEntry, SearchEntryExt},
		error::Error,
		filter::Filter,
		store::{Catalog, EntryStore, GroupRecord, UserRecord},
	};

	const USERS: &str = "ou=users,dc=example";
	const GROUPS: &str = "ou=groups,dc=example";

	fn directory() -> Directory {
		Directory::from_config(&Config::default()).unwrap()
	}

	fn ids(entries: impl Iterator<Item = DirectoryEntry>) -> Vec<String> {
		entries.map(|e| e.attr_first("cn").unwrap().to_owned()).collect()
	}

	#[test]
	fn search_users() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		let filter = Filter::always();
		let entries: Vec<_> = directory.search(USERS, Scope::Subtree, &filter)?.collect();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].attr_first("uid"), Some("admin"));
		assert_eq!(entries[1].attr_first("uid"), Some("normal"));

		let admins_dn = "cn=admins,ou=groups,dc=example".to_owned();
		assert!(entries[0].attr_values("memberof").unwrap().contains(&admins_dn));
		assert!(!entries[1].attr_values("memberof").unwrap().contains(&admins_dn));
		Ok(())
	}

	#[test]
	fn search_groups() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		let filter = Filter::always();
		let entries: Vec<_> = directory.search(GROUPS, Scope::Subtree, &filter)?.collect();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].attr_first("cn"), Some("admins"));
		assert_eq!(entries[0].attr_values("memberuid").unwrap(), ["admin"]);
		assert_eq!(entries[1].attr_first("cn"), Some("users"));
		assert_eq!(entries[1].attr_values("memberuid").unwrap(), ["admin", "normal"]);
		Ok(())
	}

	#[test]
	fn search_applies_filter() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		let filter = Filter::Equality("username".to_owned(), "normal".to_owned());
		assert_eq!(ids(directory.search(USERS, Scope::Subtree, &filter)?), ["normal"]);

		let filter = Filter::Equality("memberuid".to_owned(), "normal".to_owned());
		assert_eq!(ids(directory.search(GROUPS, Scope::Subtree, &filter)?), ["users"]);

		let filter =
			Filter::Equality("memberof".to_owned(), "cn=admins,ou=groups,dc=example".to_owned());
		assert_eq!(ids(directory.search(USERS, Scope::Subtree, &filter)?), ["admin"]);
		Ok(())
	}

	#[test]
	fn search_outside_subtrees_is_empty() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		let filter = Filter::always();
		for base in ["dc=other", "ou=machines,dc=example", "dc=example", ""] {
			assert_eq!(directory.search(base, Scope::Subtree, &filter)?.count(), 0, "{base}");
		}
		assert!(matches!(
			directory.search("not a dn", Scope::Subtree, &filter),
			Err(Error::MalformedDn(_))
		));
		Ok(())
	}

	#[test]
	fn search_scopes() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		let filter = Filter::always();
		let admin = "cn=admin,ou=users,dc=example";
		let admins = "cn=admins,ou=groups,dc=example";

		assert_eq!(ids(directory.search(USERS, Scope::OneLevel, &filter)?), ["admin", "normal"]);
		assert_eq!(directory.search(USERS, Scope::Base, &filter)?.count(), 0);
		assert_eq!(ids(directory.search(admin, Scope::Base, &filter)?), ["admin"]);
		assert_eq!(ids(directory.search(admin, Scope::Subtree, &filter)?), ["admin"]);
		assert_eq!(directory.search(admin, Scope::OneLevel, &filter)?.count(), 0);

		assert_eq!(ids(directory.search(GROUPS, Scope::OneLevel, &filter)?), ["admins", "users"]);
		assert_eq!(ids(directory.search(admins, Scope::Base, &filter)?), ["admins"]);
		assert_eq!(directory.search(GROUPS, Scope::Base, &filter)?.count(), 0);
		Ok(())
	}

	#[test]
	fn unscoped_user_search() -> Result<(), Box<dyn std::error::Error>> {
		let mut config = Config::default();
		config.compat.unscoped_user_search = true;
		let directory = Directory::from_config(&config)?;
		let filter = Filter::always();
		let admin = "cn=admin,ou=users,dc=example";
		assert_eq!(ids(directory.search(admin, Scope::Base, &filter)?), ["admin", "normal"]);
		let admins = "cn=admins,ou=groups,dc=example";
		assert_eq!(ids(directory.search(admins, Scope::Base, &filter)?), ["admins"]);
		Ok(())
	}

	#[test]
	fn verify() {
		let directory = directory();
		match directory.verify("admin", "test") {
			Ok(BindIdentity::User(user)) => assert_eq!(user.id, "admin"),
			other => panic!("unexpected bind result {other:?}"),
		}
		assert!(matches!(directory.verify("admin", "wrong"), Err(Error::InvalidCredential(_))));
		assert!(matches!(directory.verify("ghost", "x"), Err(Error::NotFound(_))));
		assert!(matches!(directory.verify("readonly", "readonly"), Ok(BindIdentity::Service)));
		assert!(matches!(directory.verify("readonly", "wrong"), Err(Error::NotFound(_))));
	}

	#[test]
	fn service_bind_ignores_catalog() -> Result<(), Box<dyn std::error::Error>> {
		let directory = Directory::new(Catalog::new(vec![], vec![]), &Config::default())?;
		assert_eq!(directory.verify("readonly", "readonly")?, BindIdentity::Service);
		assert!(matches!(directory.verify("admin", "test"), Err(Error::NotFound(_))));
		Ok(())
	}

	#[test]
	fn bind_by_dn() {
		let directory = directory();
		assert!(matches!(
			directory.bind("cn=normal,ou=users,dc=example", "test"),
			Ok(BindIdentity::User(_))
		));
		assert!(matches!(
			directory.bind("cn=readonly,dc=example", "readonly"),
			Ok(BindIdentity::Service)
		));
		assert!(matches!(
			directory.bind("uid=normal,ou=users,dc=example", "test"),
			Err(Error::NotFound(_))
		));
		assert!(matches!(directory.bind("ou=users,dc=example", "test"), Err(Error::NotFound(_))));
		assert!(matches!(directory.bind("", "test"), Err(Error::NotFound(_))));
		assert!(matches!(directory.bind("not a dn", "test"), Err(Error::MalformedDn(_))));
	}

	#[test]
	fn compare() -> Result<(), Box<dyn std::error::Error>> {
		let directory = directory();
		assert!(directory.compare("cn=admins,ou=groups,dc=example", "memberuid", "nobody")?);
		assert!(directory.compare("cn=admin,ou=users,dc=example", "mail", "admin@example.org")?);
		assert!(directory.compare("cn=admin,ou=users,dc=example", "MAIL", "admin@example.org")?);
		assert!(!directory.compare("cn=admin,ou=users,dc=example", "mail", "normal@example.org")?);
		assert!(matches!(
			directory.compare("cn=ghost,ou=users,dc=example", "mail", "x"),
			Err(Error::NotFound(_))
		));
		assert!(matches!(directory.compare("cn=x,dc=other", "cn", "x"), Err(Error::NotFound(_))));
		Ok(())
	}

	/// A store whose users can be changed between searches.
	#[derive(Debug, Default)]
	struct SharedStore {
		users: RwLock<Vec<UserRecord>>,
	}

	impl EntryStore for SharedStore {
		fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
			self.users
				.read()
				.map(|users| users.clone())
				.map_err(|e| Error::BackendUnavailable(e.to_string()))
		}

		fn list_groups(&self) -> Result<Vec<GroupRecord>, Error> {
			Ok(Catalog::default_groups())
		}
	}

	#[test]
	fn membership_follows_admin_flag() -> Result<(), Box<dyn std::error::Error>> {
		let store = Arc::new(SharedStore { users: RwLock::new(Catalog::default_users()) });
		let directory = Directory::new(Arc::clone(&store), &Config::default())?;
		let admins = Filter::Equality("cn".to_owned(), "admins".to_owned());
		let members = |directory: &Directory<Arc<SharedStore>>| -> Vec<String> {
			directory
				.search(GROUPS, Scope::Subtree, &admins)
				.unwrap()
				.flat_map(|e| e.attr_values("memberuid").unwrap_or_default().to_vec())
				.collect()
		};
		assert_eq!(members(&directory), ["admin"]);

		store.users.write().unwrap()[1].admin = true;
		assert_eq!(members(&directory), ["admin", "normal"]);

		store.users.write().unwrap()[0].admin = false;
		store.users.write().unwrap()[1].admin = false;
		assert!(members(&directory).is_empty());
		Ok(())
	}

	/// A store that cannot be read.
	#[derive(Debug)]
	struct BrokenStore;

	impl EntryStore for BrokenStore {
		fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
			Err(Error::BackendUnavailable("offline".to_owned()))
		}

		fn list_groups(&self) -> Result<Vec<GroupRecord>, Error> {
			Err(Error::BackendUnavailable("offline".to_owned()))
		}
	}

	#[test]
	fn unavailable_backend() -> Result<(), Box<dyn std::error::Error>> {
		let directory = Directory::new(BrokenStore, &Config::default())?;
		let filter = Filter::always();
		for base in [USERS, GROUPS] {
			assert!(matches!(
				directory.search(base, Scope::Subtree, &filter),
				Err(Error::BackendUnavailable(_))
			));
		}
		assert!(matches!(directory.search("dc=other", Scope::Subtree, &filter), Ok(_)));
		assert!(matches!(directory.verify("admin", "test"), Err(Error::BackendUnavailable(_))));
		assert!(matches!(directory.verify("readonly", "readonly"), Ok(BindIdentity::Service)));
		Ok(())
	}

	#[test]
	fn malformed_base_dn_in_config() {
		let config = Config { user_base_dn: "users".to_owned(), ..Config::default() };
		assert!(matches!(Directory::from_config(&config), Err(Error::MalformedDn(_))));
	}
}
