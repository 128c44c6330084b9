//! A tiny in-memory LDAP directory for integration tests.
//!
//! The directory serves a fixed catalog of users and groups below two
//! configured base DNs. It answers searches by projecting every record into a
//! directory entry and evaluating the requested scope and filter against it,
//! and it answers simple binds by comparing plaintext passwords. Group
//! membership is never stored: the admin group holds every admin user, any
//! other group holds everyone.
//!
//! Nothing is persisted and nothing can be modified over the protocol. Do not
//! point anything but a test suite at it.
//!
//! # Getting started
//! Querying the directory directly, without going over the network:
//! ```
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_fixture::{Config, Directory, Filter, Scope, SearchEntryExt};
//!
//! let directory = Directory::from_config(&Config::default())?;
//!
//! let filter = Filter::Equality("uid".to_owned(), "admin".to_owned());
//! for entry in directory.search("ou=users,dc=example", Scope::Subtree, &filter)? {
//!     println!("{}: {:?}", entry.dn, entry.attr_values("memberof"));
//! }
//!
//! directory.bind("cn=admin,ou=users,dc=example", "test")?;
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! Serving it to LDAP clients:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use ldap_fixture::{server, Config, Directory};
//!
//! let config = Config::default();
//! let listener = tokio::net::TcpListener::bind(config.listen).await?;
//! server::serve(listener, Arc::new(Directory::from_config(&config)?)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Passwords are stored and compared in plaintext, without constant-time
//!   comparison.
//! * Add, modify, delete and extended operations are refused.
//! * Only simple binds are supported, and there is no TLS.

pub mod config;
pub mod directory;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod server;
pub mod store;

pub use ldap3::{self, Scope};

pub use crate::{
	config::Config,
	directory::{BindIdentity, Directory},
	dn::Dn,
	entry::{DirectoryEntry, SearchEntryExt},
	error::Error,
	filter::Filter,
	store::{Catalog, EntryStore, GroupRecord, UserRecord},
};
