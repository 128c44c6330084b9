//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A distinguished name could not be parsed, or lacked the component an
	/// operation needed from it.
	#[error("Malformed DN: {0}")]
	MalformedDn(String),
	/// The entry store could not enumerate its records.
	#[error("Backend unavailable: {0}")]
	BackendUnavailable(String),
	/// The requested identity or entry does not exist.
	#[error("No such object: {0}")]
	NotFound(String),
	/// The presented credential did not match the stored one.
	#[error("Invalid credentials for {0}")]
	InvalidCredential(String),
	/// The configuration file could not be parsed.
	#[error(transparent)]
	Config(#[from] toml::de::Error),
	/// Reading the configuration or serving a connection failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
