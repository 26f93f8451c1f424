//! Server configuration file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Port the demo service listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 50051;

/// Failure to load a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The file could not be read.
	#[error("failed to read {path}: {source}")]
	Read {
		/// File that was requested.
		path: PathBuf,
		/// Underlying error.
		source: std::io::Error,
	},
	/// The file is not valid TOML for this schema.
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is out of range.
	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Contents of `cqrpc.toml`.
///
/// ```toml
/// listen = "0.0.0.0:50051"
/// workers = 4
/// offload_threads = 4
/// log_filter = "cqrpc=debug,info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
	/// Address the TCP transport binds.
	pub listen: SocketAddr,
	/// Dispatch worker count; `None` uses the available parallelism.
	pub workers: Option<usize>,
	/// Threads available to offloaded handlers.
	pub offload_threads: usize,
	/// `tracing` filter directive, overridden by `RUST_LOG`.
	pub log_filter: Option<String>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
			workers: None,
			offload_threads: 4,
			log_filter: None,
		}
	}
}

impl ServerConfig {
	/// Reads and validates a config file.
	///
	/// # Errors
	///
	/// Fails if the file is unreadable, malformed, or out of range.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text)
	}

	/// Parses and validates config text.
	///
	/// # Errors
	///
	/// Fails if the text is malformed or out of range.
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects zero worker or offload thread counts.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Invalid`] naming the offending key.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.workers == Some(0) {
			return Err(ConfigError::Invalid("workers must be at least 1".into()));
		}
		if self.offload_threads == 0 {
			return Err(ConfigError::Invalid("offload_threads must be at least 1".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn empty_file_uses_defaults() {
		let config = ServerConfig::from_toml("").unwrap();
		assert_eq!(config, ServerConfig::default());
		assert_eq!(config.listen.port(), DEFAULT_PORT);
		assert_eq!(config.offload_threads, 4);
	}

	#[test]
	fn loads_every_key_from_disk() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
listen = "127.0.0.1:6000"
workers = 3
offload_threads = 2
log_filter = "cqrpc=trace"
"#
		)
		.unwrap();

		let config = ServerConfig::load(file.path()).unwrap();
		assert_eq!(config.listen, "127.0.0.1:6000".parse().unwrap());
		assert_eq!(config.workers, Some(3));
		assert_eq!(config.offload_threads, 2);
		assert_eq!(config.log_filter.as_deref(), Some("cqrpc=trace"));
	}

	#[test]
	fn rejects_unknown_keys_and_zero_counts() {
		assert!(matches!(ServerConfig::from_toml("threads = 2"), Err(ConfigError::Parse(_))));
		assert!(matches!(ServerConfig::from_toml("workers = 0"), Err(ConfigError::Invalid(_))));
		assert!(matches!(ServerConfig::from_toml("offload_threads = 0"), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn missing_file_names_the_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		let err = ServerConfig::load(&path).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
		assert!(err.to_string().contains("absent.toml"));
	}
}
