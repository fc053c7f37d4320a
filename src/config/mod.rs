//! Relay configuration.
//!
//! Everything here has a default, so an empty (or missing) file is a valid
//! configuration. The upstream host and port are normally supplied on the
//! command line and override whatever the file contains.

mod rewrite;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

pub use self::rewrite::{Rewrite, RewriteMode};
use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "AUTHPATCH_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Address the relay accepts client connections on.
    ///
    /// Default: `0.0.0.0:4444`
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub upstream: Upstream,

    #[serde(default)]
    pub rewrite: Rewrite,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            upstream: Upstream::default(),
            rewrite: Rewrite::default(),
        }
    }
}

/// The SMTP server every session is relayed to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Upstream {
    #[serde(default)]
    pub host: String,

    #[serde(default = "defaults::upstream_port")]
    pub port: u16,

    /// Timeout for establishing the upstream TCP connection.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            host: String::default(),
            port: defaults::upstream_port(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
        }
    }
}

impl Upstream {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid TOML or
    /// does not match the expected shape.
    pub fn parse(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Find the configuration file to use, if any, with the following precedence:
    /// 1. An explicitly provided path
    /// 2. `AUTHPATCH_CONFIG` environment variable
    /// 3. ./authpatch.toml (current working directory)
    /// 4. /etc/authpatch/authpatch.toml (system-wide config)
    ///
    /// # Errors
    ///
    /// An explicit path, or one named by the environment, that does not exist
    /// is an error. Missing default locations are not.
    pub fn locate(explicit: Option<PathBuf>) -> ConfigResult<Option<PathBuf>> {
        let defaults = [
            PathBuf::from("./authpatch.toml"),
            PathBuf::from("/etc/authpatch/authpatch.toml"),
        ];

        locate_in(
            explicit,
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            &defaults,
        )
    }

    /// Check the values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.upstream.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "upstream.host",
                reason: "an upstream host is required".to_string(),
            });
        }

        if self.upstream.port == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream.port",
                reason: "port must be between 1 and 65535".to_string(),
            });
        }

        if self.rewrite.find.is_empty() {
            return Err(ConfigError::Invalid {
                field: "rewrite.find",
                reason: "the text to replace cannot be empty".to_string(),
            });
        }

        if self.rewrite.mode == RewriteMode::Reply && self.rewrite.max_reply_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "rewrite.max_reply_buffer",
                reason: "must be greater than zero in reply mode".to_string(),
            });
        }

        Ok(())
    }
}

fn locate_in(
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    defaults: &[PathBuf],
) -> ConfigResult<Option<PathBuf>> {
    if let Some(path) = explicit.or(env) {
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}

mod defaults {
    use super::{IpAddr, Ipv4Addr, SocketAddr};

    pub const fn listen() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4444)
    }

    pub const fn upstream_port() -> u16 {
        25
    }

    pub const fn connect_timeout_secs() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn valid() -> Config {
        Config {
            upstream: Upstream {
                host: "mail.example.com".to_string(),
                port: 587,
                ..Upstream::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen, "0.0.0.0:4444".parse::<SocketAddr>().unwrap());
        assert_eq!(config.upstream.port, 25);
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.rewrite, Rewrite::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = Config::parse(
            r#"
            listen = "127.0.0.1:2525"

            [upstream]
            host = "mail.example.com"
            port = 587
            connect_timeout_secs = 5

            [rewrite]
            find = "250-AUTH CRAM-MD5"
            replace = "250-AUTH CRAM-MD5 LOGIN"
            mode = "reply"
            max_reply_buffer = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:2525".parse::<SocketAddr>().unwrap());
        assert_eq!(config.upstream.host, "mail.example.com");
        assert_eq!(config.upstream.port, 587);
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.rewrite.find, "250-AUTH CRAM-MD5");
        assert_eq!(config.rewrite.replace, "250-AUTH CRAM-MD5 LOGIN");
        assert_eq!(config.rewrite.mode, RewriteMode::Reply);
        assert_eq!(config.rewrite.max_reply_buffer, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let err = Config::parse("[rewrite]\nmode = \"line\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_requires_host() {
        let err = Config::default().validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for upstream.host: an upstream host is required"
        );
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut config = valid();
        config.upstream.port = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "upstream.port",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_find() {
        let mut config = valid();
        config.rewrite.find = String::new();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "rewrite.find",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_reply_buffer() {
        let mut config = valid();
        config.rewrite.mode = RewriteMode::Reply;
        config.rewrite.max_reply_buffer = 0;

        assert!(config.validate().is_err());

        config.rewrite.mode = RewriteMode::Chunk;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\nhost = \"smtp.example.org\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.upstream.host, "smtp.example.org");
        assert_eq!(config.upstream.port, 25);
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let explicit = tempfile::NamedTempFile::new().unwrap();
        let env = tempfile::NamedTempFile::new().unwrap();

        let found = locate_in(
            Some(explicit.path().to_path_buf()),
            Some(env.path().to_path_buf()),
            &[],
        )
        .unwrap();
        assert_eq!(found, Some(explicit.path().to_path_buf()));
    }

    #[test]
    fn test_locate_uses_environment() {
        let env = tempfile::NamedTempFile::new().unwrap();

        let found = locate_in(None, Some(env.path().to_path_buf()), &[]).unwrap();
        assert_eq!(found, Some(env.path().to_path_buf()));
    }

    #[test]
    fn test_locate_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("authpatch.toml");

        let err = locate_in(Some(missing.clone()), None, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(path) if path == missing));
    }

    #[test]
    fn test_locate_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let present = dir.path().join("authpatch.toml");
        std::fs::write(&present, "").unwrap();

        let found = locate_in(None, None, &[missing.clone(), present.clone()]).unwrap();
        assert_eq!(found, Some(present));

        assert_eq!(locate_in(None, None, &[missing]).unwrap(), None);
    }
}
