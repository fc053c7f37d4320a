//! Error types for the relay.
//!
//! Setup errors (binding the listener, resolving or reaching the upstream)
//! are kept apart from transport errors so callers can tell a broken
//! configuration from a single session going away.

use std::{io, net::SocketAddr, path::PathBuf, str::Utf8Error};

use thiserror::Error;

use crate::proxy::Direction;

/// Errors raised while establishing the listener or an upstream connection.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The listening socket could not be bound.
    #[error("Failed to bind listener to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The upstream host name could not be resolved.
    #[error("Don't know about host {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The upstream host name resolved, but to nothing usable.
    #[error("Upstream {host}:{port} did not resolve to any address")]
    NoAddress { host: String, port: u16 },

    /// None of the resolved upstream addresses accepted a connection.
    #[error("Couldn't get I/O for the connection to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The upstream did not accept the connection in time.
    #[error("Timed out connecting to {host}:{port} after {secs} seconds")]
    ConnectTimeout { host: String, port: u16, secs: u64 },
}

/// Errors moving bytes between two endpoints.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to read from endpoint: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to endpoint: {0}")]
    Write(#[source] io::Error),
}

/// A chunk could not be interpreted as text.
#[derive(Debug, Error)]
#[error("Chunk is not valid UTF-8: {0}")]
pub struct DecodeError(#[from] Utf8Error);

/// The typed outcome of a single relayed session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Transport error ({direction}): {source}")]
    Transport {
        direction: Direction,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    pub(crate) const fn transport(direction: Direction, source: TransportError) -> Self {
        Self::Transport { direction, source }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration file {0} does not exist")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type SetupResult<T> = std::result::Result<T, SetupError>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_display() {
        let err = SetupError::NoAddress {
            host: "mail.example.com".to_string(),
            port: 587,
        };
        assert_eq!(
            err.to_string(),
            "Upstream mail.example.com:587 did not resolve to any address"
        );

        let err = SetupError::ConnectTimeout {
            host: "mail.example.com".to_string(),
            port: 25,
            secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "Timed out connecting to mail.example.com:25 after 30 seconds"
        );
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::transport(
            Direction::ServerToClient,
            TransportError::Write(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")),
        );
        assert_eq!(
            err.to_string(),
            "Transport error (server -> client): Failed to write to endpoint: broken pipe"
        );
    }

    #[test]
    fn test_setup_error_conversion() {
        let err: SessionError = SetupError::NoAddress {
            host: "localhost".to_string(),
            port: 25,
        }
        .into();
        assert!(matches!(err, SessionError::Setup(_)));
        assert_eq!(
            err.to_string(),
            "Upstream localhost:25 did not resolve to any address"
        );
    }

    #[test]
    fn test_decode_error_conversion() {
        let bytes = vec![0xff, 0xfe];
        let err: DecodeError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(err.to_string().starts_with("Chunk is not valid UTF-8"));
    }
}
