use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::{
    config::Upstream,
    error::{SetupError, SetupResult},
    internal,
};

impl Upstream {
    /// Resolve the upstream host name.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Resolve`] if the lookup fails, or
    /// [`SetupError::NoAddress`] if it yields nothing.
    pub async fn resolve(&self) -> SetupResult<Vec<SocketAddr>> {
        let addresses = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| SetupError::Resolve {
                host: self.host.clone(),
                port: self.port,
                source,
            })?
            .collect::<Vec<_>>();

        if addresses.is_empty() {
            return Err(SetupError::NoAddress {
                host: self.host.clone(),
                port: self.port,
            });
        }

        Ok(addresses)
    }

    /// Open a fresh connection to the upstream server.
    ///
    /// The host is resolved again on every call, and each address is tried
    /// in turn.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot be resolved, no address accepts the
    /// connection, or the attempt outlasts the configured timeout.
    pub async fn connect(&self) -> SetupResult<TcpStream> {
        let addresses = self.resolve().await?;

        let stream = tokio::time::timeout(
            self.connect_timeout(),
            TcpStream::connect(addresses.as_slice()),
        )
        .await
        .map_err(|_| SetupError::ConnectTimeout {
            host: self.host.clone(),
            port: self.port,
            secs: self.connect_timeout_secs,
        })?
        .map_err(|source| SetupError::Connect {
            host: self.host.clone(),
            port: self.port,
            source,
        })?;

        internal!(
            level = DEBUG,
            "Connected to upstream {}:{} ({:?})",
            self.host,
            self.port,
            stream.peer_addr()
        );

        Ok(stream)
    }
}
